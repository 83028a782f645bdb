//! snapshot::uploader
//!
//! SnapshotUploader: submit a materialized repository tree to the content
//! store as one atomic, pinned add.
//!
//! # Failure classification
//!
//! The tree is streamed to the store while it is walked, so a local read
//! failure surfaces on the store side as an aborted request. The walk's
//! failure slot is consulted first: if the walk recorded a failure the
//! result is [`UploadError::UploadIo`] (or [`UploadError::Cancelled`]),
//! otherwise the store's error is reported as
//! [`UploadError::StoreUnavailable`]. No identifier is returned unless the
//! whole tree was accepted and pinned.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use super::walk::{OpenFileGauge, TreeWalk};
use crate::core::cancel::CancellationFlag;
use crate::core::types::Cid;
use crate::store::{AddContent, ContentStore, StoreError};

/// Name the tree root is added under.
pub const ROOT_NAME: &str = "repo";

/// Errors from uploading a tree.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A local file or directory could not be read.
    #[error("cannot read {path} for upload: {source}")]
    UploadIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store failed or could not be reached.
    #[error("store unavailable while uploading {root}: {source}")]
    StoreUnavailable {
        root: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("upload of {root} cancelled")]
    Cancelled { root: PathBuf },
}

/// A successfully uploaded tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Identifier of the whole tree.
    pub cid: Cid,
    /// Highest number of local files held open at once during the upload.
    pub peak_open_files: usize,
}

/// Uploads directory trees to a content store.
pub struct SnapshotUploader<'a> {
    store: &'a dyn ContentStore,
}

impl<'a> SnapshotUploader<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self { store }
    }

    /// Upload the tree rooted at `root`, pin it, and return its identifier.
    #[instrument(skip(self, cancel), fields(root = %root.display()))]
    pub async fn upload(
        &self,
        root: &Path,
        cancel: &CancellationFlag,
    ) -> Result<Snapshot, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                root: root.to_path_buf(),
            });
        }

        let walk = TreeWalk::new(root, cancel.clone());
        let gauge: OpenFileGauge = walk.gauge();
        let failure = walk.failure_slot();

        debug!(store = self.store.name(), "adding tree");
        let added = self.store.add(AddContent::tree(ROOT_NAME, walk), true).await;

        if let Some(failure) = failure.get() {
            if failure.cancelled {
                return Err(UploadError::Cancelled {
                    root: root.to_path_buf(),
                });
            }
            return Err(UploadError::UploadIo {
                path: failure.path.unwrap_or_else(|| root.to_path_buf()),
                source: io::Error::new(failure.kind, failure.message),
            });
        }

        let store_err = |source: StoreError| match source {
            StoreError::Cancelled => UploadError::Cancelled {
                root: root.to_path_buf(),
            },
            source => UploadError::StoreUnavailable {
                root: root.to_path_buf(),
                source,
            },
        };

        let cid = added.map_err(store_err)?;
        self.store.pin(&cid).await.map_err(store_err)?;

        info!(%cid, peak_open_files = gauge.peak(), "tree uploaded");
        Ok(Snapshot {
            cid,
            peak_open_files: gauge.peak(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{FailOn, StoreOperation};
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("objects/ab")).unwrap();
        fs::write(temp.path().join("objects/ab/cdef"), b"obj").unwrap();
        fs::write(temp.path().join("HEAD"), b"ref: refs/heads/main\n").unwrap();
        temp
    }

    #[tokio::test]
    async fn upload_pins_and_returns_cid() {
        let temp = tree();
        let store = MemoryStore::new();
        let snapshot = SnapshotUploader::new(&store)
            .upload(temp.path(), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(store.is_pinned(&snapshot.cid));
        assert_eq!(snapshot.peak_open_files, 1);
        assert!(store.operations().contains(&StoreOperation::Pin {
            cid: snapshot.cid.clone()
        }));
    }

    #[tokio::test]
    async fn unchanged_tree_same_cid() {
        let temp = tree();
        let store = MemoryStore::new();
        let uploader = SnapshotUploader::new(&store);
        let cancel = CancellationFlag::new();

        let first = uploader.upload(temp.path(), &cancel).await.unwrap();
        let second = uploader.upload(temp.path(), &cancel).await.unwrap();
        assert_eq!(first.cid, second.cid);
    }

    #[tokio::test]
    async fn missing_root_is_upload_io() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let err = SnapshotUploader::new(&store)
            .upload(&temp.path().join("gone"), &CancellationFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::UploadIo { .. }), "{err}");
    }

    #[tokio::test]
    async fn store_failure_is_store_unavailable() {
        let temp = tree();
        let store =
            MemoryStore::new().fail_on(FailOn::AddTree(StoreError::Unavailable("refused".into())));
        let err = SnapshotUploader::new(&store)
            .upload(temp.path(), &CancellationFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let temp = tree();
        let store = MemoryStore::new();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let err = SnapshotUploader::new(&store)
            .upload(temp.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled { .. }));
        assert!(store.operations().is_empty());
    }
}
