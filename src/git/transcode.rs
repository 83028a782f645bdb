//! git::transcode
//!
//! PackTranscoder: rewrite every packed object as a loose object, then
//! reclaim the pack.
//!
//! # Algorithm
//!
//! Packs are processed one at a time, in file name order. For each pack:
//!
//! 1. Read the object names from its `.idx`
//! 2. For every name whose loose path does not exist yet, read the object
//!    through the object database, check its size, type and hash, and
//!    commit it as a loose object
//! 3. Once every object is materialized, delete the pack and its sidecars
//!
//! # Invariants
//!
//! - A pack that fails midway leaves no loose objects from that pack behind
//!   (files written for it are rolled back)
//! - Packs completed before a failure stay completed
//! - Loose objects that already existed are never rewritten

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::interface::{Git, GitError};
use super::loose::{self, LooseError, WriteOutcome};
use super::pack_index::{self, PackIndexError, SHA1_LEN};
use crate::core::cancel::CancellationFlag;
use crate::core::types::Oid;

/// Extensions of files that belong to a pack and go away with it.
const PACK_SIDECARS: &[&str] = &["pack", "idx", "rev", "bitmap", "promisor", "keep", "mtimes"];

/// Errors from transcoding packs.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The storage could not be opened as a repository.
    #[error("cannot open storage {path}")]
    Storage {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// A pack index could not be decoded.
    #[error("pack index {pack} is unreadable")]
    PackIndex {
        pack: String,
        #[source]
        source: PackIndexError,
    },

    /// An `.idx` file has no matching `.pack`.
    #[error("pack {pack} has an index but no pack data")]
    MissingPackData { pack: String },

    /// An object failed integrity checks.
    #[error("corrupt object {oid} in pack {pack}: {reason}")]
    CorruptObject {
        pack: String,
        oid: Oid,
        reason: String,
    },

    /// The object database could not produce an object listed in the index.
    #[error("cannot read object {oid} from pack {pack}")]
    Read {
        pack: String,
        oid: Oid,
        #[source]
        source: GitError,
    },

    /// Local filesystem failure.
    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cancellation was requested while transcoding.
    #[error("transcoding of pack {pack} cancelled")]
    Cancelled { pack: String },
}

/// Counters from a completed [`PackTranscoder::materialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeSummary {
    /// Packs fully materialized and deleted.
    pub packs: usize,
    /// Loose objects newly written.
    pub written: usize,
    /// Objects whose loose path already existed.
    pub skipped: usize,
}

/// Converts packed storage into loose objects.
#[derive(Debug, Clone, Default)]
pub struct PackTranscoder;

impl PackTranscoder {
    pub fn new() -> Self {
        Self
    }

    /// Materialize every pack in the bare repository at `storage`.
    ///
    /// Stops at the first failing pack.
    #[instrument(skip(self, cancel), fields(storage = %storage.display()))]
    pub fn materialize(
        &self,
        storage: &Path,
        cancel: &CancellationFlag,
    ) -> Result<TranscodeSummary, TranscodeError> {
        let git = Git::open(storage).map_err(|source| TranscodeError::Storage {
            path: storage.to_path_buf(),
            source,
        })?;

        let mut summary = TranscodeSummary::default();
        for idx_path in list_pack_indexes(&git.pack_dir())? {
            let pack = pack_name(&idx_path);
            let (written, skipped) = self.materialize_pack(&git, &idx_path, &pack, cancel)?;
            remove_pack_files(&idx_path)?;
            git.refresh_odb().map_err(|source| TranscodeError::Storage {
                path: storage.to_path_buf(),
                source,
            })?;

            info!(pack = %pack, written, skipped, "pack materialized");
            summary.packs += 1;
            summary.written += written;
            summary.skipped += skipped;
        }

        let midx = git.pack_dir().join("multi-pack-index");
        if summary.packs > 0 && midx.exists() {
            fs::remove_file(&midx).map_err(|source| TranscodeError::Io { path: midx, source })?;
        }
        Ok(summary)
    }

    /// Write loose objects for one pack, rolling back on failure.
    fn materialize_pack(
        &self,
        git: &Git,
        idx_path: &Path,
        pack: &str,
        cancel: &CancellationFlag,
    ) -> Result<(usize, usize), TranscodeError> {
        if !idx_path.with_extension("pack").exists() {
            return Err(TranscodeError::MissingPackData {
                pack: pack.to_string(),
            });
        }

        let oids = pack_index::read_pack_index(idx_path, SHA1_LEN).map_err(|source| {
            TranscodeError::PackIndex {
                pack: pack.to_string(),
                source,
            }
        })?;
        debug!(pack, objects = oids.len(), "enumerated pack");

        let mut created: Vec<PathBuf> = Vec::new();
        let mut skipped = 0usize;
        let result = (|| {
            let objects_dir = git.objects_dir();
            for oid in &oids {
                if cancel.is_cancelled() {
                    return Err(TranscodeError::Cancelled {
                        pack: pack.to_string(),
                    });
                }
                match materialize_object(git, &objects_dir, pack, oid)? {
                    WriteOutcome::Written(path) => created.push(path),
                    WriteOutcome::AlreadyPresent => skipped += 1,
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok((created.len(), skipped)),
            Err(err) => {
                rollback(&created);
                Err(err)
            }
        }
    }
}

/// Materialize a single object unless its loose path already exists.
fn materialize_object(
    git: &Git,
    objects_dir: &Path,
    pack: &str,
    oid: &Oid,
) -> Result<WriteOutcome, TranscodeError> {
    if loose::loose_path(objects_dir, oid).exists() {
        return Ok(WriteOutcome::AlreadyPresent);
    }

    let corrupt = |reason: String| TranscodeError::CorruptObject {
        pack: pack.to_string(),
        oid: oid.clone(),
        reason,
    };
    let read_err = |source: GitError| match source {
        GitError::CorruptData { message, .. } => corrupt(message),
        source => TranscodeError::Read {
            pack: pack.to_string(),
            oid: oid.clone(),
            source,
        },
    };

    let (declared, declared_kind) = git.read_header(oid).map_err(read_err)?;
    git.with_object(oid, |kind, data| {
        if data.len() != declared {
            return Err(corrupt(format!(
                "declared {} bytes, decoded {}",
                declared,
                data.len()
            )));
        }
        if kind != declared_kind {
            return Err(corrupt(format!(
                "header says {}, object decodes as {}",
                declared_kind, kind
            )));
        }
        let computed = Git::hash_object(kind, data).map_err(read_err)?;
        if &computed != oid {
            return Err(corrupt(format!("content hashes to {}", computed)));
        }

        let mut payload = data;
        loose::write_loose(objects_dir, oid, kind, declared as u64, &mut payload).map_err(
            |err| match err {
                LooseError::SizeMismatch {
                    declared, actual, ..
                } => corrupt(format!("declared {} bytes, decoded {}", declared, actual)),
                LooseError::Io { path, source } => TranscodeError::Io { path, source },
                LooseError::Malformed { reason, .. } => corrupt(reason),
            },
        )
    })
    .map_err(read_err)?
}

/// Remove loose objects written for a pack that did not complete.
fn rollback(created: &[PathBuf]) {
    for path in created.iter().rev() {
        if let Err(e) = remove_readonly(path) {
            warn!(path = %path.display(), error = %e, "rollback could not remove object");
        }
    }
}

fn remove_readonly(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let mut perms = fs::metadata(path)?.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(path, perms)?;
            fs::remove_file(path)
        }
        other => other,
    }
}

/// All `.idx` files in `pack_dir`, sorted by name.
fn list_pack_indexes(pack_dir: &Path) -> Result<Vec<PathBuf>, TranscodeError> {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TranscodeError::Io {
                path: pack_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut indexes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TranscodeError::Io {
            path: pack_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "idx") {
            indexes.push(path);
        }
    }
    indexes.sort();
    Ok(indexes)
}

/// Delete a pack and every sidecar file sharing its stem.
fn remove_pack_files(idx_path: &Path) -> Result<(), TranscodeError> {
    for ext in PACK_SIDECARS {
        let path = idx_path.with_extension(ext);
        match remove_readonly(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(TranscodeError::Io { path, source }),
        }
    }
    Ok(())
}

fn pack_name(idx_path: &Path) -> String {
    idx_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
