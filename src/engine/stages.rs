//! engine::stages
//!
//! The local, per-repository stages of the pipeline behind one seam.
//!
//! [`GitStages`] runs the real fetch, transcode and ref publication. Tests
//! substitute their own [`LocalStages`] to drive the orchestrator without
//! network access or to inject failures at a given stage.

use std::path::Path;

use tracing::debug;

use super::StageError;
use crate::core::cancel::CancellationFlag;
use crate::git::{PackTranscoder, RefPublisher, RepositorySource};

/// The blocking stages that prepare a working clone for upload.
pub trait LocalStages: Send + Sync {
    /// Clone or incrementally fetch `url` into `storage`.
    fn fetch(&self, url: &str, storage: &Path, cancel: &CancellationFlag)
        -> Result<(), StageError>;

    /// Replace every pack in `storage` with loose objects.
    fn transcode(&self, storage: &Path, cancel: &CancellationFlag) -> Result<(), StageError>;

    /// Write the ref manifest of `storage`.
    fn publish_refs(&self, storage: &Path, cancel: &CancellationFlag) -> Result<(), StageError>;
}

/// Stages backed by the [`crate::git`] module.
#[derive(Debug, Clone, Default)]
pub struct GitStages {
    source: RepositorySource,
    transcoder: PackTranscoder,
    publisher: RefPublisher,
}

impl GitStages {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStages for GitStages {
    fn fetch(
        &self,
        url: &str,
        storage: &Path,
        cancel: &CancellationFlag,
    ) -> Result<(), StageError> {
        let summary = self.source.fetch(url, storage, cancel)?;
        debug!(
            objects = summary.received_objects,
            bytes = summary.received_bytes,
            up_to_date = summary.up_to_date(),
            "fetched"
        );
        Ok(())
    }

    fn transcode(&self, storage: &Path, cancel: &CancellationFlag) -> Result<(), StageError> {
        let summary = self.transcoder.materialize(storage, cancel)?;
        debug!(
            packs = summary.packs,
            written = summary.written,
            skipped = summary.skipped,
            "transcoded"
        );
        Ok(())
    }

    fn publish_refs(&self, storage: &Path, cancel: &CancellationFlag) -> Result<(), StageError> {
        let records = self.publisher.publish(storage, cancel)?;
        debug!(refs = records.len(), "refs published");
        Ok(())
    }
}
