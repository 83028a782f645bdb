//! engine
//!
//! The Orchestrator: sequences the pipeline for every target repository and
//! commits the results to the published index.
//!
//! # Lifecycle
//!
//! ```text
//! lock workspace -> bind index key -> fetch all metadata -> shuffle
//!   -> for each repository:
//!        fetch -> transcode -> publish refs -> upload -> update index
//! ```
//!
//! # Invariants
//!
//! - Repositories are processed one at a time; stages never overlap
//! - A failure is confined to its repository: the run continues and the
//!   failure is reported at the end
//! - Only one run per workspace holds the index writer role at a time
//! - Processing order comes from an injected random source
//!
//! # Example
//!
//! ```ignore
//! use gh1000::engine::{GitStages, Orchestrator, OrchestratorSettings};
//! use rand::SeedableRng;
//!
//! let stages = GitStages::new();
//! let orchestrator = Orchestrator::new(&store, &targets, &stages, settings);
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let report = orchestrator.run(&mut rng, &CancellationFlag::new()).await?;
//! println!("{report}");
//! ```

pub mod orchestrator;
pub mod report;
pub mod stages;
pub mod state;

pub use orchestrator::{clone_path, Orchestrator, OrchestratorError, OrchestratorSettings};
pub use report::{ArchivedRepo, FailedRepo, RunReport};
pub use stages::{GitStages, LocalStages};
pub use state::{RepoState, Stage};

use std::path::PathBuf;

use thiserror::Error;

use crate::core::cancel::Cancelled;
use crate::git::{FetchError, RefsError, TranscodeError};
use crate::index::IndexError;
use crate::metadata::MetadataError;
use crate::snapshot::UploadError;

/// The failure of one repository at one stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Refs(#[from] RefsError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// The working clone could not be prepared or removed.
    #[error("workspace error on {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl From<Cancelled> for StageError {
    fn from(_: Cancelled) -> Self {
        StageError::Cancelled
    }
}

impl StageError {
    /// Whether this failure is a cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            StageError::Cancelled
                | StageError::Fetch(FetchError::Cancelled { .. })
                | StageError::Transcode(TranscodeError::Cancelled { .. })
                | StageError::Refs(RefsError::Cancelled { .. })
                | StageError::Upload(UploadError::Cancelled { .. })
                | StageError::Index(IndexError::Cancelled)
        )
    }
}
