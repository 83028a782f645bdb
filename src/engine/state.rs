//! engine::state
//!
//! Per-repository state machine.
//!
//! ```text
//! Pending -> Fetched -> Transcoded -> RefsPublished -> Uploaded -> Archived
//!     \          \           \              \             \
//!      +----------+-----------+--------------+-------------+--> Failed
//! ```
//!
//! `Archived` and `Failed` are terminal. Transitions only move forward one
//! step at a time; anything else is a bug in the orchestrator.

use std::fmt;

use crate::core::types::Cid;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Metadata,
    Fetch,
    Transcode,
    PublishRefs,
    Upload,
    IndexUpdate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Fetch => "fetch",
            Stage::Transcode => "transcode",
            Stage::PublishRefs => "publish-refs",
            Stage::Upload => "upload",
            Stage::IndexUpdate => "index-update",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where one repository is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    Pending,
    Fetched,
    Transcoded,
    RefsPublished,
    Uploaded(Cid),
    Archived(Cid),
    Failed(Stage),
}

impl RepoState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepoState::Archived(_) | RepoState::Failed(_))
    }

    /// The stage that leaves this state.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            RepoState::Pending => Some(Stage::Fetch),
            RepoState::Fetched => Some(Stage::Transcode),
            RepoState::Transcoded => Some(Stage::PublishRefs),
            RepoState::RefsPublished => Some(Stage::Upload),
            RepoState::Uploaded(_) => Some(Stage::IndexUpdate),
            RepoState::Archived(_) | RepoState::Failed(_) => None,
        }
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_become(&self, next: &RepoState) -> bool {
        match (self, next) {
            (_, RepoState::Failed(stage)) => self.next_stage() == Some(*stage),
            (RepoState::Pending, RepoState::Fetched)
            | (RepoState::Fetched, RepoState::Transcoded)
            | (RepoState::Transcoded, RepoState::RefsPublished)
            | (RepoState::RefsPublished, RepoState::Uploaded(_)) => true,
            (RepoState::Uploaded(a), RepoState::Archived(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoState::Pending => write!(f, "pending"),
            RepoState::Fetched => write!(f, "fetched"),
            RepoState::Transcoded => write!(f, "transcoded"),
            RepoState::RefsPublished => write!(f, "refs-published"),
            RepoState::Uploaded(cid) => write!(f, "uploaded ({})", cid),
            RepoState::Archived(cid) => write!(f, "archived ({})", cid),
            RepoState::Failed(stage) => write!(f, "failed at {}", stage),
        }
    }
}
