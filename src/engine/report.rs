//! engine::report
//!
//! Aggregate result of a run.

use std::fmt;

use super::state::Stage;
use super::StageError;
use crate::core::types::{Cid, RepoLink};

/// A repository that reached `Archived`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRepo {
    pub link: RepoLink,
    pub cid: Cid,
}

/// A repository that reached `Failed`.
#[derive(Debug)]
pub struct FailedRepo {
    pub link: RepoLink,
    pub stage: Stage,
    pub error: StageError,
}

/// Outcome of one orchestrator run, in processing order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub archived: Vec<ArchivedRepo>,
    pub failed: Vec<FailedRepo>,
    /// Identifier of the last index document published during the run.
    pub index_cid: Option<Cid>,
}

impl RunReport {
    /// Whether every repository was archived.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total repositories processed.
    pub fn total(&self) -> usize {
        self.archived.len() + self.failed.len()
    }

    /// The failure recorded for `link`, if any.
    pub fn failure(&self, link: &RepoLink) -> Option<&FailedRepo> {
        self.failed.iter().find(|f| &f.link == link)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} archived, {} failed",
            self.archived.len(),
            self.failed.len()
        )?;
        for repo in &self.archived {
            writeln!(f, "  archived {} -> {}", repo.link, repo.cid)?;
        }
        for repo in &self.failed {
            writeln!(f, "  failed   {} at {}: {}", repo.link, repo.stage, repo.error)?;
        }
        if let Some(cid) = &self.index_cid {
            write!(f, "index: {}", cid)?;
        }
        Ok(())
    }
}
