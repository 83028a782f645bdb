//! metadata
//!
//! The metadata collaborator: which repositories to archive and their
//! ranking information.
//!
//! # Design
//!
//! The pipeline only consumes the [`MetadataSource`] shape. Where the
//! records come from (a ranking site, a curated list) is up to the
//! implementation; [`targets::TargetsFile`] reads them from a JSON file.

pub mod targets;

pub use targets::{Target, TargetsFile};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::metadata::RepoMetadata;
use crate::core::types::RepoLink;

/// Errors from a metadata source.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read targets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse targets file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no metadata for {link}")]
    Unknown { link: RepoLink },

    #[error("metadata fetch for {link} failed: {message}")]
    Fetch { link: RepoLink, message: String },
}

/// Produces the repositories to archive and their metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Short name of the source (for logs).
    fn name(&self) -> &'static str;

    /// Links of every target repository.
    async fn list_links(&self) -> Result<Vec<RepoLink>, MetadataError>;

    /// Current metadata for one repository.
    async fn fetch(&self, link: &RepoLink) -> Result<RepoMetadata, MetadataError>;
}
