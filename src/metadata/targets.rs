//! metadata::targets
//!
//! A [`MetadataSource`] backed by a JSON list of targets.
//!
//! # Format
//!
//! ```json
//! [
//!   {"link": "torvalds/linux", "rank": 1, "stars": 170000,
//!    "lastMetadataFetch": "2022-04-05T11:40:00Z"},
//!   {"link": "example/mirror", "url": "https://git.example.com/mirror.git",
//!    "rank": 2, "stars": 10, "lastMetadataFetch": "2022-04-05T11:40:00Z"}
//! ]
//! ```
//!
//! `url` defaults to `https://github.com/<link>`.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{MetadataError, MetadataSource};
use crate::core::metadata::RepoMetadata;
use crate::core::types::RepoLink;

/// One entry of a targets file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub link: RepoLink,
    #[serde(default)]
    pub url: Option<String>,
    pub rank: u64,
    pub stars: u64,
    #[serde(rename = "lastMetadataFetch")]
    pub last_metadata_fetch: DateTime<Utc>,
}

impl Target {
    /// Source URL, defaulting to the GitHub URL of the link.
    pub fn source_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{}", self.link))
    }

    fn metadata(&self) -> RepoMetadata {
        RepoMetadata::new(
            self.source_url(),
            self.rank,
            self.stars,
            self.last_metadata_fetch,
        )
    }
}

/// Targets held in memory, usually loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct TargetsFile {
    targets: Vec<Target>,
}

impl TargetsFile {
    /// Load targets from a JSON file.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = fs::read_to_string(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let targets: Vec<Target> =
            serde_json::from_str(&content).map_err(|e| MetadataError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self { targets })
    }

    /// Use an explicit list of targets.
    pub fn from_targets(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl MetadataSource for TargetsFile {
    fn name(&self) -> &'static str {
        "targets-file"
    }

    async fn list_links(&self) -> Result<Vec<RepoLink>, MetadataError> {
        Ok(self.targets.iter().map(|t| t.link.clone()).collect())
    }

    async fn fetch(&self, link: &RepoLink) -> Result<RepoMetadata, MetadataError> {
        self.targets
            .iter()
            .find(|t| &t.link == link)
            .map(Target::metadata)
            .ok_or_else(|| MetadataError::Unknown { link: link.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"[
        {"link": "a/b", "rank": 1, "stars": 10, "lastMetadataFetch": "2022-04-05T11:40:00Z"},
        {"link": "c/d", "url": "file:///srv/c/d", "rank": 2, "stars": 3, "lastMetadataFetch": "2022-04-05T11:40:00Z"}
    ]"#;

    #[tokio::test]
    async fn loads_and_fetches() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let source = TargetsFile::load(file.path()).unwrap();

        let links = source.list_links().await.unwrap();
        assert_eq!(links.len(), 2);

        let ab = source.fetch(&links[0]).await.unwrap();
        assert_eq!(ab.source_url, "https://github.com/a/b");
        assert_eq!(ab.rank, 1);
        assert!(!ab.is_archived());

        let cd = source.fetch(&links[1]).await.unwrap();
        assert_eq!(cd.source_url, "file:///srv/c/d");
    }

    #[tokio::test]
    async fn unknown_link() {
        let source = TargetsFile::default();
        let link = RepoLink::new("x/y").unwrap();
        assert!(matches!(
            source.fetch(&link).await,
            Err(MetadataError::Unknown { .. })
        ));
    }

    #[test]
    fn unknown_field_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"link":"a/b","rank":1,"stars":1,"lastMetadataFetch":"2022-04-05T11:40:00Z","extra":1}]"#)
            .unwrap();
        assert!(matches!(
            TargetsFile::load(file.path()),
            Err(MetadataError::Parse { .. })
        ));
    }
}
