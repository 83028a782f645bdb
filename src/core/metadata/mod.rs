//! core::metadata
//!
//! Repository metadata records and the index that maps repository links
//! to them.
//!
//! # Data Model
//!
//! - [`RepoMetadata`]: ranking information plus, once uploaded, the archive
//!   location of a repository
//! - [`Index`]: the mapping from [`RepoLink`] to [`RepoMetadata`]
//!
//! # Invariants
//!
//! - Keys of an [`Index`] are unique; that is the only structural invariant
//! - `archive_ref` is absent until an upload succeeds
//! - Iteration order of an [`Index`] is the bytewise order of its keys,
//!   independent of insertion order

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::types::{Cid, RepoLink};

/// Ranking metadata and archive location of one repository.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gh1000::core::metadata::RepoMetadata;
/// use gh1000::core::types::Cid;
///
/// let meta = RepoMetadata::new(
///     "https://github.com/a/b",
///     5,
///     10,
///     Utc.with_ymd_and_hms(2022, 4, 5, 11, 40, 0).unwrap(),
/// );
/// assert!(!meta.is_archived());
///
/// let archived = meta.with_archive(Cid::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap());
/// assert!(archived.is_archived());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    /// Canonical clone URL of the repository.
    pub source_url: String,
    /// Position in the ranking (1 is first).
    pub rank: u64,
    /// Number of stars at the time the metadata was fetched.
    pub star_count: u64,
    /// When the ranking site last refreshed this record.
    pub last_fetched_at: DateTime<Utc>,
    /// Content identifier of the uploaded snapshot.
    pub archive_ref: Option<Cid>,
}

impl RepoMetadata {
    /// Create a record that has not been archived yet.
    pub fn new(
        source_url: impl Into<String>,
        rank: u64,
        star_count: u64,
        last_fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            rank,
            star_count,
            last_fetched_at,
            archive_ref: None,
        }
    }

    /// Return a new record version pointing at an uploaded snapshot.
    ///
    /// The archive reference of a record version is never mutated in place;
    /// a new version replaces the old one in the index.
    pub fn with_archive(self, cid: Cid) -> Self {
        Self {
            archive_ref: Some(cid),
            ..self
        }
    }

    /// Whether a snapshot has been uploaded for this record.
    pub fn is_archived(&self) -> bool {
        self.archive_ref.is_some()
    }
}

/// The mapping from repository link to archive metadata.
///
/// Backed by a `BTreeMap` so iteration order is always the bytewise key
/// order, whatever order entries were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<RepoLink, RepoMetadata>,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `link`, returning the previous one.
    pub fn insert(&mut self, link: RepoLink, metadata: RepoMetadata) -> Option<RepoMetadata> {
        self.entries.insert(link, metadata)
    }

    /// Look up the record for `link`.
    pub fn get(&self, link: &RepoLink) -> Option<&RepoMetadata> {
        self.entries.get(link)
    }

    /// Remove the record for `link`.
    pub fn remove(&mut self, link: &RepoLink) -> Option<RepoMetadata> {
        self.entries.remove(link)
    }

    /// Number of repositories in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&RepoLink, &RepoMetadata)> {
        self.entries.iter()
    }

    /// Merge every entry of `other` into this index; `other` wins on conflicts.
    pub fn merge(&mut self, other: Index) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(RepoLink, RepoMetadata)> for Index {
    fn from_iter<I: IntoIterator<Item = (RepoLink, RepoMetadata)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Index {
    type Item = (RepoLink, RepoMetadata);
    type IntoIter = std::collections::btree_map::IntoIter<RepoLink, RepoMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
