//! index::document
//!
//! Canonical encoding of an [`Index`] as a JSON document.
//!
//! # Format
//!
//! ```json
//! {"a/b":{"lastMetadataFetch":"2022-04-05T11:40:00Z","rank":5,"repo":{"/":"Qm..."},"stars":10,"url":"https://example.com/a/b"}}
//! ```
//!
//! - compact, no insignificant whitespace
//! - outer keys in bytewise order, record fields in bytewise order
//! - `repo` is a content link (`{"/": cid}`), omitted until the repository
//!   has been archived
//! - timestamps are RFC 3339 in UTC with a `Z` suffix; sub-second digits
//!   only when the value has them
//!
//! [`encode`] is a pure function of the index contents, so equal indexes
//! always encode to identical bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::IndexError;
use crate::core::metadata::{Index, RepoMetadata};
use crate::core::types::{Cid, RepoLink};

/// A content link, `{"/": "<cid>"}`.
#[derive(Debug, Serialize, Deserialize)]
struct Link {
    #[serde(rename = "/")]
    target: String,
}

/// One record as it appears in the document. Fields are declared in the
/// order they are written.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    #[serde(rename = "lastMetadataFetch")]
    last_metadata_fetch: String,
    rank: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo: Option<Link>,
    stars: u64,
    url: String,
}

impl From<&RepoMetadata> for Record {
    fn from(meta: &RepoMetadata) -> Self {
        Self {
            last_metadata_fetch: meta
                .last_fetched_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            rank: meta.rank,
            repo: meta.archive_ref.as_ref().map(|cid| Link {
                target: cid.as_str().to_string(),
            }),
            stars: meta.star_count,
            url: meta.source_url.clone(),
        }
    }
}

impl Record {
    fn into_metadata(self, key: &str) -> Result<RepoMetadata, IndexError> {
        let decode_err = |message: String| IndexError::Decode {
            key: Some(key.to_string()),
            message,
        };
        let last_fetched_at = DateTime::parse_from_rfc3339(&self.last_metadata_fetch)
            .map_err(|e| decode_err(format!("lastMetadataFetch: {}", e)))?
            .with_timezone(&Utc);
        let archive_ref = self
            .repo
            .map(|link| Cid::new(link.target))
            .transpose()
            .map_err(|e| decode_err(format!("repo: {}", e)))?;

        Ok(RepoMetadata {
            source_url: self.url,
            rank: self.rank,
            star_count: self.stars,
            last_fetched_at,
            archive_ref,
        })
    }
}

/// Encode an index into its canonical document.
pub fn encode(index: &Index) -> Vec<u8> {
    let doc: BTreeMap<&str, Record> = index
        .iter()
        .map(|(link, meta)| (link.as_str(), Record::from(meta)))
        .collect();
    // Serializing string-keyed maps of plain structs cannot fail.
    serde_json::to_vec(&doc).unwrap_or_default()
}

/// Decode a document produced by [`encode`].
///
/// Unknown record fields are ignored. Errors name the offending key.
pub fn decode(bytes: &[u8]) -> Result<Index, IndexError> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| IndexError::Decode {
            key: None,
            message: e.to_string(),
        })?;

    let mut index = Index::new();
    for (key, value) in raw {
        let record: Record = serde_json::from_value(value).map_err(|e| IndexError::Decode {
            key: Some(key.clone()),
            message: e.to_string(),
        })?;
        let link = RepoLink::new(key.as_str()).map_err(|e| IndexError::Decode {
            key: Some(key.clone()),
            message: e.to_string(),
        })?;
        let meta = record.into_metadata(&key)?;
        index.insert(link, meta);
    }
    Ok(index)
}
