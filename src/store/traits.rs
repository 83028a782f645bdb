//! store::traits
//!
//! ContentStore trait definition for the content-addressed store and its
//! mutable name records.
//!
//! # Design
//!
//! The trait is async because every operation is network I/O against the
//! store daemon. Implementations never retry; a failed call is reported
//! once and retry policy belongs to the caller.
//!
//! # Example
//!
//! ```ignore
//! use gh1000::store::{AddContent, ContentStore};
//!
//! async fn publish_doc(store: &dyn ContentStore, doc: Vec<u8>) -> Result<(), StoreError> {
//!     let cid = store
//!         .add(AddContent::bytes("index.json", doc), true)
//!         .await?;
//!     let key = store.key_id("gh1000").await?;
//!     store.publish(&cid, "gh1000", lifetime, ttl).await?;
//!     assert_eq!(store.resolve(&key).await?, cid);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::types::Cid;
use crate::snapshot::walk::TreeWalk;

/// Errors from store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The name has never been published (or its record expired).
    #[error("name not found: {0}")]
    NameNotFound(String),

    /// No key with this name exists in the store's keystore.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The requested content is not available.
    #[error("content not found: {0}")]
    NotFound(String),

    /// The store rejected the request.
    #[error("store API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the store
        message: String,
    },

    /// The store answered with something that could not be understood.
    #[error("malformed store response: {0}")]
    Malformed(String),

    /// The operation was cancelled before completing.
    #[error("store operation cancelled")]
    Cancelled,
}

/// Content handed to [`ContentStore::add`].
#[derive(Debug)]
pub enum AddContent {
    /// A single named file held in memory.
    Bytes { name: String, data: Bytes },
    /// A directory tree, streamed entry by entry.
    Tree {
        /// Name the tree root is added under.
        root_name: String,
        walk: TreeWalk,
    },
}

impl AddContent {
    /// Convenience constructor for in-memory content.
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        AddContent::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Convenience constructor for a tree.
    pub fn tree(root_name: impl Into<String>, walk: TreeWalk) -> Self {
        AddContent::Tree {
            root_name: root_name.into(),
            walk,
        }
    }
}

/// A published mutable name record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    /// The name (key id) the record is published under.
    pub name: String,
    /// The content the name now points at.
    pub value: Cid,
}

/// The content-addressed store consumed by the pipeline.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short name of the implementation (for logs).
    fn name(&self) -> &'static str;

    /// Add content, returning its identifier. With `pin`, the content is
    /// retained against garbage collection.
    ///
    /// A tree add is atomic: on error no identifier is returned.
    async fn add(&self, content: AddContent, pin: bool) -> Result<Cid, StoreError>;

    /// Fetch the bytes stored under `cid`.
    async fn cat(&self, cid: &Cid) -> Result<Bytes, StoreError>;

    /// Pin `cid` (idempotent).
    async fn pin(&self, cid: &Cid) -> Result<(), StoreError>;

    /// Look up the id of the key named `key_name`.
    async fn key_id(&self, key_name: &str) -> Result<String, StoreError>;

    /// Resolve a published name to the content it points at.
    ///
    /// Returns [`StoreError::NameNotFound`] if nothing was ever published.
    async fn resolve(&self, name: &str) -> Result<Cid, StoreError>;

    /// Point the name of key `key_name` at `cid`.
    async fn publish(
        &self,
        cid: &Cid,
        key_name: &str,
        lifetime: Duration,
        ttl: Duration,
    ) -> Result<NameRecord, StoreError>;
}

/// Render a duration the way the store's RPC parameters expect (`"<n>s"`).
pub fn duration_param(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_rendering() {
        assert_eq!(duration_param(Duration::from_secs(2400 * 3600)), "8640000s");
        assert_eq!(duration_param(Duration::from_secs(3600)), "3600s");
    }

    #[test]
    fn error_display() {
        let err = StoreError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "store API error: 500 - boom");
    }
}
