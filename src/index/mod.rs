//! index
//!
//! IndexStore: the published mapping from repository link to archive
//! metadata.
//!
//! # Modules
//!
//! - [`document`] - deterministic encode/decode of the index document
//! - [`store`] - retrieve/save through the content store and name record

pub mod document;
pub mod store;

pub use document::{decode, encode};
pub use store::{IndexStore, RecordSettings};

use thiserror::Error;

use crate::store::StoreError;

/// Errors from reading or publishing the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The document is not a valid index.
    #[error("cannot decode index{}: {message}", entry_suffix(.key))]
    Decode {
        /// Entry being decoded, `None` if the document itself is malformed.
        key: Option<String>,
        message: String,
    },

    /// The name record has never been published.
    #[error("index name {name} has not been published")]
    NameNotFound { name: String },

    /// The configured key does not exist in the store.
    #[error("key '{key}' does not exist in the store keystore")]
    KeyNotFound { key: String },

    #[error("index {op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("index operation cancelled")]
    Cancelled,
}

fn entry_suffix(key: &Option<String>) -> String {
    key.as_ref()
        .map(|k| format!(" entry '{}'", k))
        .unwrap_or_default()
}
