//! index::store
//!
//! IndexStore: retrieve and republish the index through the content store
//! and a mutable name record.
//!
//! # Single writer
//!
//! `save` is an unconditional add-then-publish. Two concurrent writers race
//! and the later publish wins; callers serialize writers (the orchestrator
//! holds the workspace lock for the whole run).

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::document::{decode, encode};
use super::IndexError;
use crate::core::metadata::Index;
use crate::core::types::Cid;
use crate::store::{AddContent, ContentStore, StoreError};

/// File name the document is added under.
const DOCUMENT_NAME: &str = "index.json";

/// Name record parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSettings {
    /// Name of the key the record is published under.
    pub key_name: String,
    /// Validity lifetime of each published record.
    pub lifetime: Duration,
    /// Refresh interval hint for resolvers.
    pub ttl: Duration,
}

/// The published index, bound to one key.
pub struct IndexStore<'a> {
    store: &'a dyn ContentStore,
    settings: RecordSettings,
    key_id: String,
}

impl std::fmt::Debug for IndexStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("store", &self.store.name())
            .field("key_name", &self.settings.key_name)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl<'a> IndexStore<'a> {
    /// Bind to the key named in `settings`, looking up its id.
    pub async fn connect(
        store: &'a dyn ContentStore,
        settings: RecordSettings,
    ) -> Result<IndexStore<'a>, IndexError> {
        let key_id = store
            .key_id(&settings.key_name)
            .await
            .map_err(|e| match e {
                StoreError::KeyNotFound(key) => IndexError::KeyNotFound { key },
                source => IndexError::Store {
                    op: "key lookup",
                    source,
                },
            })?;
        debug!(key_name = %settings.key_name, %key_id, "index key resolved");
        Ok(Self {
            store,
            settings,
            key_id,
        })
    }

    /// Id of the key the index is published under.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Resolve the name record and decode the document it points at.
    ///
    /// Returns [`IndexError::NameNotFound`] if nothing was ever published.
    #[instrument(skip(self), fields(key = %self.settings.key_name))]
    pub async fn retrieve(&self) -> Result<Index, IndexError> {
        let cid = self.store.resolve(&self.key_id).await.map_err(|e| match e {
            StoreError::NameNotFound(name) => IndexError::NameNotFound { name },
            source => store_error("resolve", source),
        })?;
        let bytes = self
            .store
            .cat(&cid)
            .await
            .map_err(|e| store_error("cat", e))?;
        let index = decode(&bytes)?;
        debug!(%cid, entries = index.len(), "index retrieved");
        Ok(index)
    }

    /// Like [`retrieve`](Self::retrieve), with a never-published name read
    /// as the empty index.
    pub async fn retrieve_or_empty(&self) -> Result<Index, IndexError> {
        match self.retrieve().await {
            Err(IndexError::NameNotFound { name }) => {
                warn!(%name, "index has never been published; starting empty");
                Ok(Index::new())
            }
            other => other,
        }
    }

    /// Encode, add and pin `index`, then point the name record at it.
    #[instrument(skip(self, index), fields(key = %self.settings.key_name, entries = index.len()))]
    pub async fn save(&self, index: &Index) -> Result<Cid, IndexError> {
        let doc = encode(index);
        let cid = self
            .store
            .add(AddContent::bytes(DOCUMENT_NAME, doc), true)
            .await
            .map_err(|e| store_error("add", e))?;
        let record = self
            .store
            .publish(
                &cid,
                &self.settings.key_name,
                self.settings.lifetime,
                self.settings.ttl,
            )
            .await
            .map_err(|e| match e {
                StoreError::KeyNotFound(key) => IndexError::KeyNotFound { key },
                source => store_error("publish", source),
            })?;
        info!(%cid, name = %record.name, "index published");
        Ok(cid)
    }
}

fn store_error(op: &'static str, source: StoreError) -> IndexError {
    match source {
        StoreError::Cancelled => IndexError::Cancelled,
        source => IndexError::Store { op, source },
    }
}
