//! store::memory
//!
//! In-memory content store for deterministic testing.
//!
//! # Design
//!
//! Content identifiers are derived from a SHA-256 digest of the content (for
//! trees: of every entry's path, kind and bytes, in walk order), so identical
//! content always gets the identical identifier. Name records, keys and pins
//! live in maps. Failures can be injected per operation and every call is
//! recorded for verification.
//!
//! # Example
//!
//! ```
//! use gh1000::store::memory::MemoryStore;
//! use gh1000::store::{AddContent, ContentStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new().with_key("gh1000");
//! let cid = store.add(AddContent::bytes("doc", b"{}".to_vec()), true).await.unwrap();
//!
//! assert_eq!(&store.cat(&cid).await.unwrap()[..], b"{}");
//! assert!(store.is_pinned(&cid));
//! # });
//! ```

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::traits::{AddContent, ContentStore, NameRecord, StoreError};
use crate::core::types::Cid;
use crate::snapshot::walk::EntryKind;

/// In-memory store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// Stored blobs by identifier. Trees are stored as their manifest.
    blobs: HashMap<Cid, Bytes>,
    pins: HashSet<Cid>,
    /// Key name to key id.
    keys: HashMap<String, String>,
    /// Key id to current record value.
    names: HashMap<String, Cid>,
    fail_on: Option<FailOn>,
    operations: Vec<StoreOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    Add(StoreError),
    /// Fail only adds of trees (leaves document adds working).
    AddTree(StoreError),
    Cat(StoreError),
    Pin(StoreError),
    Resolve(StoreError),
    Publish(StoreError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Add { cid: Option<Cid>, pin: bool },
    Cat { cid: Cid },
    Pin { cid: Cid },
    KeyId { key_name: String },
    Resolve { name: String },
    Publish { cid: Cid, key_name: String, lifetime: Duration, ttl: Duration },
}

impl MemoryStore {
    /// Create an empty store with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key; its id is derived from the name.
    pub fn with_key(self, key_name: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .keys
                .insert(key_name.to_string(), format!("k51{}", key_name));
        }
        self
    }

    /// Configure the store to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(Some(fail_on));
        self
    }

    /// Change the failure configuration on a shared store.
    pub fn set_fail_on(&self, fail_on: Option<FailOn>) {
        self.inner.lock().unwrap().fail_on = fail_on;
    }

    /// All recorded operations.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Whether `cid` is pinned.
    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.inner.lock().unwrap().pins.contains(cid)
    }

    /// Whether `cid` is stored.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.inner.lock().unwrap().blobs.contains_key(cid)
    }

    /// Current value of the record published under `key_name`.
    pub fn published(&self, key_name: &str) -> Option<Cid> {
        let inner = self.inner.lock().unwrap();
        let id = inner.keys.get(key_name)?;
        inner.names.get(id).cloned()
    }

    fn record(&self, op: StoreOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    fn check_fail(&self, expected: &str) -> Result<(), StoreError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(FailOn::Add(e)) if expected == "add" || expected == "add_tree" => Err(e.clone()),
            Some(FailOn::AddTree(e)) if expected == "add_tree" => Err(e.clone()),
            Some(FailOn::Cat(e)) if expected == "cat" => Err(e.clone()),
            Some(FailOn::Pin(e)) if expected == "pin" => Err(e.clone()),
            Some(FailOn::Resolve(e)) if expected == "resolve" => Err(e.clone()),
            Some(FailOn::Publish(e)) if expected == "publish" => Err(e.clone()),
            _ => Ok(()),
        }
    }

    fn store_blob(&self, data: Bytes, pin: bool) -> Cid {
        let cid = cid_for(&data);
        let mut inner = self.inner.lock().unwrap();
        inner.blobs.insert(cid.clone(), data);
        if pin {
            inner.pins.insert(cid.clone());
        }
        cid
    }
}

/// Deterministic identifier for `data`.
fn cid_for(data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    // Hex digits are alphanumeric, so this is always a valid Cid.
    Cid::new(format!("b{}", hex::encode(digest))).unwrap_or_else(|_| unreachable!())
}

/// Consume a tree walk into a manifest listing every entry, with file
/// contents summarized by digest.
fn tree_manifest(
    root_name: &str,
    walk: crate::snapshot::walk::TreeWalk,
) -> Result<Bytes, StoreError> {
    let mut manifest = String::new();
    manifest.push_str(root_name);
    manifest.push('\n');

    for entry in walk {
        let entry = entry.map_err(|e| StoreError::Unavailable(format!("upload aborted: {}", e)))?;
        match entry.kind {
            EntryKind::Directory => manifest.push_str(&format!("d {}\n", entry.path)),
            EntryKind::Symlink(target) => {
                manifest.push_str(&format!("l {} {}\n", entry.path, target))
            }
            EntryKind::File(mut file) => {
                let mut hasher = Sha256::new();
                let mut buf = [0u8; 8192];
                loop {
                    let n = file
                        .read(&mut buf)
                        .map_err(|e| StoreError::Unavailable(format!("upload aborted: {}", e)))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                manifest.push_str(&format!(
                    "f {} {}\n",
                    entry.path,
                    hex::encode(hasher.finalize())
                ));
            }
        }
    }
    Ok(Bytes::from(manifest))
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, content: AddContent, pin: bool) -> Result<Cid, StoreError> {
        let result = match content {
            AddContent::Bytes { data, .. } => self
                .check_fail("add")
                .map(|()| self.store_blob(data, pin)),
            AddContent::Tree { root_name, walk } => self
                .check_fail("add_tree")
                .and_then(|()| tree_manifest(&root_name, walk))
                .map(|manifest| self.store_blob(manifest, pin)),
        };
        self.record(StoreOperation::Add {
            cid: result.as_ref().ok().cloned(),
            pin,
        });
        result
    }

    async fn cat(&self, cid: &Cid) -> Result<Bytes, StoreError> {
        self.record(StoreOperation::Cat { cid: cid.clone() });
        self.check_fail("cat")?;
        self.inner
            .lock()
            .unwrap()
            .blobs
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(cid.to_string()))
    }

    async fn pin(&self, cid: &Cid) -> Result<(), StoreError> {
        self.record(StoreOperation::Pin { cid: cid.clone() });
        self.check_fail("pin")?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.blobs.contains_key(cid) {
            return Err(StoreError::NotFound(cid.to_string()));
        }
        inner.pins.insert(cid.clone());
        Ok(())
    }

    async fn key_id(&self, key_name: &str) -> Result<String, StoreError> {
        self.record(StoreOperation::KeyId {
            key_name: key_name.to_string(),
        });
        self.inner
            .lock()
            .unwrap()
            .keys
            .get(key_name)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key_name.to_string()))
    }

    async fn resolve(&self, name: &str) -> Result<Cid, StoreError> {
        self.record(StoreOperation::Resolve {
            name: name.to_string(),
        });
        self.check_fail("resolve")?;
        self.inner
            .lock()
            .unwrap()
            .names
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()))
    }

    async fn publish(
        &self,
        cid: &Cid,
        key_name: &str,
        lifetime: Duration,
        ttl: Duration,
    ) -> Result<NameRecord, StoreError> {
        self.record(StoreOperation::Publish {
            cid: cid.clone(),
            key_name: key_name.to_string(),
            lifetime,
            ttl,
        });
        self.check_fail("publish")?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .keys
            .get(key_name)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key_name.to_string()))?;
        inner.names.insert(id.clone(), cid.clone());
        Ok(NameRecord {
            name: id,
            value: cid.clone(),
        })
    }
}
