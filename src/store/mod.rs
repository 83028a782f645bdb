//! store
//!
//! Access to the content-addressed store and its mutable name records.
//!
//! # Implementations
//!
//! - [`kubo::KuboStore`] - the IPFS (Kubo) RPC API over HTTP
//! - [`memory::MemoryStore`] - in-memory store for deterministic testing
//!
//! Everything above this module talks to the store through the
//! [`ContentStore`] trait only.

pub mod kubo;
pub mod memory;
pub mod traits;

pub use kubo::KuboStore;
pub use memory::MemoryStore;
pub use traits::{duration_param, AddContent, ContentStore, NameRecord, StoreError};
