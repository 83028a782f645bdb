//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. No other module imports
//! `git2`, and nothing outside this module reads files under a working
//! clone's `objects/` or `refs/` directly.
//!
//! # Responsibilities
//!
//! - [`RepositorySource`]: clone or incrementally fetch a remote
//! - [`PackTranscoder`]: explode packs into loose objects
//! - [`RefPublisher`]: write the `info/refs` manifest
//!
//! # Invariants
//!
//! - Working clones are bare repositories
//! - Every stage observes the caller's cancellation flag
//! - All operations return strong types (Oid, ObjectKind)
//!
//! # Example
//!
//! ```ignore
//! use gh1000::core::cancel::CancellationFlag;
//! use gh1000::git::{PackTranscoder, RefPublisher, RepositorySource};
//! use std::path::Path;
//!
//! let storage = Path::new("/var/lib/gh1000/github.com/a/b");
//! let cancel = CancellationFlag::new();
//!
//! RepositorySource::new().fetch("https://github.com/a/b", storage, &cancel)?;
//! PackTranscoder::new().materialize(storage, &cancel)?;
//! RefPublisher::new().publish(storage, &cancel)?;
//! ```

mod interface;
pub mod loose;
pub mod pack_index;
pub mod refs;
pub mod source;
pub mod transcode;

pub use interface::{Git, GitError, RefEntry};
pub use refs::{RefPublisher, RefRecord, RefsError};
pub use source::{FetchError, FetchSummary, RepositorySource};
pub use transcode::{PackTranscoder, TranscodeError, TranscodeSummary};
