//! core
//!
//! Core domain types, configuration and run-wide primitives.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, Cid, RepoLink, ObjectKind
//! - [`metadata`] - Repository metadata records and the index mapping
//! - [`config`] - Configuration schema and loading
//! - [`cancel`] - Cooperative cancellation flag
//! - [`lock`] - Exclusive workspace lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Nothing in `core` performs network I/O

pub mod cancel;
pub mod config;
pub mod lock;
pub mod metadata;
pub mod types;
