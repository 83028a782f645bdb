//! gh1000 - archive ranked git repositories into IPFS
//!
//! gh1000 fetches each target repository, turns it into a tree that dumb
//! HTTP git clients can clone straight out of a content-addressed store,
//! uploads and pins that tree, and records the result in a published,
//! queryable index.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates)
//! - [`engine`] - Orchestrator: per-repository state machine and run report
//! - [`git`] - Single interface for all Git operations (fetch, pack
//!   transcoding, ref manifest)
//! - [`snapshot`] - Streaming tree upload
//! - [`index`] - Deterministic index document and its name record
//! - [`store`] - Content store abstraction (Kubo RPC, in-memory)
//! - [`metadata`] - Target repositories and their ranking metadata
//! - [`core`] - Domain types, configuration, locking, cancellation
//! - [`ui`] - User-facing output
//!
//! # Correctness Invariants
//!
//! 1. Every loose object decodes to exactly the object it was written from
//! 2. A pack is deleted only after all of its objects are materialized
//! 3. An upload either yields an identifier for the whole tree or fails
//! 4. Equal indexes encode to identical documents
//! 5. One failing repository never stops the others

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod index;
pub mod metadata;
pub mod snapshot;
pub mod store;
pub mod ui;
