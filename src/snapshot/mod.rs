//! snapshot
//!
//! SnapshotUploader and the pieces it is built from.
//!
//! # Modules
//!
//! - [`walk`] - lazy, sorted, pre-order tree walk with an open-file gauge
//! - [`multipart`] - streaming multipart encoding of a walk
//! - [`uploader`] - the upload itself: one atomic add, then an explicit pin

pub mod multipart;
pub mod uploader;
pub mod walk;

pub use uploader::{Snapshot, SnapshotUploader, UploadError, ROOT_NAME};
pub use walk::{EntryKind, OpenFileGauge, TreeEntry, TreeWalk};
