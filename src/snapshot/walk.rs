//! snapshot::walk
//!
//! Lazy depth-first walk of a directory tree.
//!
//! # Ordering
//!
//! Entries are produced in pre-order: a directory before its children,
//! children in bytewise name order. The same tree always yields the same
//! sequence.
//!
//! # Resource bounds
//!
//! A regular file is opened only when the walk reaches it and is handed out
//! as a [`TrackedFile`]. Every tracked file registers with the walk's
//! [`OpenFileGauge`] until dropped, so callers that drop each file before
//! pulling the next entry keep exactly one file open at a time, and the
//! gauge's peak proves it.
//!
//! # Failures
//!
//! The first failure ends the walk. It is returned from `next()` and also
//! recorded in a shared slot, so a caller that handed the walk to another
//! component can still tell a local read failure apart from a failure of
//! that component. Read errors on a file the walk handed out land in the
//! same slot.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::core::cancel::CancellationFlag;

/// Errors produced while walking a tree.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is neither a file, a directory nor a symbolic link")]
    UnsupportedType { path: PathBuf },

    #[error("{path} is not valid UTF-8")]
    NonUtf8 { path: PathBuf },

    #[error("tree walk cancelled")]
    Cancelled,
}

/// A cloneable record of the failure that ended a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    /// Entry being processed, `None` for cancellation.
    pub path: Option<PathBuf>,
    pub kind: io::ErrorKind,
    pub message: String,
    pub cancelled: bool,
}

impl WalkFailure {
    fn from_read(path: &Path, err: &io::Error) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("cannot read {}: {}", path.display(), err),
            cancelled: false,
        }
    }

    fn from_error(err: &WalkError) -> Self {
        let (path, kind) = match err {
            WalkError::Io { path, source } => (Some(path.clone()), source.kind()),
            WalkError::UnsupportedType { path } => (Some(path.clone()), io::ErrorKind::Unsupported),
            WalkError::NonUtf8 { path } => (Some(path.clone()), io::ErrorKind::InvalidData),
            WalkError::Cancelled => (None, io::ErrorKind::Interrupted),
        };
        Self {
            path,
            kind,
            message: err.to_string(),
            cancelled: matches!(err, WalkError::Cancelled),
        }
    }
}

/// Shared slot holding the failure that ended a walk, if any.
#[derive(Debug, Clone, Default)]
pub struct FailureSlot(Arc<Mutex<Option<WalkFailure>>>);

impl FailureSlot {
    fn record(&self, failure: WalkFailure) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(failure);
        }
    }

    /// The recorded failure.
    pub fn get(&self) -> Option<WalkFailure> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Counts files currently open through [`TrackedFile`] and the peak.
#[derive(Debug, Clone, Default)]
pub struct OpenFileGauge(Arc<GaugeInner>);

#[derive(Debug, Default)]
struct GaugeInner {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl OpenFileGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files open right now.
    pub fn current(&self) -> usize {
        self.0.current.load(Ordering::SeqCst)
    }

    /// Highest number of files that were open at the same time.
    pub fn peak(&self) -> usize {
        self.0.peak.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open regular file registered with an [`OpenFileGauge`].
///
/// A failed read is recorded in the walk's [`FailureSlot`] before the error
/// is returned.
pub struct TrackedFile {
    reader: Box<dyn Read + Send>,
    path: PathBuf,
    gauge: OpenFileGauge,
    failure: FailureSlot,
}

impl TrackedFile {
    fn open(path: PathBuf, gauge: &OpenFileGauge, failure: &FailureSlot) -> io::Result<Self> {
        let file = File::open(&path)?;
        Ok(Self::from_reader(path, Box::new(file), gauge, failure))
    }

    fn from_reader(
        path: PathBuf,
        reader: Box<dyn Read + Send>,
        gauge: &OpenFileGauge,
        failure: &FailureSlot,
    ) -> Self {
        gauge.acquire();
        Self {
            reader,
            path,
            gauge: gauge.clone(),
            failure: failure.clone(),
        }
    }

    /// Filesystem path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for TrackedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).inspect_err(|err| {
            if err.kind() != io::ErrorKind::Interrupted {
                self.failure.record(WalkFailure::from_read(&self.path, err));
            }
        })
    }
}

impl Drop for TrackedFile {
    fn drop(&mut self) {
        self.gauge.release();
    }
}

impl fmt::Debug for TrackedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedFile").field("path", &self.path).finish()
    }
}

/// What a walked entry is.
#[derive(Debug)]
pub enum EntryKind {
    Directory,
    File(TrackedFile),
    /// A symbolic link, kept as its unresolved target string.
    Symlink(String),
}

/// One entry of a walk.
#[derive(Debug)]
pub struct TreeEntry {
    /// Path relative to the walk root, `/`-separated; empty for the root.
    pub path: String,
    pub kind: EntryKind,
}

/// Lazy pre-order walk over a directory tree.
pub struct TreeWalk {
    root: PathBuf,
    pending: Vec<String>,
    gauge: OpenFileGauge,
    failure: FailureSlot,
    cancel: CancellationFlag,
    done: bool,
}

impl fmt::Debug for TreeWalk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeWalk")
            .field("root", &self.root)
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}

impl TreeWalk {
    /// Start a walk at `root`, which must be a directory.
    pub fn new(root: impl Into<PathBuf>, cancel: CancellationFlag) -> Self {
        Self {
            root: root.into(),
            pending: vec![String::new()],
            gauge: OpenFileGauge::new(),
            failure: FailureSlot::default(),
            cancel,
            done: false,
        }
    }

    /// Handle to the open-file gauge of this walk.
    pub fn gauge(&self) -> OpenFileGauge {
        self.gauge.clone()
    }

    /// Handle to the failure slot of this walk.
    pub fn failure_slot(&self) -> FailureSlot {
        self.failure.clone()
    }

    /// Root directory of the walk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn visit(&mut self, rel: String) -> Result<TreeEntry, WalkError> {
        let abs = self.absolute(&rel);
        let io_err = |source: io::Error| WalkError::Io {
            path: abs.clone(),
            source,
        };
        let meta = fs::symlink_metadata(&abs).map_err(io_err)?;
        let file_type = meta.file_type();

        let kind = if file_type.is_symlink() {
            let target = fs::read_link(&abs).map_err(io_err)?;
            let target = target.into_os_string().into_string().map_err(|_| {
                WalkError::NonUtf8 { path: abs.clone() }
            })?;
            EntryKind::Symlink(target)
        } else if file_type.is_dir() {
            let mut names = Vec::new();
            for entry in fs::read_dir(&abs).map_err(io_err)? {
                let entry = entry.map_err(io_err)?;
                let name = entry.file_name().into_string().map_err(|_| WalkError::NonUtf8 {
                    path: entry.path(),
                })?;
                names.push(name);
            }
            names.sort();
            for name in names.into_iter().rev() {
                let child = if rel.is_empty() {
                    name
                } else {
                    format!("{}/{}", rel, name)
                };
                self.pending.push(child);
            }
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File(
                TrackedFile::open(abs.clone(), &self.gauge, &self.failure).map_err(io_err)?,
            )
        } else {
            return Err(WalkError::UnsupportedType { path: abs });
        };

        Ok(TreeEntry { path: rel, kind })
    }

    fn fail(&mut self, err: WalkError) -> Option<Result<TreeEntry, WalkError>> {
        self.done = true;
        self.pending.clear();
        self.failure.record(WalkFailure::from_error(&err));
        Some(Err(err))
    }
}

impl Iterator for TreeWalk {
    type Item = Result<TreeEntry, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.fail(WalkError::Cancelled);
        }
        let Some(rel) = self.pending.pop() else {
            self.done = true;
            return None;
        };
        match self.visit(rel) {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => self.fail(err),
        }
    }
}
