//! core::lock
//!
//! Exclusive workspace lock for archive runs.
//!
//! # Architecture
//!
//! Persistent clones live under the workspace directory and are mutated by
//! fetch and transcode. Two runs sharing a workspace would race on the same
//! object directories, so a run holds this lock for its whole duration.
//!
//! # Storage
//!
//! - `<workspace>/.gh1000.lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is released on drop
//! - Acquisition is non-blocking (fails fast if locked)

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// File name of the lock inside the workspace.
pub const LOCK_FILE_NAME: &str = ".gh1000.lock";

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("workspace {0} is locked by another run")]
    AlreadyLocked(PathBuf),

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive lock on a workspace directory.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    file: Option<File>,
}

impl WorkspaceLock {
    /// Acquire the lock for `workspace`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(workspace: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(workspace).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", workspace.display(), e))
        })?;

        let path = workspace.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(workspace.to_path_buf()))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
