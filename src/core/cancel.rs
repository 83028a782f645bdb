//! core::cancel
//!
//! Cooperative cancellation for long-running stages.
//!
//! A [`CancellationFlag`] is cloned into every stage of a run. Stages call
//! [`CancellationFlag::checkpoint`] between units of work (per object, per
//! file, per chunk) and return their own `Cancelled` variant when it fails.
//! Partial work is cleaned up by the stage that observed the cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Returned by [`CancellationFlag::checkpoint`] once cancellation was requested.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A shareable cancellation flag.
///
/// Clones observe the same flag. Once cancelled, a flag stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create a flag in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`Cancelled`] if cancellation has been requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.checkpoint().is_ok());
    }

    #[test]
    fn clones_share_state() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();

        flag.cancel();
        assert!(observer.is_cancelled());
        assert_eq!(observer.checkpoint(), Err(Cancelled));
    }

    #[test]
    fn visible_across_threads() {
        let flag = CancellationFlag::new();
        let remote = flag.clone();

        std::thread::spawn(move || remote.cancel())
            .join()
            .unwrap();
        assert!(flag.is_cancelled());
    }
}
