//! Cooperative cancellation for multi-worktree operations.
//!
//! Long-running operations (sync, full-sweep repair) poll the flag between
//! worktrees and never mid-worktree, so cancelling leaves every worktree
//! either untouched or fully processed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag. Cloning hands out another handle to the same
/// flag; a signal handler sets it, operations poll it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The raw atomic, for wiring into a signal handler.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}
