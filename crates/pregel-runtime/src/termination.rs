//! Cooperative cancellation, polled once at the start of every superstep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait TerminationFlag: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// A flag that is never raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl TerminationFlag for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation switch. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl TerminationFlag for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
