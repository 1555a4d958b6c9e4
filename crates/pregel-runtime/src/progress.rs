//! Progress reporting hooks.
//!
//! The driver calls `begin_task` once when a run starts, then opens one
//! sub-task per superstep with the number of active nodes as its volume. Workers report processed nodes in batches while the
//! sub-task is open, so `log_progress` is called concurrently.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::{debug, info};

pub trait ProgressTracker: Send + Sync {
    /// Called once at the start of every run, before its first sub-task.
    fn begin_task(&self) {}

    fn begin_sub_task(&self, volume: u64) {
        let _ = volume;
    }

    fn log_progress(&self, processed: u64) {
        let _ = processed;
    }

    fn end_sub_task(&self) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressTracker for NoopProgress {}

/// Emits `tracing` events at every tenth of a superstep's volume.
#[derive(Debug)]
pub struct LoggingProgress {
    task: String,
    superstep: AtomicU32,
    volume: AtomicU64,
    processed: AtomicU64,
    /// Last reported tenth, so each decile is logged once.
    reported: AtomicU64,
}

impl LoggingProgress {
    pub fn new(task: impl Into<String>) -> Self {
        LoggingProgress {
            task: task.into(),
            superstep: AtomicU32::new(0),
            volume: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            reported: AtomicU64::new(0),
        }
    }

    /// Supersteps finished since the current run started.
    pub fn supersteps(&self) -> u32 {
        self.superstep.load(Ordering::Relaxed)
    }

    /// Nodes reported so far in the open sub-task.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl ProgressTracker for LoggingProgress {
    fn begin_task(&self) {
        self.superstep.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.reported.store(0, Ordering::Relaxed);
    }

    fn begin_sub_task(&self, volume: u64) {
        self.volume.store(volume, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.reported.store(0, Ordering::Relaxed);
        let superstep = self.superstep.load(Ordering::Relaxed);
        info!(task = %self.task, superstep, active_nodes = volume, "superstep started");
    }

    fn log_progress(&self, processed: u64) {
        let done = self.processed.fetch_add(processed, Ordering::Relaxed) + processed;
        let volume = self.volume.load(Ordering::Relaxed).max(1);
        let tenth = (done.min(volume) * 10) / volume;
        if self.reported.fetch_max(tenth, Ordering::Relaxed) < tenth {
            debug!(task = %self.task, percent = tenth * 10, "progress");
        }
    }

    fn end_sub_task(&self) {
        let superstep = self.superstep.fetch_add(1, Ordering::Relaxed);
        info!(
            task = %self.task,
            superstep,
            processed = self.processed(),
            "superstep finished"
        );
    }
}
