//! Partitioning and the worker side of superstep execution.
//!
//! Workers are spawned once per run and parked on the start barrier between
//! supersteps. The driver publishes a command (run superstep `T` or shut
//! down), meets the workers at the start barrier, and waits for them at the
//! end barrier. Everything a superstep writes is published to the driver and
//! to the next superstep by that end barrier.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Barrier;

use parking_lot::Mutex;
use pregel_core::{Graph, NodeId};
use tracing::trace;

use crate::active::ActiveSet;
use crate::computation::Computation;
use crate::context::{ComputeContext, WorkerTally};
use crate::error::{panic_message, PregelError};
use crate::message::Messages;
use crate::message_store::MessageStore;
use crate::paged::PagedSliceMut;
use crate::progress::ProgressTracker;

/// A contiguous range of node ids owned by one worker for a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub nodes: Range<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Splits `[0, node_count)` into `min(concurrency, node_count)` contiguous
/// ranges whose sizes differ by at most one. The first ranges take the
/// remainder.
pub fn partition(node_count: usize, concurrency: usize) -> Vec<Partition> {
    let parts = concurrency.max(1).min(node_count);
    if parts == 0 {
        return Vec::new();
    }
    let base = node_count / parts;
    let rem = node_count % parts;
    let mut start = 0;
    (0..parts)
        .map(|index| {
            let len = base + usize::from(index < rem);
            let nodes = start..start + len;
            start += len;
            Partition { index, nodes }
        })
        .collect()
}

/// Totals for one superstep, summed over workers.
pub(crate) type SuperstepTally = WorkerTally;

/// Barrier pair and shared command state between the driver and the workers.
pub(crate) struct Coordinator {
    start: Barrier,
    end: Barrier,
    superstep: AtomicU32,
    shutdown: AtomicBool,
    abort: AtomicBool,
    failure: Mutex<Option<PregelError>>,
    processed: AtomicU64,
    messages_sent: AtomicU64,
    messages_combined: AtomicU64,
    activated: AtomicU64,
}

impl Coordinator {
    pub(crate) fn new(workers: usize) -> Self {
        Coordinator {
            start: Barrier::new(workers + 1),
            end: Barrier::new(workers + 1),
            superstep: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            failure: Mutex::new(None),
            processed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_combined: AtomicU64::new(0),
            activated: AtomicU64::new(0),
        }
    }

    /// Driver: runs one superstep on all workers and waits for it to finish.
    pub(crate) fn run_superstep(&self, superstep: u32) -> Result<SuperstepTally, PregelError> {
        for counter in [
            &self.processed,
            &self.messages_sent,
            &self.messages_combined,
            &self.activated,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.superstep.store(superstep, Ordering::Relaxed);
        self.start.wait();
        self.end.wait();

        if let Some(err) = self.failure.lock().take() {
            return Err(err);
        }
        Ok(SuperstepTally {
            processed: self.processed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_combined: self.messages_combined.load(Ordering::Relaxed),
            activated: self.activated.load(Ordering::Relaxed),
        })
    }

    /// Driver: releases the workers from their loop. Must be called exactly
    /// once, after the last superstep.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.start.wait();
    }

    /// Worker: blocks until the next command. `None` means shut down.
    fn wait_for_work(&self) -> Option<u32> {
        self.start.wait();
        if self.shutdown.load(Ordering::Relaxed) {
            None
        } else {
            Some(self.superstep.load(Ordering::Relaxed))
        }
    }

    /// Worker: publishes its counters and meets the driver at the end barrier.
    fn finish_work(&self, tally: WorkerTally) {
        self.processed.fetch_add(tally.processed, Ordering::Relaxed);
        self.messages_sent.fetch_add(tally.messages_sent, Ordering::Relaxed);
        self.messages_combined
            .fetch_add(tally.messages_combined, Ordering::Relaxed);
        self.activated.fetch_add(tally.activated, Ordering::Relaxed);
        self.end.wait();
    }

    /// Records `err` unless an earlier failure is already recorded, and tells
    /// every worker to stop picking up nodes.
    fn fail(&self, err: PregelError) {
        self.abort.store(true, Ordering::Relaxed);
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}

/// Calls [`Coordinator::shutdown`] when dropped, so workers are released even
/// if the driver unwinds.
pub(crate) struct ShutdownOnDrop<'a>(pub &'a Coordinator);

impl Drop for ShutdownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Read-only state shared by every worker of a run.
pub(crate) struct Shared<'r, G, C: Computation<G>>
where
    G: Graph,
{
    pub graph: &'r G,
    pub computation: &'r C,
    pub store: MessageStore<'r, C::Message>,
    pub active: ActiveSet,
    pub coordinator: Coordinator,
    pub progress: &'r dyn ProgressTracker,
    pub progress_batch_size: u64,
    pub node_count: u64,
}

/// One worker thread: a partition and exclusive access to its values.
pub(crate) struct Worker<'s, 'r, 'v, G, C>
where
    G: Graph,
    C: Computation<G>,
{
    shared: &'s Shared<'r, G, C>,
    partition: Partition,
    values: PagedSliceMut<'v, C::Value>,
    current: Option<NodeId>,
}

impl<'s, 'r, 'v, G, C> Worker<'s, 'r, 'v, G, C>
where
    G: Graph,
    C: Computation<G>,
{
    pub(crate) fn new(
        shared: &'s Shared<'r, G, C>,
        partition: Partition,
        values: PagedSliceMut<'v, C::Value>,
    ) -> Self {
        Worker {
            shared,
            partition,
            values,
            current: None,
        }
    }

    /// Serves superstep commands until shutdown.
    pub(crate) fn run(mut self) {
        let shared = self.shared;
        let coordinator = &shared.coordinator;
        while let Some(superstep) = coordinator.wait_for_work() {
            self.current = None;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(superstep)));
            let tally = match outcome {
                Ok(Ok(tally)) => tally,
                Ok(Err(err)) => {
                    coordinator.fail(err);
                    WorkerTally::default()
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    let err = match self.current {
                        Some(node) => PregelError::ComputationPanicked {
                            node,
                            superstep,
                            message,
                        },
                        None => PregelError::WorkerPanicked { message },
                    };
                    coordinator.fail(err);
                    WorkerTally::default()
                }
            };
            coordinator.finish_work(tally);
        }
        trace!(partition = self.partition.index, "worker stopped");
    }

    /// Executes every active node of the partition for `superstep`, then
    /// clears the partition's bits in the current active generation.
    fn process(&mut self, superstep: u32) -> Result<WorkerTally, PregelError> {
        let shared = self.shared;
        let current = shared.active.current(superstep);
        let next = shared.active.next(superstep);
        let Range { start, end } = self.partition.nodes.clone();

        let mut tally = WorkerTally::default();
        let mut unreported = 0u64;

        for index in current.iter_range(start, end) {
            if shared.coordinator.is_aborted() {
                break;
            }
            let node = NodeId(index as u64);
            self.current = Some(node);

            let (Some(value), Some(mut inbox)) =
                (self.values.get_mut(index), shared.store.inbox(superstep, index))
            else {
                continue;
            };
            let messages = Messages::new(&mut inbox);
            let mut ctx = ComputeContext::new(
                shared.graph,
                node,
                superstep,
                shared.node_count,
                value,
                &shared.store,
                next,
                &mut tally,
            );
            let outcome = shared.computation.step(&mut ctx, messages);
            let (halted, failure) = ctx.finish();
            drop(inbox);

            outcome.map_err(|source| PregelError::Computation {
                node,
                superstep,
                source,
            })?;
            if let Some(failure) = failure {
                return Err(failure.into_error(node, superstep, shared.node_count));
            }
            if !halted && next.insert(index) {
                tally.activated += 1;
            }

            tally.processed += 1;
            unreported += 1;
            if unreported >= shared.progress_batch_size {
                shared.progress.log_progress(unreported);
                unreported = 0;
            }
        }
        self.current = None;

        if unreported > 0 {
            shared.progress.log_progress(unreported);
        }
        current.clear_range(start, end);
        Ok(tally)
    }
}
