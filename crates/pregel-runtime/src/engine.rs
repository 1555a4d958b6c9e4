//! The driver: validates a run, allocates its storage, spawns the worker pool
//! and steps it through supersteps until a termination condition holds.
//!
//! A run moves through these states:
//!
//! ```text
//! Initializing -> Running(0) -> Running(1) -> ... -> Converged
//!                                                  | MaxIterationsReached
//!                                                  | Cancelled
//!                                                  | Failed
//! ```
//!
//! After each superstep, convergence (no active node left) is checked before
//! the iteration cap, so a run that converges on its last allowed superstep
//! reports convergence. Cancellation is polled only at superstep boundaries.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pregel_core::{Graph, NodeId};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::active::ActiveSet;
use crate::computation::Computation;
use crate::config::{InitialActive, PregelConfig};
use crate::error::{panic_message, PregelError};
use crate::message::{CombinerKind, Message, Reduction};
use crate::message_store::MessageStore;
use crate::paged::PagedArray;
use crate::progress::{NoopProgress, ProgressTracker};
use crate::scheduler::{partition, Coordinator, Shared, ShutdownOnDrop, Worker};
use crate::termination::{NeverCancelled, TerminationFlag};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No node was active after the last superstep.
    Converged,
    MaxIterationsReached,
    /// The termination flag was raised; values are those of the last
    /// completed superstep.
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::MaxIterationsReached => write!(f, "max_iterations_reached"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Initializing,
    Running { superstep: u32 },
    Finished(Termination),
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Initializing => write!(f, "initializing"),
            RunState::Running { superstep } => write!(f, "running({superstep})"),
            RunState::Finished(termination) => write!(f, "{termination}"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Counters of one completed superstep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuperstepStats {
    pub superstep: u32,
    /// Nodes executed in this superstep.
    pub active_nodes: u64,
    pub messages_sent: u64,
    /// Messages reduced into an existing inbox value by the combiner.
    pub messages_combined: u64,
    /// Nodes active in the following superstep.
    pub next_active_nodes: u64,
    pub elapsed: Duration,
}

/// Final per-node values, indexed by node id.
#[derive(Debug)]
pub struct NodeValues<V> {
    values: PagedArray<V>,
}

impl<V> NodeValues<V> {
    pub fn get(&self, node: NodeId) -> Option<&V> {
        self.values.get(node.index())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &V)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (NodeId::from(i), v))
    }

    pub fn into_vec(self) -> Vec<V> {
        self.values.into_vec()
    }
}

/// Outcome of a run that did not fail.
#[derive(Debug)]
pub struct PregelResult<V> {
    pub node_values: NodeValues<V>,
    /// Completed supersteps.
    pub ran_iterations: u32,
    pub did_converge: bool,
    pub termination: Termination,
    pub supersteps: Vec<SuperstepStats>,
}

/// A configured, validated run of `C` over `G`.
pub struct Pregel<'g, G, C> {
    graph: &'g G,
    computation: C,
    config: PregelConfig,
    node_count: usize,
    progress: Arc<dyn ProgressTracker>,
    termination: Arc<dyn TerminationFlag>,
}

impl<'g, G, C> Pregel<'g, G, C>
where
    G: Graph,
    C: Computation<G>,
{
    /// Validates `config` against `graph` and `computation`. No worker is
    /// started and nothing is allocated on failure.
    pub fn new(graph: &'g G, config: PregelConfig, computation: C) -> Result<Self, PregelError> {
        config.validate()?;

        let node_count = usize::try_from(graph.node_count()).map_err(|_| {
            PregelError::configuration(format!(
                "graph has {} nodes, more than this platform can address",
                graph.node_count()
            ))
        })?;

        if let InitialActive::Nodes(nodes) = &config.initial_active {
            if let Some(node) = nodes.iter().find(|n| n.0 >= graph.node_count()) {
                return Err(PregelError::configuration(format!(
                    "initial node {node} is not in the graph (node count {node_count})"
                )));
            }
        }

        if computation.combiner().is_none() && !<C::Message as Message>::supports(config.combiner) {
            return Err(PregelError::configuration(format!(
                "combiner '{}' is not supported by message type {}",
                config.combiner,
                std::any::type_name::<C::Message>()
            )));
        }

        Ok(Pregel {
            graph,
            computation,
            config,
            node_count,
            progress: Arc::new(NoopProgress),
            termination: Arc::new(NeverCancelled),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_termination_flag(mut self, termination: Arc<dyn TerminationFlag>) -> Self {
        self.termination = termination;
        self
    }

    pub fn config(&self) -> &PregelConfig {
        &self.config
    }

    fn reduction(&self) -> Reduction<'_, C::Message> {
        match (self.computation.combiner(), self.config.combiner) {
            (Some(custom), _) => Reduction::Custom(custom),
            (None, CombinerKind::None) => Reduction::Keep,
            (None, kind) => Reduction::Builtin(kind),
        }
    }

    /// Runs to termination. Blocks the calling thread.
    pub fn run(self) -> Result<PregelResult<C::Value>, PregelError> {
        let mut state = RunState::Initializing;
        let outcome = self.execute(&mut state);
        match &outcome {
            Ok(result) => info!(
                ran_iterations = result.ran_iterations,
                termination = %result.termination,
                "pregel run finished"
            ),
            Err(err) => {
                transition(&mut state, RunState::Failed);
                error!(error = %err, "pregel run failed");
            }
        }
        outcome
    }

    fn execute(&self, state: &mut RunState) -> Result<PregelResult<C::Value>, PregelError> {
        let reduction = self.reduction();
        info!(
            nodes = self.node_count,
            relationships = self.graph.relationship_count(),
            concurrency = self.config.concurrency,
            max_iterations = self.config.max_iterations,
            combiner = reduction.describe(),
            "starting pregel run"
        );
        self.progress.begin_task();

        let mut values = PagedArray::try_from_fn(self.node_count, |i| {
            self.computation.init(NodeId::from(i), self.graph)
        })
        .map_err(|e| e.into_pregel("node values"))?;

        let active = ActiveSet::try_new(self.node_count).map_err(|e| e.into_pregel("active set"))?;
        match &self.config.initial_active {
            InitialActive::All => active.current(0).insert_all(),
            InitialActive::Nodes(nodes) => {
                for node in nodes {
                    active.current(0).insert(node.index());
                }
            }
        }
        let initial_active = active.current(0).count();

        if initial_active == 0 {
            transition(state, RunState::Finished(Termination::Converged));
            return Ok(PregelResult {
                node_values: NodeValues { values },
                ran_iterations: 0,
                did_converge: true,
                termination: Termination::Converged,
                supersteps: Vec::new(),
            });
        }

        let partitions = partition(self.node_count, self.config.concurrency);
        let shared = Shared {
            graph: self.graph,
            computation: &self.computation,
            store: MessageStore::try_new(self.node_count, reduction)?,
            active,
            coordinator: Coordinator::new(partitions.len()),
            progress: &*self.progress,
            progress_batch_size: self.config.progress_batch_size,
            node_count: self.graph.node_count(),
        };

        let ranges: Vec<Range<usize>> = partitions.iter().map(|p| p.nodes.clone()).collect();
        let views = values.split_mut(&ranges);
        debug!(workers = partitions.len(), "spawning workers");

        let driven = crossbeam::thread::scope(|scope| {
            for (partition, view) in partitions.into_iter().zip(views) {
                let worker = Worker::new(&shared, partition, view);
                scope.spawn(move |_| worker.run());
            }
            let _shutdown = ShutdownOnDrop(&shared.coordinator);
            self.drive(&shared, initial_active, state)
        })
        .map_err(|payload| PregelError::WorkerPanicked {
            message: panic_message(&*payload),
        })?;
        let (termination, supersteps) = driven?;

        Ok(PregelResult {
            node_values: NodeValues { values },
            ran_iterations: supersteps.len() as u32,
            did_converge: termination == Termination::Converged,
            termination,
            supersteps,
        })
    }

    /// Steps the worker pool until a termination condition holds.
    fn drive(
        &self,
        shared: &Shared<'_, G, C>,
        initial_active: u64,
        state: &mut RunState,
    ) -> Result<(Termination, Vec<SuperstepStats>), PregelError> {
        let mut supersteps = Vec::new();
        let mut active_nodes = initial_active;
        let mut superstep = 0u32;

        let termination = loop {
            if active_nodes == 0 {
                break Termination::Converged;
            }
            if superstep >= self.config.max_iterations {
                break Termination::MaxIterationsReached;
            }
            if self.termination.is_cancelled() {
                break Termination::Cancelled;
            }

            transition(state, RunState::Running { superstep });
            let started = Instant::now();
            self.progress.begin_sub_task(active_nodes);
            let tally = shared.coordinator.run_superstep(superstep);
            self.progress.end_sub_task();
            let tally = tally?;

            let stats = SuperstepStats {
                superstep,
                active_nodes,
                messages_sent: tally.messages_sent,
                messages_combined: tally.messages_combined,
                next_active_nodes: tally.activated,
                elapsed: started.elapsed(),
            };
            debug!(
                superstep,
                active_nodes,
                messages_sent = stats.messages_sent,
                next_active_nodes = stats.next_active_nodes,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "superstep completed"
            );
            supersteps.push(stats);

            active_nodes = tally.activated;
            superstep += 1;
        };

        transition(state, RunState::Finished(termination));
        Ok((termination, supersteps))
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "run state");
    *state = next;
}
