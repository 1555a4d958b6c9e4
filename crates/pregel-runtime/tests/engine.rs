//! End-to-end runs of the engine on small graphs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pregel_core::generate;
use pregel_core::{CsrGraph, NodeId};
use pregel_runtime::{
    CancellationToken, Combiner, CombinerKind, ComputeContext, Computation, InitialActive,
    LoggingProgress, Message, Messages, Pregel, PregelConfig, PregelError, ProgressTracker,
    StepError, Termination,
};

// ---------------------------------------------------------------------------
// Computations
// ---------------------------------------------------------------------------

/// Each node replaces its value with the sum of what it received and passes
/// the value on to its successors. Never halts.
struct Ring;

impl Computation<CsrGraph> for Ring {
    type Value = u64;
    type Message = u64;

    fn init(&self, node: NodeId, _graph: &CsrGraph) -> u64 {
        u64::from(node.0 == 0)
    }

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, CsrGraph, u64, u64>,
        messages: Messages<'_, u64>,
    ) -> Result<(), StepError> {
        if !ctx.is_initial_superstep() {
            ctx.set_value(messages.sum());
        }
        let value = *ctx.value();
        ctx.send_to_neighbors(value);
        Ok(())
    }
}

fn ring_config(concurrency: usize, max_iterations: u32) -> PregelConfig {
    PregelConfig {
        concurrency,
        max_iterations,
        combiner: CombinerKind::Sum,
        ..Default::default()
    }
}

fn run_ring(concurrency: usize, max_iterations: u32) -> Vec<u64> {
    let graph = generate::cycle(4).unwrap();
    Pregel::new(&graph, ring_config(concurrency, max_iterations), Ring)
        .unwrap()
        .run()
        .unwrap()
        .node_values
        .into_vec()
}

/// Records `(superstep, message count, message sum)` per execution. Nodes 0,
/// 2 and 3 each send a 1 to node 1 in superstep 0; everybody halts.
struct Fanin;

impl Computation<CsrGraph> for Fanin {
    type Value = Vec<(u32, usize, u64)>;
    type Message = u64;

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, CsrGraph, Self::Value, u64>,
        messages: Messages<'_, u64>,
    ) -> Result<(), StepError> {
        let received: Vec<u64> = messages.collect();
        let superstep = ctx.superstep();
        ctx.value_mut()
            .push((superstep, received.len(), received.iter().sum()));
        if superstep == 0 && ctx.node_id() != NodeId(1) {
            ctx.send_to(NodeId(1), 1);
        }
        ctx.vote_to_halt();
        Ok(())
    }
}

/// Payload without numeric reductions.
#[derive(Clone)]
struct Ping;

impl Message for Ping {}

/// Logs the supersteps each node executes in. Node 2 stays awake through
/// superstep 0 and wakes node 1 from superstep 1.
struct Wakeup;

impl Computation<CsrGraph> for Wakeup {
    type Value = Vec<u32>;
    type Message = Ping;

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, CsrGraph, Vec<u32>, Ping>,
        _messages: Messages<'_, Ping>,
    ) -> Result<(), StepError> {
        let superstep = ctx.superstep();
        ctx.value_mut().push(superstep);
        match (ctx.node_id().0, superstep) {
            (2, 0) => {}
            (2, 1) => {
                ctx.send_to(NodeId(1), Ping);
                ctx.vote_to_halt();
            }
            _ => ctx.vote_to_halt(),
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Boom;

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "boom")
    }
}

impl std::error::Error for Boom {}

enum Fault {
    Error,
    Panic,
    BadTarget,
}

/// Runs the ring, then misbehaves at node 2 in superstep 1.
struct Faulty(Fault);

impl Computation<CsrGraph> for Faulty {
    type Value = u64;
    type Message = u64;

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, CsrGraph, u64, u64>,
        messages: Messages<'_, u64>,
    ) -> Result<(), StepError> {
        if ctx.node_id() == NodeId(2) && ctx.superstep() == 1 {
            match self.0 {
                Fault::Error => return Err(Box::new(Boom)),
                Fault::Panic => panic!("step exploded"),
                Fault::BadTarget => ctx.send_to(NodeId(99), 1),
            }
        }
        let sum: u64 = messages.sum();
        ctx.set_value(sum);
        ctx.send_to_neighbors(sum + 1);
        Ok(())
    }
}

/// Every node reports to node 0 through a custom combiner keeping the maximum.
struct MaxCombined {
    max: fn(u64, u64) -> u64,
}

impl Computation<CsrGraph> for MaxCombined {
    type Value = u64;
    type Message = u64;

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, CsrGraph, u64, u64>,
        messages: Messages<'_, u64>,
    ) -> Result<(), StepError> {
        if ctx.is_initial_superstep() {
            let target = NodeId(0);
            ctx.send_to(target, ctx.node_id().0 + 10);
        } else {
            ctx.set_value(messages.sum());
        }
        ctx.vote_to_halt();
        Ok(())
    }

    fn combiner(&self) -> Option<&dyn Combiner<u64>> {
        Some(&self.max)
    }
}

// ---------------------------------------------------------------------------
// Ring scenario
// ---------------------------------------------------------------------------

#[test]
fn ring_passes_the_token_one_hop_per_superstep() {
    let sequence: Vec<Vec<u64>> = (1..=4).map(|k| run_ring(1, k)).collect();
    assert_eq!(sequence[0], vec![1, 0, 0, 0]);
    assert_eq!(sequence[1], vec![0, 1, 0, 0]);
    assert_eq!(sequence[2], vec![0, 0, 1, 0]);
    assert_eq!(sequence[3], vec![0, 0, 0, 1]);

    let rendered = sequence
        .iter()
        .enumerate()
        .map(|(i, values)| format!("after {}: {values:?}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(rendered, @r"
    after 1: [1, 0, 0, 0]
    after 2: [0, 1, 0, 0]
    after 3: [0, 0, 1, 0]
    after 4: [0, 0, 0, 1]
    ");
}

#[test]
fn ring_is_thread_count_invariant() {
    for k in 1..=6 {
        let single = run_ring(1, k);
        assert_eq!(run_ring(2, k), single);
        assert_eq!(run_ring(8, k), single);
    }
}

#[test]
fn non_converging_run_stops_at_the_cap() {
    let graph = generate::cycle(4).unwrap();
    let result = Pregel::new(&graph, ring_config(3, 7), Ring)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.ran_iterations, 7);
    assert!(!result.did_converge);
    assert_eq!(result.termination, Termination::MaxIterationsReached);
    assert_eq!(result.supersteps.len(), 7);
    assert!(result
        .supersteps
        .iter()
        .all(|s| s.active_nodes == 4 && s.messages_sent == 4));
}

// ---------------------------------------------------------------------------
// Message visibility and reactivation
// ---------------------------------------------------------------------------

#[test]
fn messages_arrive_exactly_once_in_the_next_superstep() {
    let graph = CsrGraph::from_relationships(4, []).unwrap();
    let config = PregelConfig {
        concurrency: 4,
        combiner: CombinerKind::Sum,
        ..Default::default()
    };
    let result = Pregel::new(&graph, config, Fanin).unwrap().run().unwrap();

    assert!(result.did_converge);
    assert_eq!(result.ran_iterations, 2);
    // Combined into a single message carrying the count of senders.
    assert_eq!(
        result.node_values.get(NodeId(1)).unwrap(),
        &vec![(0, 0, 0), (1, 1, 3)]
    );
    assert_eq!(result.node_values.get(NodeId(0)).unwrap(), &vec![(0, 0, 0)]);
    assert_eq!(result.supersteps[0].messages_sent, 3);
    assert_eq!(result.supersteps[0].messages_combined, 2);
    assert_eq!(result.supersteps[0].next_active_nodes, 1);
}

#[test]
fn without_combiner_every_message_is_delivered() {
    let graph = CsrGraph::from_relationships(4, []).unwrap();
    let config = PregelConfig {
        concurrency: 2,
        ..Default::default()
    };
    let result = Pregel::new(&graph, config, Fanin).unwrap().run().unwrap();
    assert_eq!(
        result.node_values.get(NodeId(1)).unwrap(),
        &vec![(0, 0, 0), (1, 3, 3)]
    );
}

#[test]
fn halted_node_wakes_only_on_message() {
    let graph = CsrGraph::from_relationships(3, []).unwrap();
    let config = PregelConfig {
        concurrency: 3,
        ..Default::default()
    };
    let result = Pregel::new(&graph, config, Wakeup).unwrap().run().unwrap();
    let values = result.node_values.into_vec();
    assert_eq!(values[0], vec![0]);
    assert_eq!(values[1], vec![0, 2]);
    assert_eq!(values[2], vec![0, 1]);
    assert_eq!(result.ran_iterations, 3);
}

#[test]
fn initial_active_subset_runs_only_those_nodes() {
    let graph = CsrGraph::from_relationships(3, []).unwrap();
    let config = PregelConfig {
        initial_active: InitialActive::Nodes(vec![NodeId(0)]),
        ..Default::default()
    };
    let result = Pregel::new(&graph, config, Wakeup).unwrap().run().unwrap();
    let values = result.node_values.into_vec();
    assert_eq!(values, vec![vec![0], vec![], vec![]]);
}

#[test]
fn computation_combiner_takes_precedence() {
    let graph = CsrGraph::from_relationships(3, []).unwrap();
    let config = PregelConfig {
        combiner: CombinerKind::Sum,
        ..Default::default()
    };
    let computation = MaxCombined { max: u64::max };
    let result = Pregel::new(&graph, config, computation)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.node_values.get(NodeId(0)), Some(&12));
}

// ---------------------------------------------------------------------------
// Cancellation and progress
// ---------------------------------------------------------------------------

/// Cancels the run when the given number of supersteps has completed.
struct CancelAfter {
    token: CancellationToken,
    after: u32,
    finished: AtomicU32,
}

impl ProgressTracker for CancelAfter {
    fn end_sub_task(&self) {
        if self.finished.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_keeps_completed_supersteps() {
    let graph = generate::cycle(4).unwrap();
    let token = CancellationToken::new();
    let progress = Arc::new(CancelAfter {
        token: token.clone(),
        after: 2,
        finished: AtomicU32::new(0),
    });
    let result = Pregel::new(&graph, ring_config(2, 10), Ring)
        .unwrap()
        .with_progress(progress)
        .with_termination_flag(Arc::new(token))
        .run()
        .unwrap();

    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(result.ran_iterations, 2);
    assert!(!result.did_converge);
    assert_eq!(result.node_values.into_vec(), vec![0, 1, 0, 0]);
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let graph = generate::cycle(4).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = Pregel::new(&graph, ring_config(2, 10), Ring)
        .unwrap()
        .with_termination_flag(Arc::new(token))
        .run()
        .unwrap();
    assert_eq!(result.ran_iterations, 0);
    assert_eq!(result.node_values.into_vec(), vec![1, 0, 0, 0]);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    processed: Mutex<Vec<u64>>,
}

impl ProgressTracker for Recorder {
    fn begin_sub_task(&self, volume: u64) {
        self.events.lock().push(format!("begin {volume}"));
        self.processed.lock().push(0);
    }

    fn log_progress(&self, processed: u64) {
        if let Some(last) = self.processed.lock().last_mut() {
            *last += processed;
        }
    }

    fn end_sub_task(&self) {
        self.events.lock().push("end".to_string());
    }
}

#[test]
fn progress_volume_matches_processed_nodes() {
    let graph = CsrGraph::from_relationships(3, []).unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = PregelConfig {
        concurrency: 2,
        progress_batch_size: 1,
        ..Default::default()
    };
    Pregel::new(&graph, config, Wakeup)
        .unwrap()
        .with_progress(recorder.clone())
        .run()
        .unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec!["begin 3", "end", "begin 1", "end", "begin 1", "end"]
    );
    assert_eq!(*recorder.processed.lock(), vec![3, 1, 1]);
}

#[test]
fn reused_logging_progress_numbers_each_run_from_zero() {
    let graph = generate::cycle(4).unwrap();
    let progress = Arc::new(LoggingProgress::new("ring"));
    for max_iterations in [3, 2] {
        let result = Pregel::new(&graph, ring_config(2, max_iterations), Ring)
            .unwrap()
            .with_progress(progress.clone())
            .run()
            .unwrap();
        assert_eq!(result.ran_iterations, max_iterations);
        assert_eq!(progress.supersteps(), max_iterations);
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

fn run_faulty(fault: Fault) -> PregelError {
    let graph = generate::cycle(6).unwrap();
    let config = PregelConfig {
        concurrency: 3,
        max_iterations: 5,
        ..Default::default()
    };
    Pregel::new(&graph, config, Faulty(fault))
        .unwrap()
        .run()
        .unwrap_err()
}

#[test]
fn step_error_carries_node_and_superstep() {
    let err = run_faulty(Fault::Error);
    assert!(matches!(err, PregelError::Computation { .. }), "{err}");
    assert_eq!(err.location(), Some((NodeId(2), 1)));
    assert!(err.to_string().contains("boom"), "{err}");
}

#[test]
fn panicking_step_is_reported() {
    let err = run_faulty(Fault::Panic);
    match err {
        PregelError::ComputationPanicked {
            node,
            superstep,
            message,
        } => {
            assert_eq!((node, superstep), (NodeId(2), 1));
            assert_eq!(message, "step exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn message_to_unknown_node_fails_the_run() {
    let err = run_faulty(Fault::BadTarget);
    match err {
        PregelError::InvalidMessageTarget {
            node,
            superstep,
            target,
            node_count,
        } => {
            assert_eq!((node, superstep), (NodeId(2), 1));
            assert_eq!(target, NodeId(99));
            assert_eq!(node_count, 6);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unsupported_builtin_combiner_is_a_configuration_error() {
    let graph = generate::cycle(3).unwrap();
    let config = PregelConfig {
        combiner: CombinerKind::Sum,
        ..Default::default()
    };
    let err = Pregel::new(&graph, config, Wakeup).err().unwrap();
    assert!(matches!(err, PregelError::Configuration { .. }), "{err}");
}

#[test]
fn invalid_concurrency_is_rejected_before_running() {
    let graph = generate::cycle(3).unwrap();
    let config = PregelConfig {
        concurrency: 0,
        ..Default::default()
    };
    let err = Pregel::new(&graph, config, Ring).err().unwrap();
    assert!(err.to_string().contains("concurrency"), "{err}");
}

#[test]
fn empty_graph_converges_immediately() {
    let graph = CsrGraph::from_relationships(0, []).unwrap();
    let result = Pregel::new(&graph, ring_config(4, 10), Ring)
        .unwrap()
        .run()
        .unwrap();
    assert!(result.did_converge);
    assert_eq!(result.ran_iterations, 0);
    assert!(result.node_values.is_empty());
}
