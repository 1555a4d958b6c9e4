//! Reference computations shipped with the `pregel` binary.

use pregel_core::{Graph, NodeId};
use pregel_runtime::{ComputeContext, Computation, Messages, StepError};

/// Damping factor used by [`PageRank`].
pub const DAMPING: f64 = 0.85;

/// Weakly connected components by min-label propagation.
///
/// Expects relationships in both directions. Each node ends labelled with the
/// smallest node id of its component. Run with the `min` combiner.
pub struct Components;

impl<G: Graph> Computation<G> for Components {
    type Value = u64;
    type Message = u64;

    fn init(&self, node: NodeId, _graph: &G) -> u64 {
        node.0
    }

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, G, u64, u64>,
        messages: Messages<'_, u64>,
    ) -> Result<(), StepError> {
        let label = *ctx.value();
        if ctx.is_initial_superstep() {
            ctx.send_to_neighbors(label);
        } else if let Some(smallest) = messages.min().filter(|&m| m < label) {
            ctx.set_value(smallest);
            ctx.send_to_neighbors(smallest);
        }
        ctx.vote_to_halt();
        Ok(())
    }
}

/// PageRank over a fixed number of supersteps. Rank held by nodes without
/// outgoing relationships is not redistributed. Run with the `sum` combiner.
pub struct PageRank {
    pub damping: f64,
}

impl Default for PageRank {
    fn default() -> Self {
        PageRank { damping: DAMPING }
    }
}

impl<G: Graph> Computation<G> for PageRank {
    type Value = f64;
    type Message = f64;

    fn init(&self, _node: NodeId, graph: &G) -> f64 {
        1.0 / graph.node_count() as f64
    }

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, G, f64, f64>,
        messages: Messages<'_, f64>,
    ) -> Result<(), StepError> {
        if !ctx.is_initial_superstep() {
            let base = (1.0 - self.damping) / ctx.node_count() as f64;
            ctx.set_value(base + self.damping * messages.sum::<f64>());
        }
        let degree = ctx.degree();
        if degree > 0 {
            let share = *ctx.value() / degree as f64;
            ctx.send_to_neighbors(share);
        }
        Ok(())
    }
}

/// Single-source shortest paths over relationship weights (1.0 when the
/// graph is unweighted). Unreachable nodes keep an infinite distance.
///
/// Only the source needs to be active initially; every other node wakes up
/// when a shorter distance reaches it. Run with the `min` combiner.
pub struct ShortestPaths {
    pub source: NodeId,
}

impl<G: Graph> Computation<G> for ShortestPaths {
    type Value = f64;
    type Message = f64;

    fn init(&self, node: NodeId, _graph: &G) -> f64 {
        if node == self.source {
            0.0
        } else {
            f64::INFINITY
        }
    }

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, G, f64, f64>,
        messages: Messages<'_, f64>,
    ) -> Result<(), StepError> {
        let current = *ctx.value();
        let candidate = messages.fold(f64::INFINITY, f64::min);
        let improved = candidate < current;
        if improved {
            ctx.set_value(candidate);
        }
        if improved || (ctx.is_initial_superstep() && ctx.node_id() == self.source) {
            let distance = *ctx.value();
            let graph = ctx.graph();
            graph.for_each_relationship(ctx.node_id(), |target, weight| {
                ctx.send_to(target, distance + weight);
                true
            });
        }
        ctx.vote_to_halt();
        Ok(())
    }
}
