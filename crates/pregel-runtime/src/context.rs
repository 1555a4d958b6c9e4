//! The per-invocation view a step function gets of its node, the graph and
//! the outgoing message channel.

use pregel_core::{Graph, NodeId};

use crate::active::AtomicBitSet;
use crate::error::{AllocationError, PregelError};
use crate::message::Message;
use crate::message_store::{Delivery, MessageStore, SendError};

/// Per-worker counters for one superstep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WorkerTally {
    pub processed: u64,
    pub messages_sent: u64,
    pub messages_combined: u64,
    /// Nodes newly added to the next active set.
    pub activated: u64,
}

/// First send failure recorded by a context; reported once the step returns.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SendFailure {
    UnknownTarget(NodeId),
    Allocation(AllocationError),
}

impl SendFailure {
    pub(crate) fn into_error(self, node: NodeId, superstep: u32, node_count: u64) -> PregelError {
        match self {
            SendFailure::UnknownTarget(target) => PregelError::InvalidMessageTarget {
                node,
                superstep,
                target,
                node_count,
            },
            SendFailure::Allocation(e) => e.into_pregel("inbox messages"),
        }
    }
}

/// Context handed to [`Computation::step`](crate::Computation::step).
///
/// Reads and writes only the executing node's own value. Messages sent
/// through it become visible to their targets in the next superstep and
/// wake those targets up if they had voted to halt.
pub struct ComputeContext<'a, G, V, M> {
    graph: &'a G,
    node: NodeId,
    superstep: u32,
    node_count: u64,
    value: &'a mut V,
    store: &'a MessageStore<'a, M>,
    next_active: &'a AtomicBitSet,
    tally: &'a mut WorkerTally,
    halted: bool,
    failure: Option<SendFailure>,
}

impl<'a, G: Graph, V, M: Message> ComputeContext<'a, G, V, M> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: &'a G,
        node: NodeId,
        superstep: u32,
        node_count: u64,
        value: &'a mut V,
        store: &'a MessageStore<'a, M>,
        next_active: &'a AtomicBitSet,
        tally: &'a mut WorkerTally,
    ) -> Self {
        ComputeContext {
            graph,
            node,
            superstep,
            node_count,
            value,
            store,
            next_active,
            tally,
            halted: false,
            failure: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn superstep(&self) -> u32 {
        self.superstep
    }

    pub fn is_initial_superstep(&self) -> bool {
        self.superstep == 0
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn graph(&self) -> &'a G {
        self.graph
    }

    pub fn value(&self) -> &V {
        self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        self.value
    }

    pub fn set_value(&mut self, value: V) {
        *self.value = value;
    }

    /// Declares that this node has nothing more to do. It stays asleep until
    /// a message arrives for it.
    pub fn vote_to_halt(&mut self) {
        self.halted = true;
    }

    pub fn degree(&self) -> usize {
        self.graph.degree(self.node)
    }

    /// Calls `f(neighbor, weight)` for each outgoing relationship.
    pub fn for_each_neighbor<F>(&self, mut f: F)
    where
        F: FnMut(NodeId, f64),
    {
        self.graph.for_each_relationship(self.node, |target, weight| {
            f(target, weight);
            true
        });
    }

    /// Targets of the outgoing relationships, in graph order.
    pub fn neighbors(&self) -> Vec<NodeId> {
        let mut neighbors = Vec::with_capacity(self.degree());
        self.for_each_neighbor(|target, _| neighbors.push(target));
        neighbors
    }

    pub fn relationship_weight(&self, neighbor: NodeId) -> Option<f64> {
        self.graph.relationship_weight(self.node, neighbor)
    }

    /// Sends `message` to `target` for delivery in the next superstep.
    ///
    /// Sending to a node outside the graph fails the run once the step
    /// returns; later sends from the same step are dropped.
    pub fn send_to(&mut self, target: NodeId, message: M) {
        if self.failure.is_some() {
            return;
        }
        if target.0 >= self.node_count {
            self.failure = Some(SendFailure::UnknownTarget(target));
            return;
        }
        match self.store.send(self.superstep, target.index(), message) {
            Ok(delivery) => {
                self.tally.messages_sent += 1;
                if delivery == Delivery::Combined {
                    self.tally.messages_combined += 1;
                }
                if self.next_active.insert(target.index()) {
                    self.tally.activated += 1;
                }
            }
            Err(SendError::UnknownTarget) => {
                self.failure = Some(SendFailure::UnknownTarget(target));
            }
            Err(SendError::Allocation(e)) => {
                self.failure = Some(SendFailure::Allocation(e));
            }
        }
    }

    /// Sends a copy of `message` along every outgoing relationship.
    pub fn send_to_neighbors(&mut self, message: M) {
        let graph = self.graph;
        graph.for_each_relationship(self.node, |target, _| {
            self.send_to(target, message.clone());
            self.failure.is_none()
        });
    }

    /// Consumes the context, returning the halt vote and any send failure.
    pub(crate) fn finish(self) -> (bool, Option<SendFailure>) {
        (self.halted, self.failure)
    }
}
