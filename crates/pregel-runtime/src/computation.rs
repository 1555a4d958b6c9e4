//! The single seam between the engine and an algorithm.

use pregel_core::{Graph, NodeId};

use crate::context::ComputeContext;
use crate::error::StepError;
use crate::message::{Combiner, Message, Messages};

/// Per-vertex logic executed once per active node in every superstep.
///
/// `step` may run concurrently for different nodes of the same superstep and
/// must depend only on its inputs: the context (own value, graph, superstep
/// number) and the messages. Nodes stay active unless they call
/// [`ComputeContext::vote_to_halt`].
pub trait Computation<G: Graph>: Send + Sync {
    /// Per-node state.
    type Value: Send + Default;
    /// Message payload.
    type Message: Message;

    /// Initial value of `node`, computed once before superstep 0.
    fn init(&self, node: NodeId, graph: &G) -> Self::Value {
        let _ = (node, graph);
        Self::Value::default()
    }

    fn step(
        &self,
        ctx: &mut ComputeContext<'_, G, Self::Value, Self::Message>,
        messages: Messages<'_, Self::Message>,
    ) -> Result<(), StepError>;

    /// A custom associative and commutative combiner. When present it takes
    /// precedence over the configured [`CombinerKind`](crate::CombinerKind).
    fn combiner(&self) -> Option<&dyn Combiner<Self::Message>> {
        None
    }
}
