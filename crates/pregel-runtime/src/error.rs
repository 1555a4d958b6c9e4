//! Error taxonomy for a Pregel run.
//!
//! Every variant aborts the run. Cancellation is not an error: it ends the run
//! with a partial [`PregelResult`](crate::PregelResult) instead.

use pregel_core::NodeId;
use thiserror::Error;

/// Error type returned by user step functions.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that abort a Pregel run.
#[derive(Debug, Error)]
pub enum PregelError {
    /// Invalid configuration, detected before any worker starts.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// A step function returned an error.
    #[error("computation failed at node {node} in superstep {superstep}: {source}")]
    Computation {
        node: NodeId,
        superstep: u32,
        #[source]
        source: StepError,
    },

    /// A step function panicked.
    #[error("computation panicked at node {node} in superstep {superstep}: {message}")]
    ComputationPanicked {
        node: NodeId,
        superstep: u32,
        message: String,
    },

    /// A step function addressed a message to a node outside the graph.
    #[error(
        "node {node} sent a message to unknown node {target} in superstep {superstep} \
         (node count {node_count})"
    )]
    InvalidMessageTarget {
        node: NodeId,
        superstep: u32,
        target: NodeId,
        node_count: u64,
    },

    /// An allocation for engine storage failed.
    #[error("resource exhausted while allocating {what} ({requested} elements)")]
    ResourceExhausted { what: &'static str, requested: usize },

    /// A worker thread terminated outside of a step function.
    #[error("worker thread panicked: {message}")]
    WorkerPanicked { message: String },
}

impl PregelError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        PregelError::Configuration {
            reason: reason.into(),
        }
    }

    /// Node and superstep the error is attributed to, when it came from a step.
    pub fn location(&self) -> Option<(NodeId, u32)> {
        match self {
            PregelError::Computation {
                node, superstep, ..
            }
            | PregelError::ComputationPanicked {
                node, superstep, ..
            }
            | PregelError::InvalidMessageTarget {
                node, superstep, ..
            } => Some((*node, *superstep)),
            _ => None,
        }
    }
}

/// Fallible allocation failure, converted into
/// [`PregelError::ResourceExhausted`] by the caller that knows what was being
/// allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationError {
    pub requested: usize,
}

impl AllocationError {
    pub(crate) fn into_pregel(self, what: &'static str) -> PregelError {
        PregelError::ResourceExhausted {
            what,
            requested: self.requested,
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paged::PagedArray;

    #[test]
    fn allocation_failure_names_what_was_allocated() {
        let err = AllocationError { requested: 4096 }.into_pregel("active set");
        assert!(matches!(
            err,
            PregelError::ResourceExhausted {
                what: "active set",
                requested: 4096
            }
        ));
        assert_eq!(err.location(), None);
        assert_eq!(
            err.to_string(),
            "resource exhausted while allocating active set (4096 elements)"
        );
    }

    #[test]
    fn oversized_paged_array_surfaces_as_resource_exhausted() {
        let failed = PagedArray::try_from_fn_with_page_shift(usize::MAX, 0, |_| 0u8).unwrap_err();
        assert_eq!(failed.requested, usize::MAX);
        let err = failed.into_pregel("node values");
        assert!(matches!(
            err,
            PregelError::ResourceExhausted {
                what: "node values",
                ..
            }
        ));
    }

    #[test]
    fn location_covers_step_errors_only() {
        let err = PregelError::ComputationPanicked {
            node: NodeId(3),
            superstep: 2,
            message: "boom".to_string(),
        };
        assert_eq!(err.location(), Some((NodeId(3), 2)));
        assert_eq!(PregelError::configuration("bad").location(), None);
    }

    #[test]
    fn panic_payloads_render_as_text() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7u32), "non-string panic payload");
    }
}
