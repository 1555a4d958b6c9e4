//! Core error types for pregel-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of building, loading and generating graphs.

use thiserror::Error;

use crate::id::NodeId;

/// Errors produced by the pregel-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A relationship endpoint is outside `[0, node_count)`.
    #[error("node not found: NodeId({id}) with node count {node_count}", id = id.0)]
    NodeNotFound { id: NodeId, node_count: u64 },

    /// A relationship could not be added to the graph.
    #[error("invalid relationship: {reason}")]
    InvalidRelationship { reason: String },

    /// An edge-list line could not be parsed.
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Graph storage could not be allocated.
    #[error("resource exhausted: cannot allocate {requested} {what}")]
    ResourceExhausted { what: &'static str, requested: u64 },

    /// Reading or writing an edge list failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
