//! Graph-side building blocks for the Pregel runtime.
//!
//! - [`graph::Graph`]: the read-only accessor contract the engine consumes
//! - [`graph::CsrGraph`]: compressed-sparse-row in-memory graph
//! - [`edge_list`]: plain-text edge list reading and writing
//! - [`generate`]: seeded synthetic graphs

pub mod edge_list;
pub mod error;
pub mod generate;
pub mod graph;
pub mod id;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::{CsrGraph, CsrGraphBuilder, Graph, DEFAULT_WEIGHT};
pub use id::NodeId;
