//! Deterministic synthetic graphs.
//!
//! Generators take an explicit seed and use a ChaCha8 PRNG, so the same
//! arguments always yield the same graph on every platform.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::CoreError;
use crate::graph::{CsrGraph, CsrGraphBuilder};
use crate::id::NodeId;

/// Directed cycle `0 -> 1 -> ... -> n-1 -> 0`.
pub fn cycle(node_count: u64) -> Result<CsrGraph, CoreError> {
    let mut builder = CsrGraphBuilder::new(node_count);
    builder.reserve(relationship_total(node_count, 1)?)?;
    for node in 0..node_count {
        builder.push(NodeId(node), NodeId((node + 1) % node_count), None);
    }
    builder.build()
}

/// Random directed graph where every node has exactly `degree` outgoing
/// relationships to uniformly chosen targets other than itself.
///
/// Graphs with fewer than two nodes have no relationships.
pub fn random_graph(node_count: u64, degree: usize, seed: u64) -> Result<CsrGraph, CoreError> {
    build_random(node_count, degree, seed, false)
}

/// Like [`random_graph`], with weights drawn uniformly from `[1, 10)`.
pub fn random_weighted_graph(
    node_count: u64,
    degree: usize,
    seed: u64,
) -> Result<CsrGraph, CoreError> {
    build_random(node_count, degree, seed, true)
}

fn build_random(
    node_count: u64,
    degree: usize,
    seed: u64,
    weighted: bool,
) -> Result<CsrGraph, CoreError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = CsrGraphBuilder::new(node_count);
    if node_count < 2 {
        return builder.build();
    }
    builder.reserve(relationship_total(node_count, degree)?)?;
    for source in 0..node_count {
        for _ in 0..degree {
            // Draw from n-1 candidates and shift past the source to skip self-loops.
            let mut target = rng.gen_range(0..node_count - 1);
            if target >= source {
                target += 1;
            }
            let weight = weighted.then(|| rng.gen_range(1.0..10.0));
            builder.push(NodeId(source), NodeId(target), weight);
        }
    }
    builder.build()
}

fn relationship_total(node_count: u64, degree: usize) -> Result<usize, CoreError> {
    usize::try_from(node_count)
        .ok()
        .and_then(|n| n.checked_mul(degree))
        .ok_or(CoreError::ResourceExhausted {
            what: "relationships",
            requested: node_count.saturating_mul(degree as u64),
        })
}
