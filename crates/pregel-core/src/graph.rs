//! The read-only graph accessor consumed by the engine, plus the in-memory
//! implementations shipped with the workspace.
//!
//! [`Graph`] is the whole contract between the BSP runtime and graph storage:
//! node count, per-node relationship iteration, degree and optional
//! relationship weights. Implementations must be safe to read from many
//! worker threads at once and are never mutated while a run is in flight.
//!
//! Two implementations are provided:
//! - [`CsrGraph`]: a compressed-sparse-row layout built through
//!   [`CsrGraphBuilder`]. Relationships of a node keep insertion order.
//! - `petgraph::Graph<N, E, Directed, u32>` for any `E: Copy + Into<f64>`,
//!   so callers already holding a petgraph graph can run computations on it
//!   directly.

use petgraph::graph::{Graph as PetGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;

/// Weight reported for relationships of unweighted graphs.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Immutable, thread-safe view of a graph.
pub trait Graph: Send + Sync {
    /// Number of nodes; valid ids are `0..node_count()`.
    fn node_count(&self) -> u64;

    /// Total number of (directed) relationships.
    fn relationship_count(&self) -> u64;

    /// Number of outgoing relationships of `node`.
    fn degree(&self, node: NodeId) -> usize;

    /// Calls `visitor(target, weight)` for each outgoing relationship of
    /// `node` until it returns `false`.
    ///
    /// Unweighted graphs report [`DEFAULT_WEIGHT`].
    fn for_each_relationship<F>(&self, node: NodeId, visitor: F)
    where
        F: FnMut(NodeId, f64) -> bool;

    /// Whether relationships carry their own weights.
    fn has_relationship_weights(&self) -> bool;

    /// Weight of the first relationship from `node` to `neighbor`, if any.
    fn relationship_weight(&self, node: NodeId, neighbor: NodeId) -> Option<f64> {
        let mut found = None;
        self.for_each_relationship(node, |target, weight| {
            if target == neighbor {
                found = Some(weight);
                false
            } else {
                true
            }
        });
        found
    }
}

/// Compressed-sparse-row graph.
///
/// `offsets[n]..offsets[n + 1]` is the slice of `targets` (and `weights`)
/// holding the outgoing relationships of node `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrGraph {
    offsets: Vec<usize>,
    targets: Vec<NodeId>,
    weights: Option<Vec<f64>>,
}

impl CsrGraph {
    /// Builds an unweighted directed graph from `(source, target)` pairs.
    pub fn from_relationships<I>(node_count: u64, relationships: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut builder = CsrGraphBuilder::new(node_count);
        for (source, target) in relationships {
            builder.add_relationship(NodeId(source), NodeId(target))?;
        }
        builder.build()
    }

    /// Builds a weighted directed graph from `(source, target, weight)` triples.
    pub fn from_weighted_relationships<I>(
        node_count: u64,
        relationships: I,
    ) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (u64, u64, f64)>,
    {
        let mut builder = CsrGraphBuilder::new(node_count);
        for (source, target, weight) in relationships {
            builder.add_weighted_relationship(NodeId(source), NodeId(target), weight)?;
        }
        builder.build()
    }

    /// Copies a petgraph graph into CSR form, converting edge weights with
    /// `weight`. Pass `None` to drop weights.
    pub fn from_petgraph<N, E, W>(
        graph: &PetGraph<N, E, Directed, u32>,
        weight: Option<W>,
    ) -> Result<Self, CoreError>
    where
        W: Fn(&E) -> f64,
    {
        let mut builder = CsrGraphBuilder::new(graph.node_count() as u64);
        for edge in graph.raw_edges() {
            let source = NodeId::from(edge.source());
            let target = NodeId::from(edge.target());
            match &weight {
                Some(w) => builder.push(source, target, Some(w(&edge.weight))),
                None => builder.push(source, target, None),
            }
        }
        builder.build()
    }

    /// Outgoing neighbors of `node`, in insertion order.
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        match self.range(node) {
            Some((start, end)) => &self.targets[start..end],
            None => &[],
        }
    }

    /// Weights aligned with [`neighbors`](Self::neighbors), when the graph is weighted.
    pub fn weights(&self, node: NodeId) -> Option<&[f64]> {
        let (start, end) = self.range(node)?;
        self.weights.as_ref().map(|w| &w[start..end])
    }

    fn range(&self, node: NodeId) -> Option<(usize, usize)> {
        let idx = node.index();
        let next = idx.checked_add(1).filter(|&next| next < self.offsets.len())?;
        Some((self.offsets[idx], self.offsets[next]))
    }
}

impl Graph for CsrGraph {
    fn node_count(&self) -> u64 {
        self.offsets.len().saturating_sub(1) as u64
    }

    fn relationship_count(&self) -> u64 {
        self.targets.len() as u64
    }

    fn degree(&self, node: NodeId) -> usize {
        self.range(node).map_or(0, |(start, end)| end - start)
    }

    fn for_each_relationship<F>(&self, node: NodeId, mut visitor: F)
    where
        F: FnMut(NodeId, f64) -> bool,
    {
        let Some((start, end)) = self.range(node) else {
            return;
        };
        match &self.weights {
            Some(weights) => {
                for i in start..end {
                    if !visitor(self.targets[i], weights[i]) {
                        return;
                    }
                }
            }
            None => {
                for &target in &self.targets[start..end] {
                    if !visitor(target, DEFAULT_WEIGHT) {
                        return;
                    }
                }
            }
        }
    }

    fn has_relationship_weights(&self) -> bool {
        self.weights.is_some()
    }
}

/// Incremental builder for [`CsrGraph`].
#[derive(Debug, Clone)]
pub struct CsrGraphBuilder {
    node_count: u64,
    undirected: bool,
    relationships: Vec<(NodeId, NodeId)>,
    weights: Option<Vec<f64>>,
}

impl CsrGraphBuilder {
    /// Creates a builder for a graph with `node_count` nodes and no relationships.
    pub fn new(node_count: u64) -> Self {
        CsrGraphBuilder {
            node_count,
            undirected: false,
            relationships: Vec::new(),
            weights: None,
        }
    }

    /// Stores every relationship in both directions.
    ///
    /// Self-loops are stored once.
    pub fn undirected(mut self) -> Self {
        self.undirected = true;
        self
    }

    /// Adds an unweighted relationship.
    pub fn add_relationship(&mut self, source: NodeId, target: NodeId) -> Result<(), CoreError> {
        self.check_node(source)?;
        self.check_node(target)?;
        if self.weights.is_some() {
            return Err(CoreError::InvalidRelationship {
                reason: format!("unweighted relationship {source} -> {target} added to a weighted graph"),
            });
        }
        self.push(source, target, None);
        Ok(())
    }

    /// Adds a weighted relationship. The first relationship decides whether
    /// the graph is weighted.
    pub fn add_weighted_relationship(
        &mut self,
        source: NodeId,
        target: NodeId,
        weight: f64,
    ) -> Result<(), CoreError> {
        self.check_node(source)?;
        self.check_node(target)?;
        if !weight.is_finite() {
            return Err(CoreError::InvalidRelationship {
                reason: format!("relationship {source} -> {target} has non-finite weight {weight}"),
            });
        }
        if self.weights.is_none() && !self.relationships.is_empty() {
            return Err(CoreError::InvalidRelationship {
                reason: format!("weighted relationship {source} -> {target} added to an unweighted graph"),
            });
        }
        self.push(source, target, Some(weight));
        Ok(())
    }

    /// Number of stored (directed) relationships so far.
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Freezes the builder into a [`CsrGraph`] with a stable counting sort,
    /// so each node's relationships keep insertion order.
    ///
    /// Fails with [`CoreError::ResourceExhausted`] when the node or
    /// relationship arrays cannot be allocated.
    pub fn build(self) -> Result<CsrGraph, CoreError> {
        let slots = usize::try_from(self.node_count)
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or(CoreError::ResourceExhausted {
                what: "node offsets",
                requested: self.node_count,
            })?;
        let mut offsets = filled(slots, 0usize, "node offsets")?;
        for (source, _) in &self.relationships {
            offsets[source.index() + 1] += 1;
        }
        for i in 1..slots {
            offsets[i] += offsets[i - 1];
        }

        let mut cursor = filled(slots, 0usize, "node offsets")?;
        cursor.copy_from_slice(&offsets);
        let mut targets = filled(self.relationships.len(), NodeId(0), "relationships")?;
        let mut weights = match &self.weights {
            Some(w) => Some(filled(w.len(), 0.0, "relationship weights")?),
            None => None,
        };
        for (i, (source, target)) in self.relationships.iter().enumerate() {
            let slot = cursor[source.index()];
            cursor[source.index()] += 1;
            targets[slot] = *target;
            if let (Some(out), Some(src)) = (weights.as_mut(), self.weights.as_ref()) {
                out[slot] = src[i];
            }
        }

        Ok(CsrGraph {
            offsets,
            targets,
            weights,
        })
    }

    fn check_node(&self, id: NodeId) -> Result<(), CoreError> {
        if id.0 >= self.node_count {
            return Err(CoreError::NodeNotFound {
                id,
                node_count: self.node_count,
            });
        }
        Ok(())
    }

    /// Reserves room for `additional` more inserted relationships.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), CoreError> {
        let stored = if self.undirected {
            additional.checked_mul(2)
        } else {
            Some(additional)
        };
        let exhausted = || CoreError::ResourceExhausted {
            what: "relationships",
            requested: additional as u64,
        };
        let stored = stored.ok_or_else(exhausted)?;
        self.relationships
            .try_reserve_exact(stored)
            .map_err(|_| exhausted())?;
        if let Some(weights) = self.weights.as_mut() {
            weights.try_reserve_exact(stored).map_err(|_| exhausted())?;
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, source: NodeId, target: NodeId, weight: Option<f64>) {
        self.relationships.push((source, target));
        if let Some(w) = weight {
            self.weights.get_or_insert_with(Vec::new).push(w);
        }
        if self.undirected && source != target {
            self.relationships.push((target, source));
            if let Some(w) = weight {
                self.weights.get_or_insert_with(Vec::new).push(w);
            }
        }
    }
}

fn filled<T: Clone>(len: usize, value: T, what: &'static str) -> Result<Vec<T>, CoreError> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| CoreError::ResourceExhausted {
            what,
            requested: len as u64,
        })?;
    out.resize(len, value);
    Ok(out)
}

impl<N, E> Graph for PetGraph<N, E, Directed, u32>
where
    N: Send + Sync,
    E: Copy + Into<f64> + Send + Sync,
{
    fn node_count(&self) -> u64 {
        PetGraph::node_count(self) as u64
    }

    fn relationship_count(&self) -> u64 {
        PetGraph::edge_count(self) as u64
    }

    fn degree(&self, node: NodeId) -> usize {
        if node.index() >= PetGraph::node_count(self) {
            return 0;
        }
        self.edges(NodeIndex::from(node)).count()
    }

    fn for_each_relationship<F>(&self, node: NodeId, mut visitor: F)
    where
        F: FnMut(NodeId, f64) -> bool,
    {
        if node.index() >= PetGraph::node_count(self) {
            return;
        }
        for edge in self.edges(NodeIndex::from(node)) {
            if !visitor(NodeId::from(edge.target()), (*edge.weight()).into()) {
                return;
            }
        }
    }

    fn has_relationship_weights(&self) -> bool {
        true
    }
}
