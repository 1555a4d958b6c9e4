//! Plain-text edge lists.
//!
//! One relationship per line: `source target [weight]`, whitespace separated.
//! Lines starting with `#` or `%` are comments, except for an optional
//! `# nodes: N` header that fixes the node count (otherwise the node count is
//! the largest id seen plus one). Either every relationship carries a weight
//! or none does.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::CoreError;
use crate::graph::{CsrGraph, CsrGraphBuilder, Graph};
use crate::id::NodeId;

const NODES_HEADER: &str = "nodes:";

struct ParsedLine {
    line: usize,
    source: u64,
    target: u64,
    weight: Option<f64>,
}

/// Reads an edge list from `path`.
pub fn read_file(path: impl AsRef<Path>, undirected: bool) -> Result<CsrGraph, CoreError> {
    let file = File::open(path)?;
    parse(BufReader::new(file), undirected)
}

/// Parses an edge list from any buffered reader.
pub fn parse<R: BufRead>(reader: R, undirected: bool) -> Result<CsrGraph, CoreError> {
    let mut declared_nodes: Option<u64> = None;
    let mut seen_nodes: u64 = 0;
    let mut parsed = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#').or_else(|| trimmed.strip_prefix('%')) {
            if let Some(count) = comment.trim().strip_prefix(NODES_HEADER) {
                let count = count.trim().parse::<u64>().map_err(|e| CoreError::Parse {
                    line: line_no,
                    reason: format!("invalid node count '{}': {e}", count.trim()),
                })?;
                declared_nodes = Some(count);
            }
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 2 && fields.len() != 3 {
            return Err(CoreError::Parse {
                line: line_no,
                reason: format!("expected 'source target [weight]', got {} field(s)", fields.len()),
            });
        }
        let source = parse_id(fields[0], line_no)?;
        let target = parse_id(fields[1], line_no)?;
        let weight = match fields.get(2) {
            Some(raw) => Some(raw.parse::<f64>().map_err(|e| CoreError::Parse {
                line: line_no,
                reason: format!("invalid weight '{raw}': {e}"),
            })?),
            None => None,
        };

        let largest = source.max(target);
        let needed = largest.checked_add(1).ok_or_else(|| CoreError::Parse {
            line: line_no,
            reason: format!("node id {largest} is out of range"),
        })?;
        seen_nodes = seen_nodes.max(needed);
        parsed.push(ParsedLine {
            line: line_no,
            source,
            target,
            weight,
        });
    }

    let node_count = declared_nodes.unwrap_or(seen_nodes);
    let mut builder = CsrGraphBuilder::new(node_count);
    if undirected {
        builder = builder.undirected();
    }

    for entry in parsed {
        let source = NodeId(entry.source);
        let target = NodeId(entry.target);
        let added = match entry.weight {
            Some(w) => builder.add_weighted_relationship(source, target, w),
            None => builder.add_relationship(source, target),
        };
        added.map_err(|e| CoreError::Parse {
            line: entry.line,
            reason: e.to_string(),
        })?;
    }

    builder.build()
}

/// Writes `graph` as an edge list, including the `# nodes:` header so
/// isolated trailing nodes survive a round trip.
pub fn write<G: Graph, W: Write>(graph: &G, writer: W) -> Result<(), CoreError> {
    let mut out = BufWriter::new(writer);
    writeln!(out, "# {NODES_HEADER} {}", graph.node_count())?;
    let weighted = graph.has_relationship_weights();
    let mut failure = None;
    for node in 0..graph.node_count() {
        graph.for_each_relationship(NodeId(node), |target, weight| {
            let written = if weighted {
                writeln!(out, "{node} {target} {weight}")
            } else {
                writeln!(out, "{node} {target}")
            };
            match written {
                Ok(()) => true,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });
        if let Some(e) = failure.take() {
            return Err(e.into());
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes `graph` to `path`, replacing any existing file.
pub fn write_file<G: Graph>(graph: &G, path: impl AsRef<Path>) -> Result<(), CoreError> {
    let file = File::create(path)?;
    write(graph, file)
}

fn parse_id(raw: &str, line: usize) -> Result<u64, CoreError> {
    raw.parse::<u64>().map_err(|e| CoreError::Parse {
        line,
        reason: format!("invalid node id '{raw}': {e}"),
    })
}
