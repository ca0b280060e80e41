//! Depth-limited DFS over causal edges.
//!
//! Cycle safety comes from an explicit visited set keyed on the
//! stringified memory id. Edge endpoints are strings, and two nodes are
//! the same node exactly when their ids compare equal.

use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use mnemo_core::constants::{DEFAULT_TRAVERSAL_DEPTH, MAX_TRAVERSAL_DEPTH};
use mnemo_core::errors::MnemoResult;
use mnemo_core::models::{CausalEdge, CausalRelation, TraversalDirection};
use mnemo_storage::queries::causal_ops;

/// Traversal parameters. Depth is clamped into [1, 10].
#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub max_depth: usize,
    pub direction: TraversalDirection,
    /// Restrict traversal to these relation kinds; `None` follows all.
    pub relations: Option<Vec<CausalRelation>>,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_TRAVERSAL_DEPTH,
            direction: TraversalDirection::Outgoing,
            relations: None,
        }
    }
}

/// One edge yielded by a traversal, with how it was reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEdge {
    pub edge: CausalEdge,
    /// 1-based distance from the start node.
    pub depth: usize,
    pub traversal_direction: TraversalDirection,
    /// Node ids from the start to this edge's far endpoint.
    pub path: Vec<String>,
}

/// Full traversal result: flat list plus per-relation grouping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CausalChain {
    pub start: String,
    pub edges: Vec<ChainEdge>,
    pub by_relation: BTreeMap<CausalRelation, Vec<ChainEdge>>,
    /// True when any edge sat at the depth limit; results may be
    /// truncated and a deeper query could yield more.
    pub max_depth_reached: bool,
}

/// Run the traversal on a borrowed connection.
pub fn chain_query(
    conn: &Connection,
    start: &str,
    options: &ChainOptions,
) -> MnemoResult<CausalChain> {
    let depth_limit = options.max_depth.clamp(1, MAX_TRAVERSAL_DEPTH);

    let mut chain = CausalChain {
        start: start.to_string(),
        ..CausalChain::default()
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut seen_edges: HashSet<i64> = HashSet::new();

    // (node, depth of node, path from start to node)
    let mut stack: Vec<(String, usize, Vec<String>)> =
        vec![(start.to_string(), 0, vec![start.to_string()])];

    while let Some((node, node_depth, path)) = stack.pop() {
        if node_depth >= depth_limit {
            continue;
        }

        for leg_direction in legs(options.direction) {
            let fetched = match leg_direction {
                TraversalDirection::Outgoing => {
                    causal_ops::get_edges_from(conn, &node, None, None)?
                }
                _ => causal_ops::get_edges_to(conn, &node, None, None)?,
            };

            for edge in fetched {
                if let Some(relations) = &options.relations {
                    if !relations.contains(&edge.relation) {
                        continue;
                    }
                }
                // In `Both` mode the same edge is reachable from either
                // endpoint; yield it once.
                if !seen_edges.insert(edge.id) {
                    continue;
                }

                let next = match leg_direction {
                    TraversalDirection::Outgoing => edge.target_id.clone(),
                    _ => edge.source_id.clone(),
                };
                let edge_depth = node_depth + 1;
                if edge_depth >= depth_limit {
                    chain.max_depth_reached = true;
                }

                let mut edge_path = path.clone();
                edge_path.push(next.clone());

                let chain_edge = ChainEdge {
                    edge,
                    depth: edge_depth,
                    traversal_direction: *leg_direction,
                    path: edge_path.clone(),
                };
                chain
                    .by_relation
                    .entry(chain_edge.edge.relation)
                    .or_default()
                    .push(chain_edge.clone());
                chain.edges.push(chain_edge);

                if visited.insert(next.clone()) {
                    stack.push((next, edge_depth, edge_path));
                }
            }
        }
    }

    Ok(chain)
}

/// The single-direction legs a traversal direction expands into.
fn legs(direction: TraversalDirection) -> &'static [TraversalDirection] {
    match direction {
        TraversalDirection::Outgoing => &[TraversalDirection::Outgoing],
        TraversalDirection::Incoming => &[TraversalDirection::Incoming],
        TraversalDirection::Both => {
            &[TraversalDirection::Outgoing, TraversalDirection::Incoming]
        }
    }
}
