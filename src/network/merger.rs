//! Degree-2 chain consolidation.
//!
//! A chain is a maximal run of edges connected through degree-2 nodes,
//! starting and ending at nodes of any other degree. Each iteration:
//! 1. detects candidate chains (bounded by `max_chain_length`)
//! 2. validates each chain's merged geometry (continuity and simplicity)
//! 3. resolves overlaps so every edge is merged at most once
//! 4. commits all accepted chains as one atomic graph edit
//!
//! Iterations repeat until no chain is merged. Every merge removes at least
//! one edge, so this terminates. Chains truncated by the length bound end on
//! a degree-2 node, so the next iteration picks up where the previous one
//! stopped. A run of degree-2 nodes that leads back to where it started is a
//! loop however long it is, and is never merged.

use log::{debug, info, warn};
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::graph::{EdgeId, GraphDiff, GraphEdge, NodeId, Provenance, TrailGraph};
use crate::geo_utils::{
    compute_bounds, dedup_consecutive, haversine_distance, is_simple_polyline,
    overlap_length_meters,
};
use crate::{NetworkConfig, TrailPoint};

/// A run of edges through degree-2 nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub start: NodeId,
    pub end: NodeId,
    /// Edges in traversal order from `start`
    pub edges: Vec<EdgeId>,
    /// Whether each edge is traversed from its target to its source
    pub reversed: Vec<bool>,
    /// Degree-2 nodes passed through
    pub interior_nodes: Vec<NodeId>,
    pub length_meters: f64,
    /// Stopped by the length bound rather than at a non-degree-2 node
    pub truncated: bool,
}

impl Chain {
    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    fn edge_key(&self) -> Vec<EdgeId> {
        let mut key = self.edges.clone();
        key.sort_unstable();
        key
    }

    /// Cut an open run down to its first `max_edges` edges.
    fn bounded(mut self, graph: &TrailGraph, max_edges: usize) -> Chain {
        if self.is_loop() || self.edges.len() <= max_edges {
            return self;
        }
        // interior_nodes[k] is the node reached after edges[k]
        self.end = self.interior_nodes[max_edges - 1];
        self.edges.truncate(max_edges);
        self.reversed.truncate(max_edges);
        self.interior_nodes.truncate(max_edges - 1);
        self.length_meters = self
            .edges
            .iter()
            .filter_map(|&id| graph.edge(id))
            .map(|e| e.length_meters)
            .sum();
        self.truncated = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RejectionReason {
    /// Chain returns to its starting node
    Loop,
    /// Consecutive edges do not meet within the join tolerance
    Discontinuous { gap_meters: f64 },
    /// Merged geometry crosses or folds back onto itself
    NotSimple,
    /// Shares an edge with a longer accepted chain
    SharedEdge,
    /// Runs alongside a longer accepted chain for too long
    Overlap { overlap_meters: f64 },
    /// References an edge that is no longer in the graph
    MissingEdge,
}

/// A chain left unmerged, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedChain {
    pub start: NodeId,
    pub end: NodeId,
    pub edges: Vec<EdgeId>,
    pub reason: RejectionReason,
}

impl RejectedChain {
    fn new(chain: &Chain, reason: RejectionReason) -> Self {
        Self {
            start: chain.start,
            end: chain.end,
            edges: chain.edges.clone(),
            reason,
        }
    }
}

/// Result of chain detection on one graph state.
#[derive(Debug, Clone, Default)]
pub struct ChainDetection {
    /// Open chains of two or more edges, one per edge set
    pub candidates: Vec<Chain>,
    /// Chains whose ends meet at the same node
    pub loops: Vec<Chain>,
    /// Edge sets of components made only of degree-2 nodes
    pub isolated_cycles: Vec<Vec<EdgeId>>,
}

/// A chain with its merged geometry, ready to commit.
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    pub chain: Chain,
    pub geometry: Vec<TrailPoint>,
}

/// Find all mergeable chains, walking from every node whose degree is not 2.
pub fn detect_chains(graph: &TrailGraph, config: &NetworkConfig) -> ChainDetection {
    let mut detection = ChainDetection::default();
    let mut seen: HashSet<Vec<EdgeId>> = HashSet::new();
    let mut walked: HashSet<EdgeId> = HashSet::new();

    for node in graph.nodes() {
        if node.degree == 2 || node.degree == 0 {
            continue;
        }
        for edge_id in graph.incident_edges(node.id) {
            let run = walk_run(graph, node.id, edge_id);
            walked.extend(run.edges.iter().copied());
            if run.edges.len() < 2 {
                continue;
            }

            if run.is_loop() {
                if seen.insert(run.edge_key()) {
                    detection.loops.push(run);
                }
                continue;
            }

            let chain = run.bounded(graph, config.max_chain_length);
            if seen.insert(chain.edge_key()) {
                detection.candidates.push(chain);
            }
        }
    }

    detection.isolated_cycles = isolated_cycles(graph, &walked);
    detection
}

/// Follow edges from `start` through degree-2 nodes to the far end of the run.
fn walk_run(graph: &TrailGraph, start: NodeId, first_edge: EdgeId) -> Chain {
    let mut chain = Chain {
        start,
        end: start,
        edges: Vec::new(),
        reversed: Vec::new(),
        interior_nodes: Vec::new(),
        length_meters: 0.0,
        truncated: false,
    };

    let mut current = start;
    let mut edge_id = first_edge;
    let mut visited: HashSet<EdgeId> = HashSet::new();

    while let Some(edge) = graph.edge(edge_id) {
        visited.insert(edge_id);
        chain.edges.push(edge_id);
        chain.reversed.push(edge.source != current);
        chain.length_meters += edge.length_meters;
        current = edge.other_end(current);

        if current == start || graph.degree(current) != 2 {
            break;
        }

        let incident = graph.incident_edges(current);
        let next = if incident[0] == edge_id {
            incident[1]
        } else {
            incident[0]
        };
        if visited.contains(&next) {
            break;
        }
        chain.interior_nodes.push(current);
        edge_id = next;
    }

    chain.end = current;
    chain
}

/// Connected groups of unwalked edges whose nodes all have degree 2.
fn isolated_cycles(graph: &TrailGraph, walked: &HashSet<EdgeId>) -> Vec<Vec<EdgeId>> {
    let mut assigned: HashSet<EdgeId> = HashSet::new();
    let mut cycles = Vec::new();

    for edge in graph.edges() {
        if walked.contains(&edge.id) || assigned.contains(&edge.id) {
            continue;
        }
        let mut group = BTreeSet::new();
        let mut all_degree_two = true;
        let mut stack = vec![edge.id];
        while let Some(id) = stack.pop() {
            if !group.insert(id) {
                continue;
            }
            if let Some(e) = graph.edge(id) {
                for node in [e.source, e.target] {
                    if graph.degree(node) == 2 {
                        stack.extend(graph.incident_edges(node));
                    } else {
                        all_degree_two = false;
                    }
                }
            }
        }
        assigned.extend(group.iter().copied());
        if all_degree_two {
            cycles.push(group.into_iter().collect());
        }
    }

    cycles
}

/// Build the merged geometry of a chain, rejecting gaps and self-crossings.
pub fn validate_chain(
    graph: &TrailGraph,
    chain: &Chain,
    config: &NetworkConfig,
) -> Result<ValidatedChain, RejectionReason> {
    if chain.is_loop() {
        return Err(RejectionReason::Loop);
    }

    let mut merged: Vec<TrailPoint> = Vec::new();
    for (&edge_id, &reversed) in chain.edges.iter().zip(&chain.reversed) {
        let edge = graph.edge(edge_id).ok_or(RejectionReason::MissingEdge)?;
        let mut points = edge.geometry.clone();
        if reversed {
            points.reverse();
        }

        match merged.last() {
            None => merged = points,
            Some(last) => {
                let gap_meters = haversine_distance(last, &points[0]);
                if gap_meters > config.chain_join_tolerance_meters {
                    return Err(RejectionReason::Discontinuous { gap_meters });
                }
                merged.extend(points.into_iter().skip(1));
            }
        }
    }

    dedup_consecutive(&mut merged);
    if merged.len() < 2 || !is_simple_polyline(&merged) {
        return Err(RejectionReason::NotSimple);
    }

    Ok(ValidatedChain {
        chain: chain.clone(),
        geometry: merged,
    })
}

type ChainEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn chain_envelope(geometry: &[TrailPoint], buffer_meters: f64, idx: usize) -> ChainEnvelope {
    let b = compute_bounds(geometry).expand_meters(buffer_meters);
    GeomWithData::new(
        Rectangle::from_corners([b.min_lng, b.min_lat], [b.max_lng, b.max_lat]),
        idx,
    )
}

/// Pick a set of chains that can all be merged in the same iteration.
///
/// Longer chains win. A chain is rejected if it shares an edge with an
/// accepted chain, or runs within the join tolerance of one for more than
/// `overlap_drop_threshold_meters`.
pub fn resolve_overlaps(
    candidates: Vec<ValidatedChain>,
    config: &NetworkConfig,
) -> (Vec<ValidatedChain>, Vec<RejectedChain>) {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .chain
            .length_meters
            .total_cmp(&candidates[a].chain.length_meters)
            .then(a.cmp(&b))
    });

    let tolerance = config.chain_join_tolerance_meters;
    let mut claimed: HashSet<EdgeId> = HashSet::new();
    let mut accepted_idx: Vec<usize> = Vec::new();
    let mut accepted_tree: RTree<ChainEnvelope> = RTree::new();
    let mut rejected = Vec::new();

    for idx in order {
        let candidate = &candidates[idx];
        if candidate.chain.edges.iter().any(|e| claimed.contains(e)) {
            rejected.push(RejectedChain::new(&candidate.chain, RejectionReason::SharedEdge));
            continue;
        }

        let envelope = chain_envelope(&candidate.geometry, tolerance, idx);
        let overlap = accepted_tree
            .locate_in_envelope_intersecting(&rstar::RTreeObject::envelope(&envelope))
            .map(|other| {
                let accepted = &candidates[other.data].geometry;
                overlap_length_meters(&candidate.geometry, accepted, tolerance)
            })
            .fold(0.0_f64, f64::max);
        if overlap > config.overlap_drop_threshold_meters {
            rejected.push(RejectedChain::new(
                &candidate.chain,
                RejectionReason::Overlap {
                    overlap_meters: overlap,
                },
            ));
            continue;
        }

        claimed.extend(candidate.chain.edges.iter().copied());
        accepted_tree.insert(envelope);
        accepted_idx.push(idx);
    }

    accepted_idx.sort_unstable();
    let mut keep = vec![false; candidates.len()];
    for idx in accepted_idx {
        keep[idx] = true;
    }
    let accepted = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c))
        .collect();

    (accepted, rejected)
}

/// Counts from committing a batch of chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub chains_committed: usize,
    pub edges_removed: usize,
    pub nodes_removed: usize,
}

/// Replace each chain with a single merged edge, as one atomic graph edit.
pub fn commit_chains(graph: &mut TrailGraph, chains: &[ValidatedChain]) -> CommitSummary {
    let mut diff = GraphDiff::default();
    let mut committed = 0;

    for validated in chains {
        let chain = &validated.chain;
        let mut gain = 0.0;
        let mut loss = 0.0;
        let mut length_3d = 0.0;
        let mut provenance: Vec<Provenance> = Vec::new();
        let mut missing = false;

        for (&edge_id, &reversed) in chain.edges.iter().zip(&chain.reversed) {
            let Some(edge) = graph.edge(edge_id) else {
                missing = true;
                break;
            };
            length_3d += edge.length_3d_meters;
            if reversed {
                gain += edge.elevation_loss;
                loss += edge.elevation_gain;
                provenance.extend(edge.provenance.iter().rev().cloned());
            } else {
                gain += edge.elevation_gain;
                loss += edge.elevation_loss;
                provenance.extend(edge.provenance.iter().cloned());
            }
        }
        if missing {
            warn!("[Merger] Skipping chain {:?}: edge no longer present", chain.edges);
            continue;
        }

        let id = graph.allocate_edge_id();
        match GraphEdge::new(id, chain.start, chain.end, validated.geometry.clone(), provenance) {
            Ok(edge) => {
                diff.add_edges.push(
                    edge.with_metrics(chain.length_meters, gain, loss)
                        .with_length_3d(length_3d),
                );
                diff.remove_edges.extend(chain.edges.iter().copied());
                diff.remove_nodes.extend(chain.interior_nodes.iter().copied());
                committed += 1;
            }
            Err(e) => warn!("[Merger] Skipping chain {:?}: {}", chain.edges, e),
        }
    }

    let applied = graph.apply(diff);
    CommitSummary {
        chains_committed: committed,
        edges_removed: applied.edges_removed,
        nodes_removed: applied.nodes_removed,
    }
}

/// Outcome of one detect/validate/resolve/commit pass.
#[derive(Debug, Clone, Default)]
pub struct IterationOutcome {
    pub chains_merged: usize,
    pub edges_removed: usize,
    pub nodes_removed: usize,
    /// Dead-end edges whose far node was degree 2, now part of a longer edge
    pub bridges_absorbed: usize,
    pub rejected: Vec<RejectedChain>,
    pub isolated_cycles: Vec<Vec<EdgeId>>,
}

/// Run one merge pass over the graph.
pub fn merge_iteration(graph: &mut TrailGraph, config: &NetworkConfig) -> IterationOutcome {
    let detection = detect_chains(graph, config);
    let mut rejected: Vec<RejectedChain> = detection
        .loops
        .iter()
        .map(|c| RejectedChain::new(c, RejectionReason::Loop))
        .collect();

    let mut valid = Vec::with_capacity(detection.candidates.len());
    for chain in &detection.candidates {
        match validate_chain(graph, chain, config) {
            Ok(v) => valid.push(v),
            Err(reason) => {
                debug!(
                    "[Merger] Rejecting chain {} -> {}: {:?}",
                    chain.start, chain.end, reason
                );
                rejected.push(RejectedChain::new(chain, reason));
            }
        }
    }

    let (accepted, overlapping) = resolve_overlaps(valid, config);
    rejected.extend(overlapping);

    let bridges_absorbed = accepted
        .iter()
        .map(|v| {
            let c = &v.chain;
            let at_start = graph.degree(c.start) == 1;
            let at_end = !c.truncated && graph.degree(c.end) == 1;
            usize::from(at_start) + usize::from(at_end)
        })
        .sum();

    let summary = commit_chains(graph, &accepted);

    IterationOutcome {
        chains_merged: summary.chains_committed,
        edges_removed: summary.edges_removed,
        nodes_removed: summary.nodes_removed,
        bridges_absorbed,
        rejected,
        isolated_cycles: detection.isolated_cycles,
    }
}

/// Summary of a full consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub iterations: usize,
    pub chains_merged: usize,
    pub bridges_absorbed: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub nodes_removed: usize,
    pub edges_before: usize,
    pub edges_after: usize,
    /// Whether the last iteration merged nothing
    pub converged: bool,
    /// Chains still unmerged after the final iteration
    pub rejected: Vec<RejectedChain>,
    /// Edge sets of loops left in place (closed chains and isolated cycles)
    pub unresolved_loops: Vec<Vec<EdgeId>>,
}

/// Merge degree-2 chains until a fixed point is reached.
///
/// Each productive iteration removes at least one edge, so the starting edge
/// count bounds the number of iterations.
pub fn consolidate(graph: &mut TrailGraph, config: &NetworkConfig) -> ConsolidationReport {
    let mut report = ConsolidationReport {
        nodes_before: graph.node_count(),
        edges_before: graph.edge_count(),
        ..Default::default()
    };
    let max_iterations = report.edges_before + 1;

    for iteration in 1..=max_iterations {
        let edges_before = graph.edge_count();
        let outcome = merge_iteration(graph, config);
        report.iterations = iteration;

        if outcome.chains_merged == 0 {
            report.converged = true;
            report.unresolved_loops = outcome
                .rejected
                .iter()
                .filter(|r| r.reason == RejectionReason::Loop)
                .map(|r| r.edges.clone())
                .chain(outcome.isolated_cycles)
                .collect();
            report.rejected = outcome.rejected;
            info!(
                "[Merger] Converged after {} iteration(s): {} chains merged, {} rejected",
                iteration,
                report.chains_merged,
                report.rejected.len()
            );
            break;
        }

        report.chains_merged += outcome.chains_merged;
        report.bridges_absorbed += outcome.bridges_absorbed;
        report.nodes_removed += outcome.nodes_removed;
        info!(
            "[Merger] Iteration {}: {} chains merged, {} -> {} edges",
            iteration,
            outcome.chains_merged,
            edges_before,
            graph.edge_count()
        );
    }

    if !report.converged {
        warn!(
            "[Merger] Stopped after {} iterations without converging",
            max_iterations
        );
    }

    report.nodes_after = graph.node_count();
    report.edges_after = graph.edge_count();
    report
}
