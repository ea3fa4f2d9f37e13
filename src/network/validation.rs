//! Read-only health checks on a finished trail graph.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

use super::graph::{NodeId, TrailGraph};

/// Connectivity and degree statistics for a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub node_count: usize,
    pub edge_count: usize,
    /// Node count per degree
    pub degree_histogram: BTreeMap<usize, usize>,
    pub endpoint_nodes: usize,
    pub intersection_nodes: usize,
    /// Nodes with no incident edges
    pub isolated_nodes: usize,
    /// Edges referencing a node that does not exist
    pub orphaned_edges: usize,
    /// Edges whose source and target are the same node
    pub self_loop_edges: usize,
    /// Degree-2 nodes on a closed loop, which cannot be merged away
    pub loop_through_nodes: usize,
    /// Degree-2 nodes on an open chain that consolidation left behind
    pub unexpected_through_nodes: usize,
    /// Closed runs of degree-2 nodes
    pub unresolved_loops: usize,
    pub component_count: usize,
    pub start_node: Option<NodeId>,
    pub reachable_nodes: usize,
    /// Share of nodes reachable from the start node, 0..=100
    pub reachability_percent: f64,
}

impl ConnectivityReport {
    /// No defects and a single connected component.
    pub fn is_healthy(&self) -> bool {
        self.isolated_nodes == 0
            && self.orphaned_edges == 0
            && self.self_loop_edges == 0
            && self.unexpected_through_nodes == 0
            && self.component_count <= 1
    }
}

/// Check the structure and reachability of a graph.
///
/// Reachability is measured from `start` when given and present, otherwise
/// from the lowest-id node that has at least one edge.
pub fn validate_connectivity(graph: &TrailGraph, start: Option<NodeId>) -> ConnectivityReport {
    let mut report = ConnectivityReport {
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        ..Default::default()
    };

    for node in graph.nodes() {
        *report.degree_histogram.entry(node.degree).or_insert(0) += 1;
        match node.degree {
            0 => report.isolated_nodes += 1,
            1 => report.endpoint_nodes += 1,
            2 => {}
            _ => report.intersection_nodes += 1,
        }
    }

    for edge in graph.edges() {
        if edge.source == edge.target {
            report.self_loop_edges += 1;
        }
        if !graph.contains_node(edge.source) || !graph.contains_node(edge.target) {
            report.orphaned_edges += 1;
        }
    }

    classify_through_nodes(graph, &mut report);

    let start = start
        .filter(|id| graph.contains_node(*id))
        .or_else(|| graph.nodes().find(|n| n.degree > 0).map(|n| n.id));
    report.start_node = start;

    if let Some(start) = start {
        report.reachable_nodes = reachable_from(graph, start).len();
        report.reachability_percent =
            report.reachable_nodes as f64 / report.node_count as f64 * 100.0;
    }

    let mut seen: HashSet<NodeId> = HashSet::new();
    for node in graph.nodes() {
        if seen.contains(&node.id) {
            continue;
        }
        seen.extend(reachable_from(graph, node.id));
        report.component_count += 1;
    }

    if report.is_healthy() {
        info!(
            "[Validation] {} nodes, {} edges, {:.1}% reachable",
            report.node_count, report.edge_count, report.reachability_percent
        );
    } else {
        warn!(
            "[Validation] {} nodes, {} edges, {:.1}% reachable, {} components, \
             {} isolated nodes, {} orphaned edges, {} unmerged through nodes",
            report.node_count,
            report.edge_count,
            report.reachability_percent,
            report.component_count,
            report.isolated_nodes,
            report.orphaned_edges,
            report.unexpected_through_nodes
        );
    }

    report
}

/// Nodes reachable from `start`, following edges between existing nodes.
fn reachable_from(graph: &TrailGraph, start: NodeId) -> HashSet<NodeId> {
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for edge_id in graph.incident_edges(node) {
            let Some(edge) = graph.edge(edge_id) else {
                continue;
            };
            let next = edge.other_end(node);
            if graph.contains_node(next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    visited
}

/// Split degree-2 nodes into loop members and leftovers on open chains.
///
/// Each maximal run of degree-2 nodes is expanded; it is a loop when it has
/// no boundary node (a pure cycle) or both of its ends reach the same one.
fn classify_through_nodes(graph: &TrailGraph, report: &mut ConnectivityReport) {
    let mut classified: HashSet<NodeId> = HashSet::new();

    for node in graph.nodes().filter(|n| n.degree == 2) {
        if classified.contains(&node.id) {
            continue;
        }

        let mut run: Vec<NodeId> = Vec::new();
        let mut boundary: Vec<NodeId> = Vec::new();
        let mut stack = vec![node.id];
        let mut in_run = HashSet::new();

        while let Some(id) = stack.pop() {
            if !in_run.insert(id) {
                continue;
            }
            run.push(id);
            for edge_id in graph.incident_edges(id) {
                let Some(edge) = graph.edge(edge_id) else {
                    continue;
                };
                let next = edge.other_end(id);
                if graph.degree(next) == 2 && graph.contains_node(next) {
                    stack.push(next);
                } else {
                    boundary.push(next);
                }
            }
        }

        let is_loop = boundary.is_empty() || boundary.iter().all(|b| *b == boundary[0]);
        if is_loop {
            report.loop_through_nodes += run.len();
            report.unresolved_loops += 1;
        } else {
            report.unexpected_through_nodes += run.len();
        }
        classified.extend(run);
    }
}
