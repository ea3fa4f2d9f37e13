//! Node/edge arena for the trail graph.
//!
//! Nodes and edges are addressed by stable integer ids that are never reused
//! within a run. Structural edits go through [`GraphDiff`], applied in one step
//! so every stage sees a graph whose degrees are consistent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::geo_utils::{polyline_length, polyline_length_3d};
use crate::{Result, TrailGraphError, TrailPoint};

pub type NodeId = usize;
pub type EdgeId = usize;

/// Node classification derived from degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// No incident edges (a defect once a stage has finished)
    Isolated,
    /// Dead end, degree 1
    Endpoint,
    /// Degree 2, expected to disappear during consolidation
    Through,
    /// Branch point, degree 3 or more
    Intersection,
}

impl NodeKind {
    pub fn from_degree(degree: usize) -> Self {
        match degree {
            0 => NodeKind::Isolated,
            1 => NodeKind::Endpoint,
            2 => NodeKind::Through,
            _ => NodeKind::Intersection,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Isolated => "isolated",
            NodeKind::Endpoint => "endpoint",
            NodeKind::Through => "through",
            NodeKind::Intersection => "intersection",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph node: an endpoint or intersection location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub location: TrailPoint,
    /// Number of incident edges, kept current by the graph
    pub degree: usize,
    pub kind: NodeKind,
}

/// The original trail segment an edge's geometry came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub trail_id: String,
    pub segment_id: String,
    /// 1 or 2 when a closed segment was split into two edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u8>,
}

/// A trail edge between two distinct nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Polyline from the source end to the target end
    pub geometry: Vec<TrailPoint>,
    pub length_meters: f64,
    /// Length including height changes, equal to `length_meters` without elevation
    pub length_3d_meters: f64,
    /// Climb when travelling source to target
    pub elevation_gain: f64,
    /// Descent when travelling source to target
    pub elevation_loss: f64,
    /// Contributing segments in traversal order
    pub provenance: Vec<Provenance>,
}

impl GraphEdge {
    /// Create an edge, rejecting self-loops and degenerate geometry.
    ///
    /// Lengths default to the geometry's and elevation to zero; use
    /// [`GraphEdge::with_metrics`] and [`GraphEdge::with_length_3d`] to carry
    /// measured values.
    pub fn new(
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        geometry: Vec<TrailPoint>,
        provenance: Vec<Provenance>,
    ) -> Result<Self> {
        if source == target {
            return Err(TrailGraphError::InvalidEdge {
                source_node: source,
                target_node: target,
                reason: "source and target are the same node",
            });
        }
        if geometry.len() < 2 {
            return Err(TrailGraphError::InvalidEdge {
                source_node: source,
                target_node: target,
                reason: "geometry has fewer than 2 points",
            });
        }

        let length_meters = polyline_length(&geometry);
        let length_3d_meters = polyline_length_3d(&geometry);
        Ok(Self {
            id,
            source,
            target,
            geometry,
            length_meters,
            length_3d_meters,
            elevation_gain: 0.0,
            elevation_loss: 0.0,
            provenance,
        })
    }

    pub fn with_metrics(mut self, length_meters: f64, gain: f64, loss: f64) -> Self {
        self.length_meters = length_meters;
        self.elevation_gain = gain;
        self.elevation_loss = loss;
        self
    }

    pub fn with_length_3d(mut self, length_3d_meters: f64) -> Self {
        self.length_3d_meters = length_3d_meters;
        self
    }

    /// The node at the other end from `node`.
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.source == node {
            self.target
        } else {
            self.source
        }
    }

    pub fn connects(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }

    /// Trail ids in provenance order.
    pub fn trail_ids(&self) -> impl Iterator<Item = &str> {
        self.provenance.iter().map(|p| p.trail_id.as_str())
    }
}

/// A batch of structural edits applied atomically by [`TrailGraph::apply`].
#[derive(Debug, Clone, Default)]
pub struct GraphDiff {
    pub remove_edges: Vec<EdgeId>,
    pub add_edges: Vec<GraphEdge>,
    /// Nodes to drop, only if they end up with no incident edges
    pub remove_nodes: Vec<NodeId>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.remove_edges.is_empty() && self.add_edges.is_empty() && self.remove_nodes.is_empty()
    }
}

/// What a [`GraphDiff`] actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub edges_removed: usize,
    pub edges_added: usize,
    pub nodes_removed: usize,
}

/// Arena of nodes and edges with an incidence index.
#[derive(Debug, Clone, Default)]
pub struct TrailGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: BTreeMap<EdgeId, GraphEdge>,
    incidence: BTreeMap<NodeId, Vec<EdgeId>>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
}

impl TrailGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no edges yet.
    pub fn add_node(&mut self, location: TrailPoint) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            GraphNode {
                id,
                location,
                degree: 0,
                kind: NodeKind::Isolated,
            },
        );
        id
    }

    /// Reserve a fresh edge id.
    pub fn allocate_edge_id(&mut self) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        id
    }

    /// Insert an edge and update the degrees of its endpoints.
    ///
    /// Endpoint nodes are not required to exist; dangling references are
    /// reported by connectivity validation rather than rejected here.
    pub fn insert_edge(&mut self, edge: GraphEdge) {
        let (id, source, target) = (edge.id, edge.source, edge.target);
        self.next_edge_id = self.next_edge_id.max(id + 1);
        if let Some(previous) = self.edges.insert(id, edge) {
            self.unlink(&previous);
            self.refresh_degree(previous.source);
            self.refresh_degree(previous.target);
        }
        self.incidence.entry(source).or_default().push(id);
        self.incidence.entry(target).or_default().push(id);
        self.refresh_degree(source);
        self.refresh_degree(target);
    }

    /// Remove a node regardless of its edges.
    pub fn remove_node(&mut self, id: NodeId) -> Option<GraphNode> {
        self.incidence.remove(&id);
        self.nodes.remove(&id)
    }

    /// Apply a batch of edits, then recompute the degree of every touched node.
    pub fn apply(&mut self, diff: GraphDiff) -> DiffSummary {
        let mut summary = DiffSummary::default();
        if diff.is_empty() {
            return summary;
        }
        let mut touched: BTreeSet<NodeId> = BTreeSet::new();

        for edge_id in diff.remove_edges {
            if let Some(edge) = self.edges.remove(&edge_id) {
                self.unlink(&edge);
                touched.insert(edge.source);
                touched.insert(edge.target);
                summary.edges_removed += 1;
            }
        }

        for edge in diff.add_edges {
            touched.insert(edge.source);
            touched.insert(edge.target);
            self.next_edge_id = self.next_edge_id.max(edge.id + 1);
            self.incidence.entry(edge.source).or_default().push(edge.id);
            self.incidence.entry(edge.target).or_default().push(edge.id);
            self.edges.insert(edge.id, edge);
            summary.edges_added += 1;
        }

        for node_id in diff.remove_nodes {
            let unreferenced = self.incidence.get(&node_id).is_none_or(|e| e.is_empty());
            if unreferenced && self.nodes.remove(&node_id).is_some() {
                self.incidence.remove(&node_id);
                touched.remove(&node_id);
                summary.nodes_removed += 1;
            }
        }

        for node_id in touched {
            self.refresh_degree(node_id);
        }

        summary
    }

    /// Drop every node without incident edges. Returns how many were removed.
    pub fn prune_isolated_nodes(&mut self) -> usize {
        let isolated: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.degree == 0)
            .map(|n| n.id)
            .collect();
        for id in &isolated {
            self.remove_node(*id);
        }
        isolated.len()
    }

    fn unlink(&mut self, edge: &GraphEdge) {
        for node in [edge.source, edge.target] {
            if let Some(list) = self.incidence.get_mut(&node) {
                if let Some(pos) = list.iter().position(|e| *e == edge.id) {
                    list.remove(pos);
                }
            }
        }
    }

    fn refresh_degree(&mut self, node_id: NodeId) {
        let degree = self.incidence.get(&node_id).map_or(0, Vec::len);
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.degree = degree;
            node.kind = NodeKind::from_degree(degree);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&GraphEdge> {
        self.edges.get(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Edges in ascending id order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.incidence.get(&id).map_or(0, Vec::len)
    }

    /// Edge ids incident to a node, ascending.
    pub fn incident_edges(&self, id: NodeId) -> Vec<EdgeId> {
        let mut edges = self.incidence.get(&id).cloned().unwrap_or_default();
        edges.sort_unstable();
        edges
    }

    /// Total edge length in meters.
    pub fn total_length_meters(&self) -> f64 {
        self.edges.values().map(|e| e.length_meters).sum()
    }

    /// Total edge length in meters, including height changes.
    pub fn total_length_3d_meters(&self) -> f64 {
        self.edges.values().map(|e| e.length_3d_meters).sum()
    }
}
