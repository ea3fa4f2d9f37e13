//! Graph assembly from trail segments.
//!
//! Segment endpoints are matched to nodes with a proximity index: the first
//! endpoint seen at a location creates the node, later endpoints within the
//! node tolerance reuse it. Every segment becomes one edge, except closed
//! segments (both ends on the same node), which are split at their midpoint
//! into two edges so the graph never holds a self-loop. Each half's provenance
//! records which part of the segment it carries.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::graph::{GraphEdge, NodeId, Provenance, TrailGraph};
use super::rtree::NodeIndex;
use super::splitter::Segment;
use crate::geo_utils::{
    PolylinePosition, elevation_stats, haversine_distance, polyline_length, position_at_distance,
    slice_polyline,
};
use crate::{NetworkConfig, TrailPoint};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub segments_in: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    /// Closed segments split at their midpoint
    pub loop_segments_split: usize,
    /// Closed segments too small to split, or segments rejected as edges
    pub segments_dropped: usize,
    /// Nodes left without edges after dropped segments, removed at the end
    pub nodes_pruned: usize,
}

/// Build the node/edge graph from segments.
pub fn build_graph(segments: &[Segment], config: &NetworkConfig) -> (TrailGraph, BuildStats) {
    let mut graph = TrailGraph::new();
    let mut index = NodeIndex::new(config.node_tolerance_meters);
    let mut stats = BuildStats {
        segments_in: segments.len(),
        ..Default::default()
    };

    for segment in segments {
        let source = resolve_node(&mut graph, &mut index, segment.start());
        let target = resolve_node(&mut graph, &mut index, segment.end());

        if source == target {
            add_loop_segment(&mut graph, &mut index, segment, source, config, &mut stats);
            continue;
        }

        let (gain, loss) = gain_loss(segment.elevation.as_ref());
        let id = graph.allocate_edge_id();
        let origin = vec![provenance(segment, None)];
        match GraphEdge::new(id, source, target, segment.points.clone(), origin) {
            Ok(edge) => {
                graph.insert_edge(
                    edge.with_metrics(segment.length_meters, gain, loss)
                        .with_length_3d(segment.length_3d_meters),
                );
                stats.edges_created += 1;
            }
            Err(e) => {
                warn!("[Builder] Dropping segment {}: {}", segment.id, e);
                stats.segments_dropped += 1;
            }
        }
    }

    stats.nodes_created = index.len();
    stats.nodes_pruned = graph.prune_isolated_nodes();

    info!(
        "[Builder] {} segments -> {} nodes, {} edges ({} loops split, {} dropped)",
        stats.segments_in,
        graph.node_count(),
        graph.edge_count(),
        stats.loop_segments_split,
        stats.segments_dropped
    );

    (graph, stats)
}

fn resolve_node(graph: &mut TrailGraph, index: &mut NodeIndex, location: &TrailPoint) -> NodeId {
    if let Some(id) = index.find(location) {
        return id;
    }
    let id = graph.add_node(*location);
    index.insert(id, location);
    id
}

fn provenance(segment: &Segment, part: Option<u8>) -> Provenance {
    Provenance {
        trail_id: segment.trail_id.clone(),
        segment_id: segment.id.clone(),
        part,
    }
}

fn gain_loss(stats: Option<&crate::ElevationStats>) -> (f64, f64) {
    stats.map_or((0.0, 0.0), |s| (s.gain, s.loss))
}

fn add_loop_segment(
    graph: &mut TrailGraph,
    index: &mut NodeIndex,
    segment: &Segment,
    node: NodeId,
    config: &NetworkConfig,
    stats: &mut BuildStats,
) {
    let middle = position_at_distance(&segment.points, segment.length_meters / 2.0);
    let midpoint = middle.point(&segment.points);

    let node_location = graph.node(node).map(|n| n.location).unwrap_or(midpoint);
    if haversine_distance(&midpoint, &node_location) <= config.node_tolerance_meters {
        warn!(
            "[Builder] Dropping closed segment {} ({:.1}m): too small to split",
            segment.id, segment.length_meters
        );
        stats.segments_dropped += 1;
        return;
    }

    let middle_node = resolve_node(graph, index, &midpoint);
    let halves = [
        (
            1,
            node,
            middle_node,
            slice_polyline(&segment.points, &PolylinePosition::start(), &middle),
        ),
        (
            2,
            middle_node,
            node,
            slice_polyline(&segment.points, &middle, &PolylinePosition::end(&segment.points)),
        ),
    ];

    for (part, source, target, points) in halves {
        let length = polyline_length(&points);
        let (gain, loss) = gain_loss(elevation_stats(&points).as_ref());
        let id = graph.allocate_edge_id();
        let origin = vec![provenance(segment, Some(part))];
        match GraphEdge::new(id, source, target, points, origin) {
            Ok(edge) => {
                graph.insert_edge(edge.with_metrics(length, gain, loss));
                stats.edges_created += 1;
            }
            Err(e) => {
                warn!("[Builder] Dropping half of closed segment {}: {}", segment.id, e);
                stats.segments_dropped += 1;
            }
        }
    }
    stats.loop_segments_split += 1;
}
