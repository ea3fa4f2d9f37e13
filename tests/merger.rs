//! Tests for degree-2 chain consolidation

use trailgraph::network::{
    Chain, ValidatedChain, commit_chains, detect_chains, resolve_overlaps, validate_chain,
};
use trailgraph::{
    GraphEdge, NetworkConfig, NodeId, Provenance, RejectionReason, TrailGraph, TrailPoint,
    consolidate, merge_iteration, validate_connectivity,
};

fn provenance(trail_id: &str) -> Vec<Provenance> {
    vec![Provenance {
        trail_id: trail_id.to_string(),
        segment_id: format!("{trail_id}-1"),
        part: None,
    }]
}

/// Add an edge whose geometry runs straight between the two node locations.
fn connect(graph: &mut TrailGraph, source: NodeId, target: NodeId, trail_id: &str) -> usize {
    let geometry = vec![
        graph.node(source).unwrap().location,
        graph.node(target).unwrap().location,
    ];
    add_edge(graph, source, target, geometry, trail_id)
}

fn add_edge(
    graph: &mut TrailGraph,
    source: NodeId,
    target: NodeId,
    geometry: Vec<TrailPoint>,
    trail_id: &str,
) -> usize {
    let id = graph.allocate_edge_id();
    let edge = GraphEdge::new(id, source, target, geometry, provenance(trail_id)).unwrap();
    graph.insert_edge(edge);
    id
}

#[test]
fn test_reversed_edges_swap_gain_and_loss() {
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(8.000, 47.0));
    let b = graph.add_node(TrailPoint::new(8.001, 47.0));
    let c = graph.add_node(TrailPoint::new(8.002, 47.0));

    // a -> b climbs 10 m
    let id = graph.allocate_edge_id();
    let ab = GraphEdge::new(
        id,
        a,
        b,
        vec![TrailPoint::new(8.000, 47.0), TrailPoint::new(8.001, 47.0)],
        provenance("t1"),
    )
    .unwrap()
    .with_metrics(75.8, 10.0, 0.0);
    graph.insert_edge(ab);

    // c -> b descends 20 m, so b -> c climbs 20 m
    let id = graph.allocate_edge_id();
    let cb = GraphEdge::new(
        id,
        c,
        b,
        vec![TrailPoint::new(8.002, 47.0), TrailPoint::new(8.001, 47.0)],
        provenance("t2"),
    )
    .unwrap()
    .with_metrics(75.8, 0.0, 20.0);
    graph.insert_edge(cb);

    let report = consolidate(&mut graph, &NetworkConfig::default());
    assert_eq!(report.chains_merged, 1);
    assert_eq!(graph.edge_count(), 1);

    let merged = graph.edges().next().unwrap();
    assert_eq!((merged.source, merged.target), (a, c));
    assert_eq!(merged.elevation_gain, 30.0);
    assert_eq!(merged.elevation_loss, 0.0);
    assert!((merged.length_meters - 151.6).abs() < 1e-9);
    assert_eq!(merged.trail_ids().collect::<Vec<_>>(), vec!["t1", "t2"]);
    assert_eq!(merged.geometry.len(), 3);
    assert!(!graph.contains_node(b));
}

#[test]
fn test_discontinuous_chain_is_rejected() {
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(8.000, 47.0));
    let b = graph.add_node(TrailPoint::new(8.001, 47.0));
    let c = graph.add_node(TrailPoint::new(8.002, 47.0));
    connect(&mut graph, a, b, "t1");
    // Geometry starts ~15 m away from node b
    add_edge(
        &mut graph,
        b,
        c,
        vec![TrailPoint::new(8.0012, 47.0), TrailPoint::new(8.002, 47.0)],
        "t2",
    );

    let config = NetworkConfig::default();
    let detection = detect_chains(&graph, &config);
    assert_eq!(detection.candidates.len(), 1);

    let rejected = validate_chain(&graph, &detection.candidates[0], &config).unwrap_err();
    assert!(matches!(rejected, RejectionReason::Discontinuous { gap_meters } if gap_meters > 10.0));

    let report = consolidate(&mut graph, &config);
    assert_eq!(report.chains_merged, 0);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(graph.edge_count(), 2);
}

#[test]
fn test_self_crossing_chain_is_rejected() {
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(8.000, 47.000));
    let b = graph.add_node(TrailPoint::new(8.002, 47.000));
    let c = graph.add_node(TrailPoint::new(8.002, 47.001));
    let d = graph.add_node(TrailPoint::new(8.001, 46.999));
    connect(&mut graph, a, b, "t1");
    connect(&mut graph, b, c, "t2");
    // Back across the first edge
    connect(&mut graph, c, d, "t3");

    let config = NetworkConfig::default();
    let outcome = merge_iteration(&mut graph, &config);
    assert_eq!(outcome.chains_merged, 0);
    assert_eq!(outcome.rejected[0].reason, RejectionReason::NotSimple);

    let connectivity = validate_connectivity(&graph, None);
    assert_eq!(connectivity.unexpected_through_nodes, 2);
    assert!(!connectivity.is_healthy());
}

#[test]
fn test_chain_ending_at_branch_is_merged_up_to_it() {
    // a - b - hub, with hub also reaching x and y
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(8.000, 47.000));
    let b = graph.add_node(TrailPoint::new(8.001, 47.000));
    let hub = graph.add_node(TrailPoint::new(8.002, 47.000));
    let x = graph.add_node(TrailPoint::new(8.003, 47.000));
    let y = graph.add_node(TrailPoint::new(8.002, 47.001));
    connect(&mut graph, a, b, "t1");
    connect(&mut graph, b, hub, "t2");
    connect(&mut graph, hub, x, "t3");
    connect(&mut graph, hub, y, "t4");

    let report = consolidate(&mut graph, &NetworkConfig::default());
    assert_eq!(report.chains_merged, 1);
    assert_eq!(report.bridges_absorbed, 1);
    assert_eq!(report.nodes_removed, 1);
    assert_eq!(graph.edge_count(), 3);
    assert_eq!(graph.degree(hub), 3);
    assert!(graph.nodes().all(|n| n.degree != 2));
}

fn parallel_chain(edges: Vec<usize>, lat: f64, to_lng: f64) -> ValidatedChain {
    let geometry = vec![TrailPoint::new(8.000, lat), TrailPoint::new(to_lng, lat)];
    let length_meters = trailgraph::geo_utils::polyline_length(&geometry);
    ValidatedChain {
        chain: Chain {
            start: edges[0] * 10,
            end: edges[0] * 10 + 1,
            reversed: vec![false; edges.len()],
            edges,
            interior_nodes: vec![],
            length_meters,
            truncated: false,
        },
        geometry,
    }
}

#[test]
fn test_overlapping_chains_keep_the_longer() {
    let config = NetworkConfig::default();
    // ~300 m and ~225 m running 1 m apart
    let long = parallel_chain(vec![1, 2], 47.0, 8.004);
    let short = parallel_chain(vec![3, 4], 47.000009, 8.003);
    // Far away, untouched
    let other = parallel_chain(vec![5, 6], 47.01, 8.003);

    let (accepted, rejected) = resolve_overlaps(vec![short, long, other], &config);
    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[0].chain.edges, vec![1, 2]);
    assert_eq!(accepted[1].chain.edges, vec![5, 6]);
    assert_eq!(rejected.len(), 1);
    assert!(matches!(
        rejected[0].reason,
        RejectionReason::Overlap { overlap_meters } if overlap_meters > 100.0
    ));
}

#[test]
fn test_chains_sharing_an_edge_keep_the_longer() {
    let config = NetworkConfig::default();
    let long = parallel_chain(vec![1, 2, 3], 47.0, 8.004);
    let short = parallel_chain(vec![3, 4], 47.01, 8.002);

    let (accepted, rejected) = resolve_overlaps(vec![short, long], &config);
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].chain.edges, vec![1, 2, 3]);
    assert_eq!(rejected[0].reason, RejectionReason::SharedEdge);
}

#[test]
fn test_commit_is_a_single_edit() {
    let mut graph = TrailGraph::new();
    let nodes: Vec<NodeId> = (0..4)
        .map(|i| graph.add_node(TrailPoint::new(8.0 + i as f64 * 0.001, 47.0)))
        .collect();
    for w in nodes.windows(2) {
        connect(&mut graph, w[0], w[1], "t");
    }

    let config = NetworkConfig::default();
    let detection = detect_chains(&graph, &config);
    let validated: Vec<ValidatedChain> = detection
        .candidates
        .iter()
        .map(|c| validate_chain(&graph, c, &config).unwrap())
        .collect();
    let summary = commit_chains(&mut graph, &validated);

    assert_eq!(summary.chains_committed, 1);
    assert_eq!(summary.edges_removed, 3);
    assert_eq!(summary.nodes_removed, 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_isolated_cycle_is_reported_as_loop() {
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(8.000, 47.000));
    let b = graph.add_node(TrailPoint::new(8.001, 47.000));
    let c = graph.add_node(TrailPoint::new(8.001, 47.001));
    connect(&mut graph, a, b, "t1");
    connect(&mut graph, b, c, "t2");
    connect(&mut graph, c, a, "t3");

    let report = consolidate(&mut graph, &NetworkConfig::default());
    assert_eq!(report.chains_merged, 0);
    assert_eq!(report.unresolved_loops, vec![vec![0, 1, 2]]);
    assert!(report.converged);
}

#[test]
fn test_long_chain_reaches_a_single_edge() {
    // 150 edges of ~76 m in a straight line, merged two at a time
    let mut graph = TrailGraph::new();
    let nodes: Vec<NodeId> = (0..=150)
        .map(|i| graph.add_node(TrailPoint::new(8.0 + i as f64 * 0.001, 47.0)))
        .collect();
    for w in nodes.windows(2) {
        connect(&mut graph, w[0], w[1], "t");
    }
    let total: f64 = graph.edges().map(|e| e.length_meters).sum();

    let config = NetworkConfig {
        max_chain_length: 2,
        ..Default::default()
    };
    let report = consolidate(&mut graph, &config);

    assert!(report.converged);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.node_count(), 2);
    assert_eq!(report.edges_before, 150);
    assert_eq!(report.edges_after, 1);
    assert!(report.iterations > 50);
    assert!(graph.nodes().all(|n| n.degree != 2));

    let merged = graph.edges().next().unwrap();
    assert!((merged.length_meters - total).abs() < 1e-6);
    assert_eq!(merged.provenance.len(), 150);
}

#[test]
fn test_loop_longer_than_chain_bound_is_left_alone() {
    // a - hub - b, with a 20-edge circular loop hanging off hub
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::new(7.998, 47.0));
    let hub = graph.add_node(TrailPoint::new(8.000, 47.0));
    let b = graph.add_node(TrailPoint::new(8.002, 47.0));
    connect(&mut graph, a, hub, "main");
    connect(&mut graph, hub, b, "main");

    let radius = 0.0015;
    let mut ring = vec![hub];
    for k in 1..20 {
        let angle = (-90.0 + 18.0 * k as f64).to_radians();
        ring.push(graph.add_node(TrailPoint::new(
            8.0 + radius * angle.cos(),
            47.0 + radius + radius * angle.sin(),
        )));
    }
    let mut loop_edges = Vec::new();
    for k in 0..20 {
        loop_edges.push(connect(&mut graph, ring[k], ring[(k + 1) % 20], "lollipop"));
    }
    assert_eq!(graph.degree(hub), 4);

    let config = NetworkConfig {
        max_chain_length: 5,
        ..Default::default()
    };
    let report = consolidate(&mut graph, &config);

    assert_eq!(report.chains_merged, 0);
    assert_eq!(report.iterations, 1);
    assert_eq!(graph.edge_count(), 22);
    assert!(loop_edges.iter().all(|&id| graph.edge(id).is_some()));

    assert_eq!(report.unresolved_loops.len(), 1);
    let mut unresolved = report.unresolved_loops[0].clone();
    unresolved.sort_unstable();
    assert_eq!(unresolved, loop_edges);
}

#[test]
fn test_merged_edge_sums_length_3d() {
    let mut graph = TrailGraph::new();
    let a = graph.add_node(TrailPoint::with_elevation(8.000, 47.0, 400.0));
    let b = graph.add_node(TrailPoint::with_elevation(8.001, 47.0, 440.0));
    let c = graph.add_node(TrailPoint::with_elevation(8.002, 47.0, 420.0));
    let ab = connect(&mut graph, a, b, "t1");
    let bc = connect(&mut graph, b, c, "t2");
    let expected =
        graph.edge(ab).unwrap().length_3d_meters + graph.edge(bc).unwrap().length_3d_meters;

    consolidate(&mut graph, &NetworkConfig::default());

    assert_eq!(graph.edge_count(), 1);
    let merged = graph.edges().next().unwrap();
    assert!((merged.length_3d_meters - expected).abs() < 1e-9);
    assert!(merged.length_3d_meters > merged.length_meters);
}
