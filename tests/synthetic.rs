//! Pipeline checks on generated grid networks

#![cfg(feature = "synthetic")]

use trailgraph::synthetic::SyntheticScenario;
use trailgraph::{NetworkConfig, build_network};

#[test]
fn test_grid_network_has_expected_topology() {
    let synthetic = SyntheticScenario::grid(4, 42).generate();
    let network = build_network(&synthetic.trails, &NetworkConfig::default()).unwrap();
    let histogram = &network.connectivity.degree_histogram;

    assert_eq!(
        histogram.get(&4).copied().unwrap_or(0),
        synthetic.metadata.expected_crossings
    );
    assert_eq!(
        histogram.get(&3).copied().unwrap_or(0),
        synthetic.metadata.expected_junctions
    );
    assert_eq!(histogram.get(&2), None);
    assert!(network.consolidation.converged);
    assert!(network.connectivity.is_healthy());
}

#[test]
fn test_fragments_merge_back_into_grid_edges() {
    let scenario = SyntheticScenario {
        spur_count: 0,
        ..SyntheticScenario::grid(3, 7)
    };
    let synthetic = scenario.generate();
    let network = build_network(&synthetic.trails, &NetworkConfig::default()).unwrap();

    // Each of the 6 lines runs through 3 crossings: 4 edges per line
    assert_eq!(network.graph.edge_count(), 24);
    assert!(network.consolidation.chains_merged > 0);

    let trail_length: f64 = synthetic.trails.iter().map(|t| t.length_meters).sum();
    assert!((network.graph.total_length_meters() - trail_length).abs() < 0.01);
}
