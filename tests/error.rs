//! Tests for error module

use trailgraph::error::{OptionExt, TrailGraphError};
use trailgraph::{GraphEdge, NetworkConfig, TrailPoint, build_network};

#[test]
fn test_error_display() {
    let err = TrailGraphError::InvalidConfig {
        parameter: "node_tolerance_meters",
        value: -1.0,
        reason: "must not be negative",
    };
    let message = err.to_string();
    assert!(message.contains("node_tolerance_meters"));
    assert!(message.contains("-1"));
}

#[test]
fn test_option_ext() {
    let none: Option<i32> = None;
    let result = none.ok_or_invalid_trail("t-9", "no points");
    assert!(matches!(
        result,
        Err(TrailGraphError::InvalidTrail { ref trail_id, .. }) if trail_id == "t-9"
    ));
    assert_eq!(Some(3).ok_or_invalid_trail("t-9", "unused"), Ok(3));
}

#[test]
fn test_invalid_config_stops_build() {
    let config = NetworkConfig {
        chain_join_tolerance_meters: f64::NAN,
        ..Default::default()
    };
    let result = build_network(&[], &config);
    assert!(matches!(
        result,
        Err(TrailGraphError::InvalidConfig {
            parameter: "chain_join_tolerance_meters",
            ..
        })
    ));
}

#[test]
fn test_self_loop_edge_is_an_error() {
    let geometry = vec![TrailPoint::new(8.0, 47.0), TrailPoint::new(8.001, 47.0)];
    let err = GraphEdge::new(0, 5, 5, geometry, vec![]).unwrap_err();
    assert!(matches!(
        err,
        TrailGraphError::InvalidEdge {
            source_node: 5,
            target_node: 5,
            ..
        }
    ));
}
