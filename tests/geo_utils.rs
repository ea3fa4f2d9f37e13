//! Tests for geo_utils module

use trailgraph::geo_utils::*;
use trailgraph::{Bounds, TrailPoint};

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

#[test]
fn test_haversine_distance_same_point() {
    let p = TrailPoint::new(-0.1278, 51.5074);
    assert_eq!(haversine_distance(&p, &p), 0.0);
}

#[test]
fn test_haversine_distance_known_value() {
    // London to Paris is approximately 344 km
    let london = TrailPoint::new(-0.1278, 51.5074);
    let paris = TrailPoint::new(2.3522, 48.8566);
    let dist = haversine_distance(&london, &paris);
    assert!(approx_eq(dist, 343_560.0, 5000.0));
}

#[test]
fn test_polyline_length_sums_segments() {
    let line = vec![
        TrailPoint::new(8.000, 47.0),
        TrailPoint::new(8.001, 47.0),
        TrailPoint::new(8.002, 47.0),
    ];
    let direct = haversine_distance(&line[0], &line[2]);
    assert!(approx_eq(polyline_length(&line), direct, 0.01));
    assert_eq!(polyline_length(&line[..1]), 0.0);
}

#[test]
fn test_compute_bounds() {
    let track = vec![
        TrailPoint::new(-0.13, 51.50),
        TrailPoint::new(-0.12, 51.51),
        TrailPoint::new(-0.125, 51.505),
    ];
    let bounds = compute_bounds(&track);
    assert_eq!(bounds.min_lat, 51.50);
    assert_eq!(bounds.max_lat, 51.51);
    assert_eq!(bounds.min_lng, -0.13);
    assert_eq!(bounds.max_lng, -0.12);
}

#[test]
fn test_bounds_intersect_after_expansion() {
    let a = Bounds {
        min_lat: 47.0,
        max_lat: 47.001,
        min_lng: 8.0,
        max_lng: 8.001,
    };
    // ~7.6 m east of `a`
    let b = Bounds {
        min_lat: 47.0,
        max_lat: 47.001,
        min_lng: 8.0011,
        max_lng: 8.002,
    };
    assert!(!a.intersects(&b));
    assert!(!a.expand_meters(5.0).intersects(&b));
    assert!(a.expand_meters(10.0).intersects(&b));
}

#[test]
fn test_length_3d_includes_climb() {
    let flat = vec![TrailPoint::new(8.000, 47.0), TrailPoint::new(8.001, 47.0)];
    let steep = vec![
        TrailPoint::with_elevation(8.000, 47.0, 500.0),
        TrailPoint::with_elevation(8.001, 47.0, 550.0),
    ];
    let horizontal = polyline_length(&steep);

    assert_eq!(polyline_length_3d(&flat), polyline_length(&flat));
    assert!(approx_eq(
        polyline_length_3d(&steep),
        (horizontal * horizontal + 2500.0).sqrt(),
        1e-9
    ));
    // Missing elevation on one end counts as flat
    let partial = vec![steep[0], TrailPoint::new(8.001, 47.0)];
    assert_eq!(polyline_length_3d(&partial), horizontal);
}

#[test]
fn test_meters_to_degrees_grows_with_latitude() {
    let equator = meters_to_degrees(1000.0, 0.0);
    let north = meters_to_degrees(1000.0, 60.0);
    assert!(approx_eq(equator, 1000.0 / METERS_PER_DEG_LAT, 1e-9));
    assert!(approx_eq(north, 2.0 * equator, 1e-6));
}

#[test]
fn test_project_onto_polyline_reports_distance_along() {
    let line = vec![TrailPoint::new(8.000, 47.0), TrailPoint::new(8.004, 47.0)];
    let total = polyline_length(&line);
    // Slightly north of the quarter point
    let query = TrailPoint::new(8.001, 47.00001);

    let pos = project_onto_polyline(&line, &query).unwrap();
    assert!(approx_eq(pos.distance_along, total / 4.0, 0.5));
    assert!(approx_eq(pos.distance_to_line, 1.11, 0.05));
    assert!(project_onto_polyline(&line[..1], &query).is_none());
}

#[test]
fn test_slice_polyline_keeps_interior_vertices() {
    let line = vec![
        TrailPoint::new(8.000, 47.0),
        TrailPoint::new(8.001, 47.0),
        TrailPoint::new(8.002, 47.0),
        TrailPoint::new(8.003, 47.0),
    ];
    let total = polyline_length(&line);
    let from = position_at_distance(&line, total * 0.1);
    let to = position_at_distance(&line, total * 0.9);

    let sliced = slice_polyline(&line, &from, &to);
    assert_eq!(sliced.len(), 4);
    assert!(approx_eq(polyline_length(&sliced), total * 0.8, 0.01));
}

#[test]
fn test_dedup_consecutive() {
    let mut points = vec![
        TrailPoint::new(8.0, 47.0),
        TrailPoint::new(8.0, 47.0),
        TrailPoint::new(8.001, 47.0),
        TrailPoint::new(8.0, 47.0),
    ];
    dedup_consecutive(&mut points);
    assert_eq!(points.len(), 3);
}
