//! Geographic utilities: distances, bounds, local metric projection and
//! the polyline operations the network stages are built from (projection,
//! slicing, overlap measurement, simple-line checks).

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::{Bounds, ElevationStats, TrailPoint};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters per degree of latitude (approximately constant).
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Local coordinates closer than this (meters) are treated as identical.
const COINCIDENT_EPSILON: f64 = 1e-6;

/// Sampling step (meters) when measuring how much of one line runs along another.
const OVERLAP_SAMPLE_SPACING: f64 = 5.0;

/// Great-circle distance between two points in meters (2D, elevation ignored).
pub fn haversine_distance(p1: &TrailPoint, p2: &TrailPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[TrailPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Bounding box of a set of points. Empty input yields an all-zero box.
pub fn compute_bounds(points: &[TrailPoint]) -> Bounds {
    Bounds::from_points(points).unwrap_or(Bounds {
        min_lat: 0.0,
        max_lat: 0.0,
        min_lng: 0.0,
        max_lng: 0.0,
    })
}

/// Convert a distance in meters to degrees of longitude at `latitude`.
///
/// Degrees of longitude shrink towards the poles, so this is also a safe
/// (never too small) conversion for latitude degrees.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_deg = METERS_PER_DEG_LAT * latitude.to_radians().cos();
    if meters_per_deg.abs() < 1e-10 {
        return meters / METERS_PER_DEG_LAT;
    }
    meters / meters_per_deg
}

/// Distance between two points along the surface and in height.
///
/// The height difference is ignored unless both points carry elevation.
pub fn distance_3d(p1: &TrailPoint, p2: &TrailPoint) -> f64 {
    let horizontal = haversine_distance(p1, p2);
    match (p1.elevation, p2.elevation) {
        (Some(e1), Some(e2)) => horizontal.hypot(e2 - e1),
        _ => horizontal,
    }
}

/// Total length of a polyline in meters, including climbs and descents.
pub fn polyline_length_3d(points: &[TrailPoint]) -> f64 {
    points.windows(2).map(|w| distance_3d(&w[0], &w[1])).sum()
}

/// Elevation gain/loss and range of a polyline.
///
/// Returns `None` unless every point carries an elevation.
pub fn elevation_stats(points: &[TrailPoint]) -> Option<ElevationStats> {
    let elevations: Vec<f64> = points
        .iter()
        .map(|p| p.elevation)
        .collect::<Option<Vec<f64>>>()?;
    let first = *elevations.first()?;

    let mut stats = ElevationStats {
        gain: 0.0,
        loss: 0.0,
        min: first,
        max: first,
    };
    for w in elevations.windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            stats.gain += delta;
        } else {
            stats.loss -= delta;
        }
    }
    for &e in &elevations {
        stats.min = stats.min.min(e);
        stats.max = stats.max.max(e);
    }

    Some(stats)
}

/// Linear interpolation between two points, including elevation when both ends have one.
pub fn interpolate(a: &TrailPoint, b: &TrailPoint, fraction: f64) -> TrailPoint {
    if fraction <= 0.0 {
        return *a;
    }
    if fraction >= 1.0 {
        return *b;
    }
    TrailPoint {
        longitude: a.longitude + fraction * (b.longitude - a.longitude),
        latitude: a.latitude + fraction * (b.latitude - a.latitude),
        elevation: match (a.elevation, b.elevation) {
            (Some(ea), Some(eb)) => Some(ea + fraction * (eb - ea)),
            _ => None,
        },
    }
}

/// Whether two points occupy the same horizontal position.
pub fn same_position(a: &TrailPoint, b: &TrailPoint) -> bool {
    a.longitude == b.longitude && a.latitude == b.latitude
}

// ============================================================================
// Local Metric Projection
// ============================================================================

/// Equirectangular projection around an origin, giving planar coordinates in meters.
///
/// Accurate to well under a meter across a single trail region, which is all
/// the intersection and projection math needs.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin_lat: f64,
    origin_lng: f64,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: &TrailPoint) -> Self {
        Self {
            origin_lat: origin.latitude,
            origin_lng: origin.longitude,
            cos_lat: origin.latitude.to_radians().cos(),
        }
    }

    /// Projection centered on a bounding box.
    pub fn for_bounds(bounds: &Bounds) -> Self {
        Self::new(&bounds.center())
    }

    pub fn to_local(&self, p: &TrailPoint) -> Coord<f64> {
        Coord {
            x: (p.longitude - self.origin_lng).to_radians() * EARTH_RADIUS_METERS * self.cos_lat,
            y: (p.latitude - self.origin_lat).to_radians() * EARTH_RADIUS_METERS,
        }
    }

    pub fn to_geographic(&self, c: Coord<f64>, elevation: Option<f64>) -> TrailPoint {
        let cos_lat = if self.cos_lat.abs() < 1e-12 {
            1e-12
        } else {
            self.cos_lat
        };
        TrailPoint {
            longitude: self.origin_lng + (c.x / (EARTH_RADIUS_METERS * cos_lat)).to_degrees(),
            latitude: self.origin_lat + (c.y / EARTH_RADIUS_METERS).to_degrees(),
            elevation,
        }
    }
}

/// Closest point on segment `a`-`b` to `q`: (fraction along the segment, distance).
pub(crate) fn closest_on_segment(a: Coord<f64>, b: Coord<f64>, q: Coord<f64>) -> (f64, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < COINCIDENT_EPSILON * COINCIDENT_EPSILON {
        0.0
    } else {
        (((q.x - a.x) * dx + (q.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let px = a.x + t * dx - q.x;
    let py = a.y + t * dy - q.y;
    (t, (px * px + py * py).sqrt())
}

// ============================================================================
// Polyline Positions
// ============================================================================

/// A position along a polyline, expressed both structurally and metrically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylinePosition {
    /// Index of the polyline segment (`points[i]`..`points[i + 1]`).
    pub segment_index: usize,
    /// Fraction along that segment, 0.0..=1.0.
    pub fraction: f64,
    /// Distance from the polyline start in meters.
    pub distance_along: f64,
    /// Distance from the projected query point to the line in meters.
    pub distance_to_line: f64,
}

impl PolylinePosition {
    pub fn start() -> Self {
        Self {
            segment_index: 0,
            fraction: 0.0,
            distance_along: 0.0,
            distance_to_line: 0.0,
        }
    }

    pub fn end(points: &[TrailPoint]) -> Self {
        Self {
            segment_index: points.len().saturating_sub(2),
            fraction: 1.0,
            distance_along: polyline_length(points),
            distance_to_line: 0.0,
        }
    }

    /// The geographic point at this position.
    pub fn point(&self, points: &[TrailPoint]) -> TrailPoint {
        match (points.get(self.segment_index), points.get(self.segment_index + 1)) {
            (Some(a), Some(b)) => interpolate(a, b, self.fraction),
            (Some(a), None) => *a,
            _ => TrailPoint::new(0.0, 0.0),
        }
    }
}

/// Project a point onto a polyline, returning the closest position.
///
/// Returns `None` for polylines with fewer than two points.
pub fn project_onto_polyline(points: &[TrailPoint], query: &TrailPoint) -> Option<PolylinePosition> {
    if points.len() < 2 {
        return None;
    }

    let projection = LocalProjection::new(query);
    let q = projection.to_local(query);

    let mut best: Option<PolylinePosition> = None;
    let mut along = 0.0;

    for (i, w) in points.windows(2).enumerate() {
        let a = projection.to_local(&w[0]);
        let b = projection.to_local(&w[1]);
        let seg_len = haversine_distance(&w[0], &w[1]);
        let (t, dist) = closest_on_segment(a, b, q);

        if best.is_none_or(|current| dist < current.distance_to_line) {
            best = Some(PolylinePosition {
                segment_index: i,
                fraction: t,
                distance_along: along + t * seg_len,
                distance_to_line: dist,
            });
        }
        along += seg_len;
    }

    best
}

/// Distance in meters from a point to the closest point of a polyline.
pub fn distance_to_polyline(points: &[TrailPoint], query: &TrailPoint) -> f64 {
    project_onto_polyline(points, query)
        .map(|p| p.distance_to_line)
        .unwrap_or(f64::INFINITY)
}

/// The position `distance` meters along a polyline (clamped to its ends).
pub fn position_at_distance(points: &[TrailPoint], distance: f64) -> PolylinePosition {
    if points.len() < 2 || distance <= 0.0 {
        return PolylinePosition::start();
    }

    let mut along = 0.0;
    for (i, w) in points.windows(2).enumerate() {
        let seg_len = haversine_distance(&w[0], &w[1]);
        if seg_len > 0.0 && along + seg_len >= distance {
            return PolylinePosition {
                segment_index: i,
                fraction: (distance - along) / seg_len,
                distance_along: distance,
                distance_to_line: 0.0,
            };
        }
        along += seg_len;
    }

    PolylinePosition::end(points)
}

/// Remove consecutive points sharing the same horizontal position.
pub fn dedup_consecutive(points: &mut Vec<TrailPoint>) {
    points.dedup_by(|b, a| same_position(a, b));
}

/// The part of a polyline between two positions (`from` must not lie after `to`).
///
/// Cut points are interpolated, so elevation is carried through when present.
pub fn slice_polyline(
    points: &[TrailPoint],
    from: &PolylinePosition,
    to: &PolylinePosition,
) -> Vec<TrailPoint> {
    let mut sliced = Vec::with_capacity(to.segment_index.saturating_sub(from.segment_index) + 2);
    sliced.push(from.point(points));
    for idx in (from.segment_index + 1)..=to.segment_index {
        if let Some(p) = points.get(idx) {
            sliced.push(*p);
        }
    }
    sliced.push(to.point(points));
    dedup_consecutive(&mut sliced);
    sliced
}

// ============================================================================
// Line Relations
// ============================================================================

/// Length in meters of the part of `a` running within `tolerance` meters of `b`.
///
/// `a` is sampled every few meters; each sample close to `b` contributes its
/// share of the segment length.
pub fn overlap_length_meters(a: &[TrailPoint], b: &[TrailPoint], tolerance: f64) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut overlap = 0.0;
    for w in a.windows(2) {
        let len = haversine_distance(&w[0], &w[1]);
        if len <= 0.0 {
            continue;
        }
        let samples = ((len / OVERLAP_SAMPLE_SPACING).ceil() as usize).max(1);
        let step = len / samples as f64;
        for k in 0..samples {
            let t = (k as f64 + 0.5) / samples as f64;
            let p = interpolate(&w[0], &w[1], t);
            if distance_to_polyline(b, &p) <= tolerance {
                overlap += step;
            }
        }
    }

    overlap
}

type SegmentEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn line_envelope(line: &Line<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([line.start.x, line.start.y], [line.end.x, line.end.y])
}

/// Whether a polyline is a single simple line: no segment crosses, touches or
/// folds back onto another apart from consecutive segments sharing a vertex.
pub fn is_simple_polyline(points: &[TrailPoint]) -> bool {
    if points.len() < 2 {
        return false;
    }
    if points.len() == 2 {
        return !same_position(&points[0], &points[1]);
    }

    let projection = LocalProjection::for_bounds(&compute_bounds(points));
    let lines: Vec<Line<f64>> = points
        .windows(2)
        .map(|w| Line::new(projection.to_local(&w[0]), projection.to_local(&w[1])))
        .collect();

    let tree: RTree<SegmentEnvelope> = RTree::bulk_load(
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| {
                GeomWithData::new(
                    Rectangle::from_corners([l.start.x, l.start.y], [l.end.x, l.end.y]),
                    i,
                )
            })
            .collect(),
    );

    for (i, line) in lines.iter().enumerate() {
        for candidate in tree.locate_in_envelope_intersecting(&line_envelope(line)) {
            let j = candidate.data;
            if j <= i {
                continue;
            }
            match line_intersection(*line, lines[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if j == i + 1 => {}
                Some(LineIntersection::SinglePoint { .. }) => return false,
                Some(LineIntersection::Collinear { intersection }) => {
                    let dx = intersection.end.x - intersection.start.x;
                    let dy = intersection.end.y - intersection.start.y;
                    if j != i + 1 || (dx * dx + dy * dy).sqrt() > COINCIDENT_EPSILON {
                        return false;
                    }
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Vec<TrailPoint> {
        vec![
            TrailPoint::with_elevation(8.0, 47.0, 100.0),
            TrailPoint::with_elevation(8.001, 47.0, 110.0),
            TrailPoint::with_elevation(8.002, 47.0, 105.0),
        ]
    }

    #[test]
    fn test_local_projection_round_trip() {
        let origin = TrailPoint::new(8.0, 47.0);
        let projection = LocalProjection::new(&origin);
        let p = TrailPoint::new(8.01, 47.01);
        let back = projection.to_geographic(projection.to_local(&p), None);
        assert!((back.longitude - p.longitude).abs() < 1e-9);
        assert!((back.latitude - p.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_projection_matches_haversine() {
        let a = TrailPoint::new(8.0, 47.0);
        let b = TrailPoint::new(8.003, 47.002);
        let projection = LocalProjection::new(&a);
        let lb = projection.to_local(&b);
        let planar = (lb.x * lb.x + lb.y * lb.y).sqrt();
        assert!((planar - haversine_distance(&a, &b)).abs() < 0.5);
    }

    #[test]
    fn test_project_onto_polyline_midpoint() {
        let points = line();
        let query = TrailPoint::new(8.0015, 47.0001);
        let pos = project_onto_polyline(&points, &query).unwrap();
        assert_eq!(pos.segment_index, 1);
        assert!((pos.fraction - 0.5).abs() < 0.01);
        assert!(pos.distance_to_line > 10.0 && pos.distance_to_line < 12.0);
    }

    #[test]
    fn test_slice_interpolates_elevation() {
        let points = line();
        let total = polyline_length(&points);
        let from = position_at_distance(&points, total * 0.25);
        let to = position_at_distance(&points, total * 0.75);
        let sliced = slice_polyline(&points, &from, &to);
        assert_eq!(sliced.len(), 3);
        assert!((sliced[0].elevation.unwrap() - 105.0).abs() < 0.5);
        assert!((sliced[2].elevation.unwrap() - 107.5).abs() < 0.5);
        assert!((polyline_length(&sliced) - total * 0.5).abs() < 0.01);
    }

    #[test]
    fn test_elevation_stats_requires_full_profile() {
        let stats = elevation_stats(&line()).unwrap();
        assert_eq!(stats.gain, 10.0);
        assert_eq!(stats.loss, 5.0);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 110.0);

        let mut partial = line();
        partial[1].elevation = None;
        assert!(elevation_stats(&partial).is_none());
    }

    #[test]
    fn test_simple_polyline_detects_crossing() {
        assert!(is_simple_polyline(&line()));

        let crossing = vec![
            TrailPoint::new(8.0, 47.0),
            TrailPoint::new(8.002, 47.002),
            TrailPoint::new(8.002, 47.0),
            TrailPoint::new(8.0, 47.002),
        ];
        assert!(!is_simple_polyline(&crossing));
    }

    #[test]
    fn test_simple_polyline_detects_fold_back() {
        let folded = vec![
            TrailPoint::new(8.0, 47.0),
            TrailPoint::new(8.002, 47.0),
            TrailPoint::new(8.001, 47.0),
        ];
        assert!(!is_simple_polyline(&folded));
    }

    #[test]
    fn test_overlap_length_parallel_lines() {
        let a = vec![TrailPoint::new(8.0, 47.0), TrailPoint::new(8.01, 47.0)];
        let b = vec![
            TrailPoint::new(8.005, 47.00001),
            TrailPoint::new(8.02, 47.00001),
        ];
        let overlap = overlap_length_meters(&a, &b, 5.0);
        let half = polyline_length(&a) / 2.0;
        assert!((overlap - half).abs() < 10.0, "overlap {overlap} vs {half}");
    }
}
