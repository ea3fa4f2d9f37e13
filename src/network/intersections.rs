//! Pairwise trail intersection detection.
//!
//! Candidate pairs come from an R-tree of trail envelopes. Each pair is then
//! tested in a shared local planar projection for:
//! - exact segment crossings and touches
//! - collinear overlaps (both ends of the shared run)
//! - near misses, where one trail ends within tolerance of the other
//!
//! Pairs are independent and run in parallel under the `parallel` feature.
//! Points from different pairs that land within tolerance of each other are
//! then collapsed into one point shared by all the trails involved.

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use log::{debug, info, warn};
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::progress::{BuildProgressCallback, NoopProgress};
use super::rtree::{NodeIndex, bounds_envelope, build_trail_rtree};
use crate::geo_utils::{LocalProjection, closest_on_segment};
use crate::{NetworkConfig, Trail, TrailPoint};

/// One trail meeting at an intersection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailContact {
    pub trail_id: String,
    /// The point lies away from both ends of this trail
    pub interior: bool,
}

impl TrailContact {
    pub fn new(trail_id: impl Into<String>, interior: bool) -> Self {
        Self {
            trail_id: trail_id.into(),
            interior,
        }
    }
}

/// A location where trails cross or touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionPoint {
    pub location: TrailPoint,
    /// Trails meeting here in the order they were found: the producing pair,
    /// then any trail whose own crossing collapsed onto this point
    pub trails: Vec<TrailContact>,
    /// Tolerance the point was detected with
    pub tolerance_meters: f64,
}

impl IntersectionPoint {
    pub fn trail_ids(&self) -> impl Iterator<Item = &str> {
        self.trails.iter().map(|c| c.trail_id.as_str())
    }

    /// Whether this point should cut the given trail.
    pub fn is_interior_to(&self, trail_id: &str) -> bool {
        self.trails
            .iter()
            .any(|c| c.trail_id == trail_id && c.interior)
    }

    /// Take over the trails of a point found at (nearly) the same location.
    fn absorb(&mut self, other: IntersectionPoint) {
        for contact in other.trails {
            match self.trails.iter_mut().find(|c| c.trail_id == contact.trail_id) {
                Some(existing) => existing.interior |= contact.interior,
                None => self.trails.push(contact),
            }
        }
    }
}

/// Find all points where trails cross, touch or nearly touch.
///
/// Trails shorter than `min_trail_length_meters` are ignored. Points at the
/// ends of both trails are dropped, since those trails simply meet and are
/// joined later by node matching. Pairs whose geometry cannot be tested are
/// logged and skipped.
pub fn detect_intersections(trails: &[Trail], config: &NetworkConfig) -> Vec<IntersectionPoint> {
    detect_intersections_with_progress(trails, config, &NoopProgress)
}

/// [`detect_intersections`] reporting one progress item per candidate pair.
pub fn detect_intersections_with_progress(
    trails: &[Trail],
    config: &NetworkConfig,
    progress: &dyn BuildProgressCallback,
) -> Vec<IntersectionPoint> {
    let tolerance = config.intersection_tolerance_meters;

    let participants: Vec<usize> = trails
        .iter()
        .enumerate()
        .filter(|(_, t)| t.length_meters >= config.min_trail_length_meters)
        .map(|(i, _)| i)
        .collect();

    if participants.len() < trails.len() {
        debug!(
            "[Intersections] Ignoring {} trails shorter than {:.1}m",
            trails.len() - participants.len(),
            config.min_trail_length_meters
        );
    }
    if participants.len() < 2 {
        return Vec::new();
    }

    let rtree = build_trail_rtree(trails, &participants, tolerance);

    let mut candidate_pairs: Vec<(usize, usize)> = Vec::new();
    for &i in &participants {
        let envelope = bounds_envelope(&trails[i].bounds.expand_meters(tolerance));
        for other in rtree.locate_in_envelope_intersecting(&envelope) {
            if other.idx > i {
                candidate_pairs.push((i, other.idx));
            }
        }
    }
    candidate_pairs.sort_unstable();

    info!(
        "[Intersections] {} trails, {} candidate pairs",
        participants.len(),
        candidate_pairs.len()
    );
    progress.on_phase(
        super::BuildPhase::DetectingIntersections,
        candidate_pairs.len() as u32,
    );

    // One projection for the whole region keeps every pair in the same frame.
    let region = participants
        .iter()
        .map(|&i| trails[i].bounds)
        .reduce(|a, b| a.union(&b))
        .unwrap_or(trails[participants[0]].bounds);
    let projection = LocalProjection::for_bounds(&region);

    #[cfg(feature = "parallel")]
    let per_pair: Vec<Vec<IntersectionPoint>> = candidate_pairs
        .into_par_iter()
        .filter_map(|(i, j)| {
            let outcome = intersect_pair(&trails[i], &trails[j], &projection, tolerance);
            progress.on_progress();
            skip_failed_pair(&trails[i], &trails[j], outcome)
        })
        .collect();

    #[cfg(not(feature = "parallel"))]
    let per_pair: Vec<Vec<IntersectionPoint>> = candidate_pairs
        .into_iter()
        .filter_map(|(i, j)| {
            let outcome = intersect_pair(&trails[i], &trails[j], &projection, tolerance);
            progress.on_progress();
            skip_failed_pair(&trails[i], &trails[j], outcome)
        })
        .collect();

    let found: Vec<IntersectionPoint> = per_pair.into_iter().flatten().collect();
    let found_count = found.len();
    let intersections = collapse_nearby(found, tolerance);
    info!(
        "[Intersections] Found {} intersection points ({} before collapsing)",
        intersections.len(),
        found_count
    );
    intersections
}

/// Merge points closer than `tolerance` meters, keeping the first location.
fn collapse_nearby(points: Vec<IntersectionPoint>, tolerance: f64) -> Vec<IntersectionPoint> {
    let mut index = NodeIndex::new(tolerance);
    let mut collapsed: Vec<IntersectionPoint> = Vec::with_capacity(points.len());

    for point in points {
        match index.find(&point.location) {
            Some(idx) => collapsed[idx].absorb(point),
            None => {
                index.insert(collapsed.len(), &point.location);
                collapsed.push(point);
            }
        }
    }

    collapsed
}

fn skip_failed_pair(
    a: &Trail,
    b: &Trail,
    outcome: Result<Vec<IntersectionPoint>, &'static str>,
) -> Option<Vec<IntersectionPoint>> {
    match outcome {
        Ok(points) if points.is_empty() => None,
        Ok(points) => Some(points),
        Err(reason) => {
            warn!(
                "[Intersections] Skipping pair '{}' / '{}': {}",
                a.id, b.id, reason
            );
            None
        }
    }
}

type SegmentEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn to_lines(coords: &[Coord<f64>]) -> Vec<Line<f64>> {
    coords.windows(2).map(|w| Line::new(w[0], w[1])).collect()
}

/// Intersection points between two trails, deduplicated within tolerance.
pub fn intersect_pair(
    a: &Trail,
    b: &Trail,
    projection: &LocalProjection,
    tolerance: f64,
) -> Result<Vec<IntersectionPoint>, &'static str> {
    if !a.bounds.expand_meters(tolerance).intersects(&b.bounds) {
        return Ok(Vec::new());
    }

    let local_a: Vec<Coord<f64>> = a.points.iter().map(|p| projection.to_local(p)).collect();
    let local_b: Vec<Coord<f64>> = b.points.iter().map(|p| projection.to_local(p)).collect();
    if local_a
        .iter()
        .chain(local_b.iter())
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err("non-finite projected coordinates");
    }

    let lines_a = to_lines(&local_a);
    let lines_b = to_lines(&local_b);

    let tree_b: RTree<SegmentEnvelope> = RTree::bulk_load(
        lines_b
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

    let mut raw: Vec<Coord<f64>> = Vec::new();

    for line in &lines_a {
        let envelope = rstar::AABB::from_corners(
            [line.start.x, line.start.y],
            [line.end.x, line.end.y],
        );
        for candidate in tree_b.locate_in_envelope_intersecting(&envelope) {
            match line_intersection(*line, lines_b[candidate.data]) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => raw.push(intersection),
                Some(LineIntersection::Collinear { intersection }) => {
                    raw.push(intersection.start);
                    raw.push(intersection.end);
                }
                None => {}
            }
        }
    }

    // Near misses: a trail ending just short of (or just past) the other one.
    for (ends, other) in [
        (&local_a, &lines_b),
        (&local_b, &lines_a),
    ] {
        for end in [ends[0], ends[ends.len() - 1]] {
            if let Some((closest, distance)) = closest_on_lines(other, end) {
                if distance > 0.0 && distance <= tolerance {
                    raw.push(closest);
                }
            }
        }
    }

    let mut points: Vec<IntersectionPoint> = Vec::new();
    let mut kept: Vec<Coord<f64>> = Vec::new();

    for c in raw {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err("non-finite intersection coordinate");
        }
        if kept.iter().any(|k| planar_distance(*k, c) <= tolerance) {
            continue;
        }
        kept.push(c);

        let interior_to_first = is_interior(&local_a, c, tolerance);
        let interior_to_second = is_interior(&local_b, c, tolerance);
        if !interior_to_first && !interior_to_second {
            continue;
        }

        points.push(IntersectionPoint {
            location: projection.to_geographic(c, None),
            trails: vec![
                TrailContact::new(&a.id, interior_to_first),
                TrailContact::new(&b.id, interior_to_second),
            ],
            tolerance_meters: tolerance,
        });
    }

    Ok(points)
}

fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Closest point on a set of lines and its distance.
fn closest_on_lines(lines: &[Line<f64>], q: Coord<f64>) -> Option<(Coord<f64>, f64)> {
    lines
        .iter()
        .map(|l| {
            let (t, d) = closest_on_segment(l.start, l.end, q);
            let p = Coord {
                x: l.start.x + t * (l.end.x - l.start.x),
                y: l.start.y + t * (l.end.y - l.start.y),
            };
            (p, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Whether `q` projects onto the polyline more than `tolerance` from both ends,
/// measured along the line.
fn is_interior(line: &[Coord<f64>], q: Coord<f64>, tolerance: f64) -> bool {
    let mut total = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for w in line.windows(2) {
        let len = planar_distance(w[0], w[1]);
        let (t, d) = closest_on_segment(w[0], w[1], q);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((total + t * len, d));
        }
        total += len;
    }

    match best {
        Some((along, _)) => along > tolerance && along < total - tolerance,
        None => false,
    }
}
