//! Cutting trails into segments at their interior intersection points.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::intersections::IntersectionPoint;
use crate::geo_utils::{
    PolylinePosition, compute_bounds, elevation_stats, polyline_length, polyline_length_3d,
    project_onto_polyline, slice_polyline,
};
use crate::{Bounds, ElevationStats, NetworkConfig, Trail, TrailAttributes, TrailPoint};

/// A contiguous piece of one trail between two cut points (or trail ends).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// `"{trail_id}-{sequence}"`
    pub id: String,
    pub trail_id: String,
    /// 1-based position of the piece along its trail
    pub sequence: usize,
    pub name: String,
    pub attributes: TrailAttributes,
    pub points: Vec<TrailPoint>,
    pub length_meters: f64,
    /// Length including height changes
    pub length_3d_meters: f64,
    pub bounds: Bounds,
    /// Present when every point carries elevation
    pub elevation: Option<ElevationStats>,
}

impl Segment {
    pub fn start(&self) -> &TrailPoint {
        &self.points[0]
    }

    pub fn end(&self) -> &TrailPoint {
        &self.points[self.points.len() - 1]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitStats {
    pub trails_in: usize,
    /// Trails cut at one or more points
    pub trails_split: usize,
    pub cut_points: usize,
    pub segments_out: usize,
    /// Segments discarded for being shorter than the minimum segment length
    pub dropped_short: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SplitResult {
    pub segments: Vec<Segment>,
    pub stats: SplitStats,
}

/// Split every trail at the intersection points interior to it.
///
/// Trails without interior intersections pass through as a single segment.
/// Cut points closer than the intersection tolerance to each other or to a
/// trail end are ignored, so no zero-length pieces are produced.
pub fn split_trails(
    trails: &[Trail],
    intersections: &[IntersectionPoint],
    config: &NetworkConfig,
) -> SplitResult {
    let mut cuts_by_trail: HashMap<&str, Vec<&TrailPoint>> = HashMap::new();
    for point in intersections {
        for trail_id in point.trail_ids() {
            if point.is_interior_to(trail_id) {
                cuts_by_trail
                    .entry(trail_id)
                    .or_default()
                    .push(&point.location);
            }
        }
    }

    let mut result = SplitResult::default();
    result.stats.trails_in = trails.len();

    for trail in trails {
        let cuts = cuts_by_trail
            .get(trail.id.as_str())
            .map(|c| cut_positions(trail, c, config.intersection_tolerance_meters))
            .unwrap_or_default();

        if !cuts.is_empty() {
            result.stats.trails_split += 1;
            result.stats.cut_points += cuts.len();
        }

        let mut boundaries = Vec::with_capacity(cuts.len() + 2);
        boundaries.push(PolylinePosition::start());
        boundaries.extend(cuts);
        boundaries.push(PolylinePosition::end(&trail.points));

        for (i, pair) in boundaries.windows(2).enumerate() {
            let points = slice_polyline(&trail.points, &pair[0], &pair[1]);
            let length_meters = polyline_length(&points);
            let sequence = i + 1;

            if points.len() < 2 || length_meters < config.min_segment_length_meters {
                debug!(
                    "[Splitter] Dropping {}-{} ({:.2}m)",
                    trail.id, sequence, length_meters
                );
                result.stats.dropped_short += 1;
                continue;
            }

            result.segments.push(Segment {
                id: format!("{}-{}", trail.id, sequence),
                trail_id: trail.id.clone(),
                sequence,
                name: trail.name.clone(),
                attributes: trail.attributes.clone(),
                elevation: elevation_stats(&points),
                bounds: compute_bounds(&points),
                length_meters,
                length_3d_meters: polyline_length_3d(&points),
                points,
            });
        }
    }

    result.stats.segments_out = result.segments.len();
    info!(
        "[Splitter] {} trails -> {} segments ({} split, {} short segments dropped)",
        result.stats.trails_in,
        result.stats.segments_out,
        result.stats.trails_split,
        result.stats.dropped_short
    );

    result
}

/// Ordered cut positions along a trail, away from its ends and from each other.
fn cut_positions(trail: &Trail, points: &[&TrailPoint], tolerance: f64) -> Vec<PolylinePosition> {
    let mut positions: Vec<PolylinePosition> = points
        .iter()
        .filter_map(|p| project_onto_polyline(&trail.points, p))
        .filter(|pos| {
            pos.distance_along > tolerance && pos.distance_along < trail.length_meters - tolerance
        })
        .collect();

    positions.sort_by(|a, b| a.distance_along.total_cmp(&b.distance_along));
    positions.dedup_by(|b, a| b.distance_along - a.distance_along <= tolerance);
    positions
}
