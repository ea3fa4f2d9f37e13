//! R-tree object types for trail envelopes and graph nodes.

use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::geo_utils::{METERS_PER_DEG_LAT, haversine_distance, meters_to_degrees};
use crate::network::graph::NodeId;
use crate::{Bounds, Trail, TrailPoint};

/// A trail's bounding box, expanded by a search buffer, for candidate-pair queries.
#[derive(Debug, Clone, Copy)]
pub struct TrailEnvelope {
    pub idx: usize,
    pub bounds: Bounds,
}

impl RTreeObject for TrailEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        bounds_envelope(&self.bounds)
    }
}

pub fn bounds_envelope(bounds: &Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bounds.min_lng, bounds.min_lat],
        [bounds.max_lng, bounds.max_lat],
    )
}

/// Build an R-tree of trail envelopes grown by `buffer_meters`.
///
/// `idx` refers to the position in `trails`, restricted to `participants`.
pub fn build_trail_rtree(
    trails: &[Trail],
    participants: &[usize],
    buffer_meters: f64,
) -> RTree<TrailEnvelope> {
    let envelopes: Vec<TrailEnvelope> = participants
        .iter()
        .map(|&idx| TrailEnvelope {
            idx,
            bounds: trails[idx].bounds.expand_meters(buffer_meters),
        })
        .collect();
    RTree::bulk_load(envelopes)
}

/// A graph node location for proximity matching.
#[derive(Debug, Clone, Copy)]
pub struct IndexedNode {
    pub id: NodeId,
    pub lng: f64,
    pub lat: f64,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlng = self.lng - point[0];
        let dlat = self.lat - point[1];
        dlng * dlng + dlat * dlat
    }
}

/// Nodes indexed by location, matched within a fixed tolerance in meters.
pub struct NodeIndex {
    tree: RTree<IndexedNode>,
    tolerance_meters: f64,
}

impl NodeIndex {
    pub fn new(tolerance_meters: f64) -> Self {
        Self {
            tree: RTree::new(),
            tolerance_meters,
        }
    }

    pub fn insert(&mut self, id: NodeId, location: &TrailPoint) {
        self.tree.insert(IndexedNode {
            id,
            lng: location.longitude,
            lat: location.latitude,
        });
    }

    /// The closest indexed node within tolerance, ties going to the lower id.
    pub fn find(&self, location: &TrailPoint) -> Option<NodeId> {
        // Degree radius large enough for both axes; candidates are then checked
        // with the haversine distance.
        let radius = meters_to_degrees(self.tolerance_meters, location.latitude)
            .max(self.tolerance_meters / METERS_PER_DEG_LAT);
        let query = [location.longitude, location.latitude];

        self.tree
            .locate_within_distance(query, radius * radius)
            .map(|n| {
                let d = haversine_distance(&TrailPoint::new(n.lng, n.lat), location);
                (d, n.id)
            })
            .filter(|(d, _)| *d <= self.tolerance_meters)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_index_matches_within_tolerance() {
        let mut index = NodeIndex::new(2.0);
        index.insert(0, &TrailPoint::new(8.0, 47.0));
        index.insert(1, &TrailPoint::new(8.001, 47.0));

        // ~1.1 m north of node 0
        assert_eq!(index.find(&TrailPoint::new(8.0, 47.00001)), Some(0));
        // ~11 m away from both
        assert_eq!(index.find(&TrailPoint::new(8.0005, 47.0001)), None);
        assert_eq!(index.len(), 2);
    }
}
