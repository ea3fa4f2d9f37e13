//! # Trail Graph
//!
//! Builds a routable trail network from raw trail polylines.
//!
//! This library provides:
//! - Pairwise intersection detection with near-miss tolerance
//! - Splitting of trails at their intersections
//! - Node/edge graph assembly with proximity-based node matching
//! - Iterative degree-2 chain consolidation to a fixed point
//! - Connectivity validation of the finished graph
//!
//! ## Features
//!
//! - **`parallel`** - Pairwise intersection detection with rayon (default)
//! - **`synthetic`** - Deterministic synthetic trail networks for benchmarks
//! - **`cli`** - Debug binary that builds a network from a folder of GPX files
//!
//! ## Quick Start
//!
//! ```rust
//! use trailgraph::{NetworkConfig, Trail, TrailAttributes, TrailPoint, build_network};
//!
//! let east_west = Trail::new(
//!     "ridge",
//!     "Ridge Trail",
//!     TrailAttributes::default(),
//!     vec![TrailPoint::new(8.000, 47.000), TrailPoint::new(8.004, 47.000)],
//! )
//! .unwrap();
//! let north_south = Trail::new(
//!     "creek",
//!     "Creek Trail",
//!     TrailAttributes::default(),
//!     vec![TrailPoint::new(8.002, 46.998), TrailPoint::new(8.002, 47.002)],
//! )
//! .unwrap();
//!
//! let network = build_network(&[east_west, north_south], &NetworkConfig::default()).unwrap();
//! assert_eq!(network.graph.edge_count(), 4);
//! assert_eq!(network.connectivity.reachability_percent, 100.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailGraphError};

// Geographic utilities (distance, bounds, projection, polyline slicing)
pub mod geo_utils;

// Graph construction pipeline
pub mod network;
pub use network::{
    AtomicProgressTracker, BuildPhase, BuildProgressCallback, BuildStats, Chain,
    ConnectivityReport, ConsolidationReport, EdgeId, GraphDiff, GraphEdge, GraphNode,
    IntersectionPoint, NetworkStats, NodeId, NodeKind, NoopProgress, Provenance, RejectedChain,
    RejectionReason, Segment, SplitStats, TrailContact, TrailGraph, TrailNetwork, build_graph,
    build_network, build_network_with_progress, consolidate, detect_chains,
    detect_intersections, merge_iteration, split_trails, validate_connectivity,
};

// Synthetic trail networks for stress testing and benchmarking
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A trail coordinate: longitude, latitude and optional elevation.
///
/// # Example
/// ```
/// use trailgraph::TrailPoint;
/// let summit = TrailPoint::with_elevation(7.6586, 45.9763, 4478.0);
/// assert!(summit.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub longitude: f64,
    pub latitude: f64,
    /// Elevation in meters, when an elevation provider has annotated the trail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

impl TrailPoint {
    /// Create a point without elevation.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            elevation: None,
        }
    }

    /// Create a point with elevation.
    pub fn with_elevation(longitude: f64, latitude: f64, elevation: f64) -> Self {
        Self {
            longitude,
            latitude,
            elevation: Some(elevation),
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && self.elevation.is_none_or(f64::is_finite)
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[TrailPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> TrailPoint {
        TrailPoint::new(
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Whether the two boxes share any area (touching counts).
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lng <= other.max_lng
            && other.min_lng <= self.max_lng
    }

    /// Grow the box by `meters` on every side.
    pub fn expand_meters(&self, meters: f64) -> Bounds {
        let center_lat = (self.min_lat + self.max_lat) / 2.0;
        let dlat = meters / geo_utils::METERS_PER_DEG_LAT;
        let dlng = geo_utils::meters_to_degrees(meters, center_lat);
        Bounds {
            min_lat: self.min_lat - dlat,
            max_lat: self.max_lat + dlat,
            min_lng: self.min_lng - dlng,
            max_lng: self.max_lng + dlng,
        }
    }
}

/// Elevation summary of a polyline with a complete elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationStats {
    /// Total climb in meters
    pub gain: f64,
    /// Total descent in meters (positive)
    pub loss: f64,
    pub min: f64,
    pub max: f64,
}

/// Descriptive trail attributes carried from trails onto their segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailAttributes {
    /// Surface (e.g., "dirt", "gravel", "paved")
    #[serde(default)]
    pub surface: Option<String>,
    /// Trail type (e.g., "path", "track", "footway")
    #[serde(default)]
    pub trail_type: Option<String>,
    /// Difficulty rating (e.g., "easy", "T3")
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// A raw trail polyline as supplied by the trail source.
///
/// Trails are immutable once constructed. [`Trail::new`] enforces the input
/// contract: a non-empty id, valid coordinates and at least two distinct points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    /// Stable unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    pub attributes: TrailAttributes,
    /// Coordinates with consecutive duplicates removed
    pub points: Vec<TrailPoint>,
    /// 2D length in meters
    pub length_meters: f64,
    pub bounds: Bounds,
}

impl Trail {
    /// Create a trail, validating its geometry.
    ///
    /// # Example
    /// ```
    /// use trailgraph::{Trail, TrailAttributes, TrailPoint};
    ///
    /// let trail = Trail::new(
    ///     "t-1",
    ///     "Lakeside",
    ///     TrailAttributes::default(),
    ///     vec![TrailPoint::new(8.0, 47.0), TrailPoint::new(8.001, 47.0)],
    /// );
    /// assert!(trail.is_ok());
    ///
    /// let degenerate = Trail::new(
    ///     "t-2",
    ///     "Nowhere",
    ///     TrailAttributes::default(),
    ///     vec![TrailPoint::new(8.0, 47.0), TrailPoint::new(8.0, 47.0)],
    /// );
    /// assert!(degenerate.is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        attributes: TrailAttributes,
        points: Vec<TrailPoint>,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TrailGraphError::invalid_trail(&id, "empty trail id"));
        }
        if let Some(idx) = points.iter().position(|p| !p.is_valid()) {
            return Err(TrailGraphError::invalid_trail(
                &id,
                format!("invalid coordinate at index {idx}"),
            ));
        }

        let mut points = points;
        geo_utils::dedup_consecutive(&mut points);
        if points.len() < 2 {
            return Err(TrailGraphError::invalid_trail(
                &id,
                "fewer than 2 distinct points",
            ));
        }

        let bounds = Bounds::from_points(&points).ok_or_invalid_trail(&id, "no points")?;
        let length_meters = geo_utils::polyline_length(&points);

        Ok(Self {
            id,
            name: name.into(),
            attributes,
            points,
            length_meters,
            bounds,
        })
    }

    pub fn start(&self) -> &TrailPoint {
        &self.points[0]
    }

    pub fn end(&self) -> &TrailPoint {
        &self.points[self.points.len() - 1]
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Tolerances and limits for one network build.
///
/// All distances are in meters. Passed explicitly to every stage so tests can
/// vary them per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Maximum distance for two trails to be considered intersecting.
    /// Default: 1.0 meters
    pub intersection_tolerance_meters: f64,

    /// Split points closer than this become the same graph node.
    /// Coarser than the intersection tolerance to absorb splitting noise.
    /// Default: 2.0 meters
    pub node_tolerance_meters: f64,

    /// Maximum gap between consecutive edges of a chain being merged.
    /// Default: 5.0 meters
    pub chain_join_tolerance_meters: f64,

    /// Trails shorter than this do not take part in intersection detection.
    /// Default: 5.0 meters
    pub min_trail_length_meters: f64,

    /// Segments shorter than this are dropped after splitting.
    /// Default: 5.0 meters
    pub min_segment_length_meters: f64,

    /// Maximum number of edges merged into one edge per iteration.
    /// Default: 15
    pub max_chain_length: usize,

    /// Overlapping candidate chains sharing more than this length are resolved
    /// by keeping only the longer one.
    /// Default: 100.0 meters
    pub overlap_drop_threshold_meters: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            intersection_tolerance_meters: 1.0,
            node_tolerance_meters: 2.0,
            chain_join_tolerance_meters: 5.0,
            min_trail_length_meters: 5.0,
            min_segment_length_meters: 5.0,
            max_chain_length: 15,
            overlap_drop_threshold_meters: 100.0,
        }
    }
}

impl NetworkConfig {
    /// Reject out-of-range parameters before any stage runs.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            (
                "intersection_tolerance_meters",
                self.intersection_tolerance_meters,
            ),
            ("node_tolerance_meters", self.node_tolerance_meters),
            (
                "chain_join_tolerance_meters",
                self.chain_join_tolerance_meters,
            ),
            ("min_trail_length_meters", self.min_trail_length_meters),
            ("min_segment_length_meters", self.min_segment_length_meters),
            (
                "overlap_drop_threshold_meters",
                self.overlap_drop_threshold_meters,
            ),
        ];

        for (parameter, value) in distances {
            if !value.is_finite() {
                return Err(TrailGraphError::InvalidConfig {
                    parameter,
                    value,
                    reason: "must be finite",
                });
            }
            if value < 0.0 {
                return Err(TrailGraphError::InvalidConfig {
                    parameter,
                    value,
                    reason: "must not be negative",
                });
            }
        }

        if self.max_chain_length < 2 {
            return Err(TrailGraphError::InvalidConfig {
                parameter: "max_chain_length",
                value: self.max_chain_length as f64,
                reason: "must be at least 2",
            });
        }

        Ok(())
    }
}
