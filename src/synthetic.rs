//! Synthetic trail networks for stress testing and benchmarking.
//!
//! Generates a jittered grid of trails with a known topology: every grid line
//! is broken into several end-to-end trails (degree-2 chains to merge), and
//! short dead-end spurs branch off at T-junctions.
//!
//! Feature-gated behind `synthetic`, not included in production builds.
//!
//! # Example
//!
//! ```rust
//! use trailgraph::synthetic::SyntheticScenario;
//! use trailgraph::TrailPoint;
//!
//! let scenario = SyntheticScenario {
//!     origin: TrailPoint::new(8.55, 47.37),
//!     grid_size: 3,
//!     spacing_meters: 200.0,
//!     fragments_per_line: 4,
//!     spur_count: 5,
//!     jitter_meters: 0.3,
//!     seed: 42,
//! };
//!
//! let network = scenario.generate();
//! assert_eq!(network.trails.len(), 6 * 4 + 5);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo_utils::{METERS_PER_DEG_LAT, meters_to_degrees, position_at_distance};
use crate::{Trail, TrailAttributes, TrailPoint};

/// Point spacing along generated trails (meters).
const POINT_SPACING: f64 = 10.0;

/// How far grid lines extend past the outermost crossing (meters).
const OVERHANG: f64 = 50.0;

/// Scenario configuration for generating a synthetic network.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    /// South-west grid crossing.
    pub origin: TrailPoint,
    /// Number of east-west lines (and of north-south lines).
    pub grid_size: usize,
    /// Distance between parallel grid lines in meters.
    pub spacing_meters: f64,
    /// Trails each grid line is broken into.
    pub fragments_per_line: usize,
    /// Dead-end spurs attached to east-west lines.
    pub spur_count: usize,
    /// Maximum lateral vertex noise in meters.
    pub jitter_meters: f64,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

/// Metadata about a generated network.
#[derive(Debug, Clone, Copy)]
pub struct NetworkMetadata {
    pub total_points: usize,
    /// Grid crossings, each expected to become a degree-4 node
    pub expected_crossings: usize,
    /// Spur junctions, each expected to become a degree-3 node
    pub expected_junctions: usize,
}

/// A generated set of trails with its expected topology.
pub struct SyntheticNetwork {
    pub trails: Vec<Trail>,
    pub metadata: NetworkMetadata,
}

impl SyntheticScenario {
    /// A square grid with the given number of lines per axis.
    pub fn grid(grid_size: usize, seed: u64) -> Self {
        Self {
            origin: TrailPoint::new(8.55, 47.37),
            grid_size,
            spacing_meters: 250.0,
            fragments_per_line: 3,
            spur_count: grid_size * 2,
            jitter_meters: 0.3,
            seed,
        }
    }

    /// Generate the trails for this scenario.
    pub fn generate(&self) -> SyntheticNetwork {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let span = self.spacing_meters * self.grid_size.saturating_sub(1) as f64;

        let mut lines: Vec<(String, Vec<TrailPoint>)> = Vec::with_capacity(self.grid_size * 2);
        for i in 0..self.grid_size {
            let offset = i as f64 * self.spacing_meters;
            lines.push((
                format!("ew{i:02}"),
                self.grid_line(offset, span, true, &mut rng),
            ));
            lines.push((
                format!("ns{i:02}"),
                self.grid_line(offset, span, false, &mut rng),
            ));
        }

        let mut trails = Vec::new();
        for (line_id, points) in &lines {
            for (k, fragment) in split_evenly(points, self.fragments_per_line)
                .into_iter()
                .enumerate()
            {
                if let Ok(trail) = Trail::new(
                    format!("{line_id}-{k}"),
                    format!("Grid {line_id} part {k}"),
                    TrailAttributes {
                        surface: Some("dirt".to_string()),
                        trail_type: Some("path".to_string()),
                        difficulty: None,
                    },
                    fragment,
                ) {
                    trails.push(trail);
                }
            }
        }

        let east_west: Vec<&Vec<TrailPoint>> = lines
            .iter()
            .filter(|(id, _)| id.starts_with("ew"))
            .map(|(_, p)| p)
            .collect();
        let mut junctions = 0;
        for s in 0..self.spur_count {
            let Some(line) = east_west.get(rng.gen_range(0..east_west.len().max(1))) else {
                break;
            };
            let Some(spur) = self.spur(line, &mut rng) else {
                continue;
            };
            if let Ok(trail) = Trail::new(
                format!("spur{s:03}"),
                format!("Spur {s}"),
                TrailAttributes::default(),
                spur,
            ) {
                trails.push(trail);
                junctions += 1;
            }
        }

        let total_points = trails.iter().map(|t| t.points.len()).sum();
        SyntheticNetwork {
            trails,
            metadata: NetworkMetadata {
                total_points,
                expected_crossings: self.grid_size * self.grid_size,
                expected_junctions: junctions,
            },
        }
    }

    fn to_point(&self, east: f64, north: f64, elevation: f64) -> TrailPoint {
        let latitude = self.origin.latitude + north / METERS_PER_DEG_LAT;
        let longitude = self.origin.longitude + meters_to_degrees(east, latitude);
        TrailPoint::with_elevation(longitude, latitude, elevation)
    }

    /// A straight grid line with jitter across its direction.
    fn grid_line(&self, offset: f64, span: f64, east_west: bool, rng: &mut StdRng) -> Vec<TrailPoint> {
        let length = span + 2.0 * OVERHANG;
        let steps = (length / POINT_SPACING).ceil() as usize;

        (0..=steps)
            .map(|k| {
                let along = -OVERHANG + length * k as f64 / steps as f64;
                let jitter = if self.jitter_meters > 0.0 {
                    rng.gen_range(-self.jitter_meters..self.jitter_meters)
                } else {
                    0.0
                };
                let elevation = 400.0 + 40.0 * (along / 300.0).sin() + 15.0 * (offset / 200.0).cos();
                if east_west {
                    self.to_point(along, offset + jitter, elevation)
                } else {
                    self.to_point(offset + jitter, along, elevation)
                }
            })
            .collect()
    }

    /// A short northward spur starting on `line` inside a grid cell.
    fn spur(&self, line: &[TrailPoint], rng: &mut StdRng) -> Option<Vec<TrailPoint>> {
        if self.grid_size < 2 {
            return None;
        }
        let cell = rng.gen_range(0..self.grid_size - 1) as f64;
        let east = (cell + rng.gen_range(0.3..0.7)) * self.spacing_meters;
        let start = position_at_distance(line, east + OVERHANG).point(line);

        let length = self.spacing_meters * 0.3;
        let steps = (length / POINT_SPACING).ceil().max(1.0) as usize;
        let north_deg = length / METERS_PER_DEG_LAT;

        let points = (0..=steps)
            .map(|k| {
                let f = k as f64 / steps as f64;
                TrailPoint::with_elevation(
                    start.longitude,
                    start.latitude + north_deg * f,
                    start.elevation.unwrap_or(400.0) + 10.0 * f,
                )
            })
            .collect();
        Some(points)
    }
}

/// Split a polyline into `parts` consecutive pieces sharing their boundary points.
fn split_evenly(points: &[TrailPoint], parts: usize) -> Vec<Vec<TrailPoint>> {
    if points.len() < 2 {
        return vec![points.to_vec()];
    }
    let parts = parts.clamp(1, points.len() - 1);
    let last = points.len() - 1;
    (0..parts)
        .map(|k| {
            let from = last * k / parts;
            let to = last * (k + 1) / parts;
            points[from..=to].to_vec()
        })
        .collect()
}
