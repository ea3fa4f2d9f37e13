//! Trail network construction pipeline.
//!
//! Five stages run in order, each consuming the previous stage's output:
//! 1. Intersection detection (pairwise, parallel)
//! 2. Trail splitting at interior intersections
//! 3. Graph assembly with proximity node matching
//! 4. Degree-2 chain consolidation to a fixed point
//! 5. Connectivity validation

pub mod builder;
pub mod graph;
pub mod intersections;
pub mod merger;
pub mod progress;
pub mod rtree;
pub mod splitter;
pub mod validation;

pub use builder::{BuildStats, build_graph};
pub use graph::{
    DiffSummary, EdgeId, GraphDiff, GraphEdge, GraphNode, NodeId, NodeKind, Provenance,
    TrailGraph,
};
pub use intersections::{
    IntersectionPoint, TrailContact, detect_intersections, detect_intersections_with_progress,
};
pub use merger::{
    Chain, ChainDetection, CommitSummary, ConsolidationReport, IterationOutcome,
    RejectedChain, RejectionReason, ValidatedChain, commit_chains, consolidate, detect_chains,
    merge_iteration, resolve_overlaps, validate_chain,
};
pub use progress::{AtomicProgressTracker, BuildPhase, BuildProgressCallback, NoopProgress};
pub use splitter::{Segment, SplitResult, SplitStats, split_trails};
pub use validation::{ConnectivityReport, validate_connectivity};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::{NetworkConfig, Result, Trail};

/// Per-stage counts for one network build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub trails_in: usize,
    /// Trails skipped because their id repeats an earlier trail
    pub duplicate_trails: usize,
    pub intersections: usize,
    pub split: SplitStats,
    pub build: BuildStats,
    pub elapsed_ms: u64,
}

/// A consolidated trail graph with the reports from building it.
#[derive(Debug, Clone)]
pub struct TrailNetwork {
    pub graph: TrailGraph,
    pub stats: NetworkStats,
    pub consolidation: ConsolidationReport,
    pub connectivity: ConnectivityReport,
}

/// Build a consolidated trail network.
///
/// Fails only on an invalid configuration. Data defects are logged and
/// reflected in the returned reports.
pub fn build_network(trails: &[Trail], config: &NetworkConfig) -> Result<TrailNetwork> {
    build_network_with_progress(trails, config, &NoopProgress)
}

/// [`build_network`] with phase and item progress reporting.
pub fn build_network_with_progress(
    trails: &[Trail],
    config: &NetworkConfig,
    progress: &dyn BuildProgressCallback,
) -> Result<TrailNetwork> {
    config.validate()?;
    let start = Instant::now();

    let mut stats = NetworkStats {
        trails_in: trails.len(),
        ..Default::default()
    };

    let mut ids: HashSet<&str> = HashSet::new();
    let unique: Vec<Trail> = trails
        .iter()
        .filter(|t| {
            let fresh = ids.insert(t.id.as_str());
            if !fresh {
                warn!("[Network] Skipping duplicate trail id '{}'", t.id);
            }
            fresh
        })
        .cloned()
        .collect();
    stats.duplicate_trails = trails.len() - unique.len();

    info!("[Network] Building from {} trails", unique.len());

    let stage = Instant::now();
    let intersections = detect_intersections_with_progress(&unique, config, progress);
    stats.intersections = intersections.len();
    info!(
        "[Network] Intersections: {} in {}ms",
        intersections.len(),
        stage.elapsed().as_millis()
    );

    let stage = Instant::now();
    progress.on_phase(BuildPhase::SplittingTrails, unique.len() as u32);
    let split = split_trails(&unique, &intersections, config);
    stats.split = split.stats;
    info!(
        "[Network] Split: {} segments in {}ms",
        split.segments.len(),
        stage.elapsed().as_millis()
    );

    let stage = Instant::now();
    progress.on_phase(BuildPhase::BuildingGraph, split.segments.len() as u32);
    let (mut graph, build) = build_graph(&split.segments, config);
    stats.build = build;
    info!(
        "[Network] Graph: {} nodes, {} edges in {}ms",
        graph.node_count(),
        graph.edge_count(),
        stage.elapsed().as_millis()
    );

    let stage = Instant::now();
    progress.on_phase(BuildPhase::MergingChains, graph.edge_count() as u32);
    let consolidation = consolidate(&mut graph, config);
    for _ in 0..consolidation.iterations {
        progress.on_progress();
    }
    info!(
        "[Network] Consolidation: {} -> {} edges in {}ms",
        consolidation.edges_before,
        consolidation.edges_after,
        stage.elapsed().as_millis()
    );

    progress.on_phase(BuildPhase::Validating, 1);
    let connectivity = validate_connectivity(&graph, None);
    progress.on_progress();

    stats.elapsed_ms = start.elapsed().as_millis() as u64;
    info!("[Network] Done in {}ms", stats.elapsed_ms);

    Ok(TrailNetwork {
        graph,
        stats,
        consolidation,
        connectivity,
    })
}
