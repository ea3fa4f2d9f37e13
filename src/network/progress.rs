use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Network build phases, ordered by execution sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Pairwise trail intersection tests, usually the bulk of the runtime
    DetectingIntersections,
    /// Cutting trails at their interior intersections
    SplittingTrails,
    /// Matching segment endpoints to nodes
    BuildingGraph,
    /// Degree-2 chain consolidation, one item per iteration
    MergingChains,
    /// Connectivity and degree checks on the final graph
    Validating,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::DetectingIntersections => "detecting_intersections",
            BuildPhase::SplittingTrails => "splitting_trails",
            BuildPhase::BuildingGraph => "building_graph",
            BuildPhase::MergingChains => "merging_chains",
            BuildPhase::Validating => "validating",
        }
    }
}

/// Trait for receiving progress updates during a network build.
///
/// Intersection progress is reported from parallel rayon threads, so
/// implementations must be thread-safe.
pub trait BuildProgressCallback: Send + Sync {
    /// Called when entering a new phase. `total` is the number of items in this phase.
    fn on_phase(&self, phase: BuildPhase, total: u32);
    /// Called after completing one item in the current phase.
    fn on_progress(&self);
}

pub struct NoopProgress;

impl BuildProgressCallback for NoopProgress {
    fn on_phase(&self, _phase: BuildPhase, _total: u32) {}
    fn on_progress(&self) {}
}

/// Atomic progress tracker that can be polled from another thread.
pub struct AtomicProgressTracker {
    pub phase: Mutex<String>,
    pub completed: AtomicU32,
    pub total: AtomicU32,
    /// Every phase entered, in order
    pub history: Mutex<Vec<BuildPhase>>,
}

impl Default for AtomicProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgressTracker {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(String::new()),
            completed: AtomicU32::new(0),
            total: AtomicU32::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn phases(&self) -> Vec<BuildPhase> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl BuildProgressCallback for AtomicProgressTracker {
    fn on_phase(&self, phase: BuildPhase, total: u32) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase.as_str().to_string();
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(phase);
        }
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn on_progress(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}
