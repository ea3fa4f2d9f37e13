//! Unified error handling for trailgraph.
//!
//! Only caller mistakes surface as errors. Data defects found while building
//! the network (bad trail pairs, unmergeable chains) are logged and counted
//! in the stage reports instead.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrailGraphError>;

/// Errors returned by trailgraph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrailGraphError {
    /// A configuration parameter is out of range.
    #[error("invalid configuration: {parameter} = {value} ({reason})")]
    InvalidConfig {
        parameter: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A trail could not be constructed from the supplied geometry.
    #[error("invalid trail '{trail_id}': {reason}")]
    InvalidTrail { trail_id: String, reason: String },

    /// An edge would violate a graph invariant.
    #[error("invalid edge {source_node} -> {target_node}: {reason}")]
    InvalidEdge {
        source_node: usize,
        target_node: usize,
        reason: &'static str,
    },
}

impl TrailGraphError {
    pub(crate) fn invalid_trail(trail_id: &str, reason: impl Into<String>) -> Self {
        TrailGraphError::InvalidTrail {
            trail_id: trail_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Extension for turning an `Option` into a trail construction error.
pub trait OptionExt<T> {
    fn ok_or_invalid_trail(self, trail_id: &str, reason: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_trail(self, trail_id: &str, reason: &str) -> Result<T> {
        self.ok_or_else(|| TrailGraphError::invalid_trail(trail_id, reason))
    }
}
