//! Error types for the animation value engine.
//!
//! Graph-internal failures (cycles, panicking computations) are caught per
//! node inside the frame loop and never escape a tick. Only construction-time
//! problems are returned to the caller.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors produced by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotiveError {
    /// A derived cell observed its own (transitive) output while evaluating.
    #[error("cyclic dependency detected at node {node:?}")]
    CyclicDependency { node: NodeId },

    /// An animation primitive, recognizer or runtime setting was given
    /// parameters it cannot run with.
    #[error("invalid configuration for {what}: {reason}")]
    InvalidConfiguration { what: &'static str, reason: String },

    /// Two exclusive recognizers claimed activation in the same resolution
    /// round with nothing but declaration order to tell them apart.
    #[error(
        "ambiguous gesture resolution in group {group}: \
         `{first}` won over `{second}` by declaration order"
    )]
    GestureResolutionAmbiguity {
        group: String,
        first: String,
        second: String,
    },

    /// A derived cell or style computation panicked while evaluating.
    #[error("evaluation of node {node:?} panicked: {message}")]
    EvaluationPanicked { node: NodeId, message: String },

    /// The handle's owning scope has been unmounted.
    #[error("node {node:?} belongs to an unmounted scope")]
    Detached { node: NodeId },

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MotiveError {
    pub(crate) fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            what,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MotiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_message() {
        let err = MotiveError::invalid("timing", "duration must be non-negative");
        assert_eq!(
            err.to_string(),
            "invalid configuration for timing: duration must be non-negative"
        );
    }

    #[test]
    fn cyclic_dependency_carries_node() {
        let node = NodeId::new();
        let err = MotiveError::CyclicDependency { node };
        assert!(matches!(err, MotiveError::CyclicDependency { node: n } if n == node));
    }
}
