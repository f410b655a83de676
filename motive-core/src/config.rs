//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MotiveError, Result};

/// Settings shared by the frame loop, the animation drivers and the gesture
/// bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Nominal refresh period used by headless drivers.
    pub frame_interval_ms: f64,

    /// Recursion bound for pull-evaluation of derived cells. Exceeding it is
    /// treated as a cycle.
    pub max_evaluation_depth: usize,

    /// Largest integration step for spring physics.
    pub spring_substep_ms: f64,

    /// Optional safety cap on spring runs. A spring still moving after this
    /// many frames snaps to its target and completes.
    pub max_spring_frames: Option<u64>,

    /// Log a `GestureResolutionAmbiguity` diagnostic whenever a tie between
    /// exclusive recognizers is broken by declaration order.
    pub flag_gesture_ambiguity: bool,

    /// Re-log every Errored derived cell on every frame.
    pub log_errored_cells: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000.0 / 60.0,
            max_evaluation_depth: 64,
            spring_substep_ms: 1.0,
            max_spring_frames: None,
            flag_gesture_ambiguity: cfg!(debug_assertions),
            log_errored_cells: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MotiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can drive a frame loop.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_interval_ms.is_finite() && self.frame_interval_ms > 0.0) {
            return Err(MotiveError::invalid(
                "runtime",
                format!("frame_interval_ms must be positive, got {}", self.frame_interval_ms),
            ));
        }
        if !(self.spring_substep_ms.is_finite() && self.spring_substep_ms > 0.0) {
            return Err(MotiveError::invalid(
                "runtime",
                format!("spring_substep_ms must be positive, got {}", self.spring_substep_ms),
            ));
        }
        if self.max_evaluation_depth == 0 {
            return Err(MotiveError::invalid(
                "runtime",
                "max_evaluation_depth must be at least 1",
            ));
        }
        if self.max_spring_frames == Some(0) {
            return Err(MotiveError::invalid(
                "runtime",
                "max_spring_frames must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config =
            RuntimeConfig::from_json(r#"{"frame_interval_ms": 8.0, "max_spring_frames": 600}"#)
                .unwrap();
        assert_eq!(config.frame_interval_ms, 8.0);
        assert_eq!(config.max_spring_frames, Some(600));
        assert_eq!(config.max_evaluation_depth, 64);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let err = RuntimeConfig::from_json(r#"{"frame_interval_ms": 0.0}"#).unwrap_err();
        assert!(matches!(err, MotiveError::InvalidConfiguration { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = RuntimeConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, MotiveError::Config(_)));
    }
}
