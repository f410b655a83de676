//! Frame phases and per-frame reports.

use serde::Serialize;

use crate::error::MotiveError;
use crate::graph::NodeId;
use crate::reactive::PropertyBag;

/// Where the frame loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FramePhase {
    #[default]
    Idle,
    /// Staged writes, animation starts and frame tasks are applied.
    Collecting,
    /// Active runs advance and commit.
    Evaluating,
    /// Derived cells settle in dependency order.
    Propagating,
    /// Style computations re-run and hand bags to the renderer.
    Rendering,
    /// Escape-hatch callbacks run.
    Flushing,
}

/// A fresh property bag for one style computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleUpdate {
    pub node: NodeId,
    pub properties: PropertyBag,
}

/// Everything one frame produced.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub timestamp_ms: f64,
    /// Bags from style computations that re-ran, in registration order.
    pub styles: Vec<StyleUpdate>,
    /// Every derived cell currently frozen in the Errored state.
    pub errored: Vec<NodeId>,
    /// Failures caught in this frame.
    pub errors: Vec<MotiveError>,
    pub completed_runs: usize,
    pub cancelled_runs: usize,
}

impl FrameReport {
    /// The bag a style computation produced in this frame, if it re-ran.
    pub fn style(&self, node: NodeId) -> Option<&PropertyBag> {
        self.styles
            .iter()
            .find(|update| update.node == node)
            .map(|update| &update.properties)
    }
}
