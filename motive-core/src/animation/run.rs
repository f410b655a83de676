//! Animation runs
//!
//! An [`ActiveRun`] binds a driver to the cell it writes. The runtime keeps at
//! most one run per cell; the run's completion callback is taken exactly once,
//! on whichever terminal transition happens first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::driver::{Driver, DriverEnv};
use super::spec::{AnimationResult, Program};
use super::value::Components;
use crate::graph::NodeId;

/// Unique identifier of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl RunId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Active,
    Completed,
    Cancelled,
}

/// Callback invoked once when a run ends, off the evaluation pass.
pub type CompletionCallback = Box<dyn FnOnce(AnimationResult) + Send + 'static>;

/// The cell side of a run: read the current value, commit a new one.
pub(crate) trait AnimatedTarget: Send + Sync {
    fn node_id(&self) -> NodeId;
    fn components(&self) -> Components;
    /// Commit a value produced during evaluation. Visible immediately.
    fn commit_components(&self, components: &[f64]);
}

/// A run requested from outside the frame loop, started at the next
/// Collecting phase.
pub(crate) struct PendingRun {
    pub target: Arc<dyn AnimatedTarget>,
    pub program: Program,
    pub callback: Option<CompletionCallback>,
}

pub(crate) struct ActiveRun {
    id: RunId,
    target: Arc<dyn AnimatedTarget>,
    driver: Driver,
    callback: Option<CompletionCallback>,
    state: RunState,
}

impl ActiveRun {
    /// Start from the target's current value. `inherited_velocity` comes from
    /// the run this one replaces and is only used by springs.
    pub(crate) fn start(
        pending: PendingRun,
        inherited_velocity: Option<Components>,
        now_ms: f64,
    ) -> Self {
        let from = pending.target.components();
        let velocity = if pending.program.starts_with_spring() {
            inherited_velocity
        } else {
            None
        };
        let id = RunId::next();
        debug!(run = ?id, node = %pending.target.node_id(), "animation run started");
        Self {
            id,
            driver: Driver::start(&pending.program, from, velocity, now_ms),
            target: pending.target,
            callback: pending.callback,
            state: RunState::Active,
        }
    }

    pub(crate) fn id(&self) -> RunId {
        self.id
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn velocity(&self) -> Components {
        self.driver.velocity()
    }

    /// Step the driver and commit its value. Returns `true` when the run
    /// completed on this step.
    pub(crate) fn advance(&mut self, now_ms: f64, env: &DriverEnv) -> bool {
        if self.state != RunState::Active {
            return false;
        }
        let step = self.driver.step(now_ms, env);
        self.target.commit_components(&step.value);
        if step.done {
            self.state = RunState::Completed;
            debug!(run = ?self.id, node = %self.target.node_id(), "animation run completed");
        }
        step.done
    }

    /// Mark cancelled. The value stays wherever the last step left it.
    pub(crate) fn cancel(&mut self) {
        if self.state == RunState::Active {
            self.state = RunState::Cancelled;
            debug!(run = ?self.id, node = %self.target.node_id(), "animation run cancelled");
        }
    }

    /// Package the completion callback for the Flushing phase. Returns `None`
    /// if the run is still active, had no callback, or already handed it out.
    pub(crate) fn take_completion(&mut self) -> Option<Box<dyn FnOnce() + Send + 'static>> {
        let finished = match self.state {
            RunState::Active => return None,
            RunState::Completed => true,
            RunState::Cancelled => false,
        };
        let callback = self.callback.take()?;
        Some(Box::new(move || callback(AnimationResult { finished })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::easing::Easing;
    use crate::animation::spec::{AnimationSpec, TimingConfig};
    use parking_lot::Mutex;
    use smallvec::smallvec;

    struct Slot {
        id: NodeId,
        value: Mutex<Components>,
    }

    impl AnimatedTarget for Slot {
        fn node_id(&self) -> NodeId {
            self.id
        }
        fn components(&self) -> Components {
            self.value.lock().clone()
        }
        fn commit_components(&self, components: &[f64]) {
            *self.value.lock() = components.iter().copied().collect();
        }
    }

    const ENV: DriverEnv = DriverEnv {
        substep_ms: 1.0,
        max_spring_frames: None,
    };

    fn pending(slot: &Arc<Slot>, results: &Arc<Mutex<Vec<AnimationResult>>>) -> PendingRun {
        let results = Arc::clone(results);
        PendingRun {
            target: slot.clone(),
            program: AnimationSpec::timing(10.0, TimingConfig::new(100.0, Easing::Linear))
                .unwrap()
                .lower(),
            callback: Some(Box::new(move |r| results.lock().push(r))),
        }
    }

    #[test]
    fn completion_is_delivered_once() {
        let slot = Arc::new(Slot {
            id: NodeId::new(),
            value: Mutex::new(smallvec![0.0]),
        });
        let results = Arc::new(Mutex::new(Vec::new()));
        let mut run = ActiveRun::start(pending(&slot, &results), None, 0.0);

        assert!(run.take_completion().is_none());
        assert!(!run.advance(50.0, &ENV));
        assert_eq!(slot.components()[0], 5.0);
        assert!(run.advance(100.0, &ENV));
        assert_eq!(run.state(), RunState::Completed);

        let callback = run.take_completion().unwrap();
        callback();
        assert!(run.take_completion().is_none());
        assert_eq!(*results.lock(), vec![AnimationResult { finished: true }]);
    }

    #[test]
    fn cancelled_run_reports_unfinished_and_stops_writing() {
        let slot = Arc::new(Slot {
            id: NodeId::new(),
            value: Mutex::new(smallvec![0.0]),
        });
        let results = Arc::new(Mutex::new(Vec::new()));
        let mut run = ActiveRun::start(pending(&slot, &results), None, 0.0);
        run.advance(30.0, &ENV);
        run.cancel();
        assert!(!run.advance(60.0, &ENV));
        assert_eq!(slot.components()[0], 3.0);

        if let Some(callback) = run.take_completion() {
            callback();
        }
        assert_eq!(*results.lock(), vec![AnimationResult { finished: false }]);
    }
}
