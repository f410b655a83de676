//! Reactive Runtime
//!
//! The runtime is the coordinator that connects value cells, derived cells,
//! style computations and animation runs. Unlike a process-wide registry it
//! is an explicit handle: every scope, and through it every cell, belongs to
//! exactly one runtime, and nothing is looked up ambiently.
//!
//! # How It Works
//!
//! 1. Scopes create cells, which register with the runtime's node registry.
//!
//! 2. Writes and animation requests made outside the frame loop are staged
//!    here and applied together at the next Collecting phase.
//!
//! 3. Active runs, the dependency topology and the escape-hatch callback
//!    queue all live here; the frame loop drives them once per tick.
//!
//! # Thread Safety
//!
//! Gesture handlers and completion callbacks may run on a different thread
//! than frame evaluation. The only thing they touch is the staging queue,
//! which is what makes the frame boundary the single synchronization point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::scope::Scope;
use super::style::StyleInner;
use crate::animation::{ActiveRun, DriverEnv, PendingRun};
use crate::config::RuntimeConfig;
use crate::error::{MotiveError, Result};
use crate::frame::FramePhase;
use crate::graph::{NodeId, NodeKind, Topology};

/// A closure bound for the application layer, run in the Flushing phase.
pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Unwind payload raised when a derived cell reads its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleSignal {
    /// The node found already on the evaluation stack.
    pub origin: NodeId,
}

/// A node the runtime can settle and inspect without knowing its value type.
pub(crate) trait Reactive: Send + Sync {
    fn node_id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    /// Frame number in which the committed value last changed.
    fn changed_at(&self) -> u64;

    /// Bring the node up to date for `frame`. Value cells are always settled.
    fn settle(&self, _frame: u64) -> std::result::Result<(), CycleSignal> {
        Ok(())
    }

    /// Compare against the value at the previous frame boundary. Value cells
    /// only; returns whether the value changed.
    fn commit_frame(&self, _frame: u64) -> bool {
        false
    }

    /// Cut the node loose from its runtime after its scope unmounts.
    fn detach(&self);
}

/// An operation requested outside the frame loop.
pub(crate) enum StagedOp {
    /// Apply a value. The closure returns `false` if the cell is detached.
    Write {
        node: NodeId,
        apply: Box<dyn FnOnce() -> bool + Send>,
    },
    Animate {
        node: NodeId,
        run: PendingRun,
    },
    Cancel {
        node: NodeId,
    },
    /// Closure handed to the frame context with `run_on_frame`.
    Task(Callback),
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) topology: Mutex<Topology>,
    pub(crate) registry: DashMap<NodeId, Arc<dyn Reactive>>,
    pub(crate) styles: Mutex<IndexMap<NodeId, Arc<StyleInner>>>,
    pub(crate) staged: Mutex<Vec<StagedOp>>,
    /// Active runs keyed by the cell they drive, in registration order.
    pub(crate) runs: Mutex<IndexMap<NodeId, ActiveRun>>,
    pub(crate) callbacks: Mutex<VecDeque<Callback>>,
    /// Cells committed to since the last frame boundary.
    pub(crate) touched: Mutex<IndexSet<NodeId>>,
    /// Derived cells permanently frozen by a cycle.
    pub(crate) errored: Mutex<IndexMap<NodeId, MotiveError>>,
    /// Failures caught during the current frame, drained into its report.
    pub(crate) failures: Mutex<Vec<MotiveError>>,
    pub(crate) frame: AtomicU64,
    pub(crate) phase: Mutex<FramePhase>,
    pub(crate) pending_styles: AtomicUsize,
    dormant: AtomicBool,
    wake: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            topology: Mutex::new(Topology::new()),
            registry: DashMap::new(),
            styles: Mutex::new(IndexMap::new()),
            staged: Mutex::new(Vec::new()),
            runs: Mutex::new(IndexMap::new()),
            callbacks: Mutex::new(VecDeque::new()),
            touched: Mutex::new(IndexSet::new()),
            errored: Mutex::new(IndexMap::new()),
            failures: Mutex::new(Vec::new()),
            frame: AtomicU64::new(0),
            phase: Mutex::new(FramePhase::Idle),
            pending_styles: AtomicUsize::new(0),
            dormant: AtomicBool::new(true),
            wake: Mutex::new(None),
        }
    }

    pub(crate) fn driver_env(&self) -> DriverEnv {
        DriverEnv {
            substep_ms: self.config.spring_substep_ms,
            max_spring_frames: self.config.max_spring_frames,
        }
    }

    /// Clone the node out of the registry so no shard lock is held while it
    /// settles.
    pub(crate) fn lookup(&self, node: NodeId) -> Option<Arc<dyn Reactive>> {
        self.registry.get(&node).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn register(&self, node: Arc<dyn Reactive>) {
        self.registry.insert(node.node_id(), node);
    }

    pub(crate) fn attach(&self, node: NodeId, kind: NodeKind) {
        self.topology.lock().ensure_node(node, kind);
    }

    pub(crate) fn stage(&self, op: StagedOp) {
        self.staged.lock().push(op);
        self.request_frame();
    }

    pub(crate) fn defer(&self, callback: Callback) {
        self.callbacks.lock().push_back(callback);
        self.request_frame();
    }

    /// Record that a cell's committed value was written this frame.
    pub(crate) fn touch(&self, node: NodeId) {
        self.touched.lock().insert(node);
    }

    pub(crate) fn record_errored(&self, node: NodeId, error: MotiveError) {
        warn!(node = %node, %error, "derived cell is now errored");
        self.errored.lock().insert(node, error.clone());
        self.failures.lock().push(error);
    }

    pub(crate) fn record_failure(&self, error: MotiveError) {
        self.failures.lock().push(error);
    }

    pub(crate) fn style_registered(&self) {
        self.pending_styles.fetch_add(1, Ordering::SeqCst);
        self.request_frame();
    }

    pub(crate) fn style_evaluated(&self) {
        let _ = self
            .pending_styles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn needs_frame(&self) -> bool {
        !self.staged.lock().is_empty()
            || !self.runs.lock().is_empty()
            || !self.callbacks.lock().is_empty()
            || self.pending_styles.load(Ordering::SeqCst) > 0
    }

    /// Leave the dormant state, notifying the platform if we were asleep.
    pub(crate) fn request_frame(&self) {
        if self.dormant.swap(false, Ordering::SeqCst) {
            let wake = self.wake.lock().clone();
            if let Some(wake) = wake {
                wake();
            }
        }
    }

    pub(crate) fn go_dormant(&self) {
        self.dormant.store(true, Ordering::SeqCst);
    }

    /// Cancel any run on `node`, queueing its callback as unfinished.
    /// Returns the cancelled run's velocity.
    pub(crate) fn cancel_run(&self, node: NodeId) -> Option<crate::animation::Components> {
        let removed = self.runs.lock().shift_remove(&node);
        removed.map(|mut run| {
            run.cancel();
            let velocity = run.velocity();
            if let Some(callback) = run.take_completion() {
                self.callbacks.lock().push_back(callback);
            }
            velocity
        })
    }

    /// Tear down nodes owned by an unmounting scope.
    pub(crate) fn release(&self, nodes: &[NodeId]) {
        for &node in nodes {
            self.cancel_run(node);
            if let Some((_, reactive)) = self.registry.remove(&node) {
                reactive.detach();
            }
            let style = self.styles.lock().shift_remove(&node);
            if let Some(style) = style {
                if style.detach() {
                    self.style_evaluated();
                }
            }
            self.topology.lock().remove_node(node);
            self.errored.lock().shift_remove(&node);
        }
        if !self.callbacks.lock().is_empty() {
            self.request_frame();
        }
    }
}

/// Handle to one animation value graph.
///
/// Cloning the handle shares the graph. Create one per screen or window and
/// drive it with a [`FrameLoop`](crate::FrameLoop).
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with a validated configuration.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RuntimeInner::new(config)),
        })
    }

    /// Open a scope that owns the cells of one component.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        let name = name.into();
        debug!(scope = %name, "scope mounted");
        Scope::new(name, Arc::clone(&self.inner))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Called whenever the runtime leaves its dormant state, so the platform
    /// can schedule a frame instead of polling.
    pub fn set_wake_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.wake.lock() = Some(Arc::new(callback));
    }

    /// Queue `f` for the application layer. It runs once, in FIFO order, in
    /// the Flushing phase of the next frame. Safe to call from inside a
    /// derived cell, a style computation, a gesture handler or another
    /// callback.
    pub fn run_on_control<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.defer(Box::new(f));
    }

    /// Run `f` inside the next frame, in its Collecting phase. Writes and
    /// animation starts made by `f` apply in that same frame.
    pub fn run_on_frame<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.stage(StagedOp::Task(Box::new(f)));
    }

    /// Phase of the frame currently in progress, or `Idle`.
    pub fn phase(&self) -> FramePhase {
        *self.inner.phase.lock()
    }

    /// Number of the most recently started frame.
    pub fn frame_number(&self) -> u64 {
        self.inner.frame.load(Ordering::SeqCst)
    }

    /// Derived cells frozen by a dependency cycle.
    pub fn errored_nodes(&self) -> Vec<(NodeId, MotiveError)> {
        self.inner
            .errored
            .lock()
            .iter()
            .map(|(id, err)| (*id, err.clone()))
            .collect()
    }

    /// Number of cells with an active animation run.
    pub fn active_run_count(&self) -> usize {
        self.inner.runs.lock().len()
    }

    /// Number of registered value and derived cells.
    pub fn node_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            inner: Arc::new(RuntimeInner::new(RuntimeConfig::default())),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("frame", &self.frame_number())
            .field("nodes", &self.node_count())
            .field("active_runs", &self.active_run_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn rejects_invalid_config() {
        let config = RuntimeConfig {
            max_evaluation_depth: 0,
            ..RuntimeConfig::default()
        };
        assert!(Runtime::new(config).is_err());
    }

    #[test]
    fn wake_fires_once_per_dormant_period() {
        let runtime = Runtime::default();
        let wakes = Arc::new(AtomicI32::new(0));
        let wakes_clone = wakes.clone();
        runtime.set_wake_callback(move || {
            wakes_clone.fetch_add(1, Ordering::SeqCst);
        });

        runtime.run_on_control(|| {});
        runtime.run_on_control(|| {});
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert!(runtime.inner.needs_frame());

        runtime.inner.callbacks.lock().clear();
        runtime.inner.go_dormant();
        runtime.run_on_control(|| {});
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scopes_register_and_release_nodes() {
        let runtime = Runtime::default();
        let scope = runtime.scope("card");
        let _a = scope.value(1.0_f64);
        let _b = scope.value(2.0_f64);
        assert_eq!(runtime.node_count(), 2);

        drop(scope);
        assert_eq!(runtime.node_count(), 0);
    }
}
