//! Derived Cell Implementation
//!
//! A derived cell caches the result of a pure computation over other cells
//! and recomputes only when one of the cells it read last time changed.
//!
//! # How Derived Cells Work
//!
//! 1. The computation runs once at creation, so a value always exists.
//!
//! 2. During a frame, cells are settled in dependency order. Settling checks
//!    whether any recorded dependency changed in this frame; only then does
//!    the computation run again.
//!
//! 3. A tracked read of a derived cell during a frame settles it first. This
//!    keeps reads consistent when a branch switches to a dependency the
//!    topological order has not visited yet.
//!
//! 4. Re-entering a cell that is already on the evaluation stack is a cycle.
//!    The cycle unwinds back to the re-entered cell; every cell on the way
//!    becomes Errored and keeps its last good value for good.
//!
//! A computation that panics for any other reason is logged and retried the
//! next time one of its dependencies changes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error};

use super::context::ReactiveContext;
use super::runtime::{CycleSignal, Reactive, RuntimeInner};
use crate::error::{MotiveError, Result};
use crate::graph::{NodeId, NodeKind};

/// Health of a derived cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellStatus {
    Ok,
    /// Frozen at its last good value.
    Errored(MotiveError),
    /// The owning scope unmounted.
    Detached,
}

struct DerivedState<T> {
    value: T,
    dependencies: Vec<NodeId>,
    settled_frame: u64,
    error: Option<MotiveError>,
}

pub(crate) struct DerivedInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    state: Mutex<DerivedState<T>>,
    changed_at: AtomicU64,
    evaluations: AtomicU64,
    detached: AtomicBool,
    runtime: Weak<RuntimeInner>,
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T> DerivedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn absorb_cycle(
        &self,
        runtime: &RuntimeInner,
        signal: CycleSignal,
        frame: u64,
    ) -> std::result::Result<(), CycleSignal> {
        let error = MotiveError::CyclicDependency { node: self.id };
        {
            let mut state = self.state.lock();
            state.settled_frame = frame;
            if state.error.is_none() {
                state.error = Some(error.clone());
            }
        }
        runtime.record_errored(self.id, error);
        if signal.origin == self.id {
            Ok(())
        } else {
            Err(signal)
        }
    }

    /// Run the computation for `frame`. The caller has already pushed this
    /// node's context entry.
    fn recompute(
        &self,
        runtime: &RuntimeInner,
        frame: u64,
    ) -> std::result::Result<(), CycleSignal> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.compute)()));
        let dependencies = ReactiveContext::take_dependencies();
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(value) => {
                let acyclic = runtime.topology.lock().set_dependencies(self.id, &dependencies);
                let mut state = self.state.lock();
                state.dependencies = dependencies;
                state.settled_frame = frame;
                if !acyclic {
                    let error = MotiveError::CyclicDependency { node: self.id };
                    state.error = Some(error.clone());
                    drop(state);
                    runtime.record_errored(self.id, error);
                    return Ok(());
                }
                if state.value != value {
                    state.value = value;
                    self.changed_at.store(frame, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(payload) => {
                if let Some(signal) = payload.downcast_ref::<CycleSignal>() {
                    return self.absorb_cycle(runtime, *signal, frame);
                }
                let message = panic_message(payload.as_ref());
                error!(node = %self.id, %message, "derived cell panicked, keeping last value");
                self.state.lock().settled_frame = frame;
                runtime.record_failure(MotiveError::EvaluationPanicked { node: self.id, message });
                Ok(())
            }
        }
    }
}

impl<T> Reactive for DerivedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Derived
    }

    fn changed_at(&self) -> u64 {
        self.changed_at.load(Ordering::SeqCst)
    }

    fn settle(&self, frame: u64) -> std::result::Result<(), CycleSignal> {
        let (dependencies, errored) = {
            let state = self.state.lock();
            if state.settled_frame >= frame {
                return Ok(());
            }
            (state.dependencies.clone(), state.error.is_some())
        };
        let Some(runtime) = self.runtime.upgrade() else {
            return Ok(());
        };

        if ReactiveContext::contains(self.id) {
            return Err(CycleSignal { origin: self.id });
        }
        if ReactiveContext::depth() >= runtime.config.max_evaluation_depth {
            // No frame to unwind back to; freeze here and let the error
            // propagate to everything above.
            let signal = CycleSignal { origin: self.id };
            let _ = self.absorb_cycle(&runtime, signal, frame);
            return Err(signal);
        }
        if errored {
            self.state.lock().settled_frame = frame;
            return Ok(());
        }

        let _ctx = ReactiveContext::enter(self.id, Some(frame));
        let mut dirty = false;
        for dependency in dependencies {
            let Some(node) = runtime.lookup(dependency) else {
                continue;
            };
            if let Err(signal) = node.settle(frame) {
                return self.absorb_cycle(&runtime, signal, frame);
            }
            if node.changed_at() == frame {
                dirty = true;
                break;
            }
        }

        if dirty {
            self.recompute(&runtime, frame)
        } else {
            self.state.lock().settled_frame = frame;
            Ok(())
        }
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

/// A read-only cell computed from other cells.
///
/// # Example
///
/// ```rust,ignore
/// let offset = scope.value(0.0);
/// let opacity = scope.derived({
///     let offset = offset.clone();
///     move || 1.0 - (offset.read().abs() / 300.0).min(1.0)
/// })?;
/// ```
pub struct DerivedCell<T> {
    inner: Arc<DerivedInner<T>>,
}

impl<T> DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Evaluate `compute` once and register the cell. Fails if the first
    /// evaluation panics.
    pub(crate) fn new<F>(compute: F, runtime: &Arc<RuntimeInner>) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = NodeId::new();
        let (outcome, dependencies) = {
            let _ctx = ReactiveContext::enter(id, None);
            let outcome = panic::catch_unwind(AssertUnwindSafe(&compute));
            (outcome, ReactiveContext::take_dependencies())
        };
        let value = outcome.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!(node = %id, %message, "derived cell panicked on first evaluation");
            MotiveError::EvaluationPanicked { node: id, message }
        })?;

        runtime.attach(id, NodeKind::Derived);
        if !runtime.topology.lock().set_dependencies(id, &dependencies) {
            runtime.topology.lock().remove_node(id);
            return Err(MotiveError::CyclicDependency { node: id });
        }

        let inner = Arc::new(DerivedInner {
            id,
            compute: Box::new(compute),
            state: Mutex::new(DerivedState {
                value,
                dependencies,
                // One behind the current frame, so a cell created mid-frame
                // still sees writes committed later in that frame.
                settled_frame: runtime.frame.load(Ordering::SeqCst).saturating_sub(1),
                error: None,
            }),
            changed_at: AtomicU64::new(0),
            evaluations: AtomicU64::new(1),
            detached: AtomicBool::new(false),
            runtime: Arc::downgrade(runtime),
        });
        runtime.register(inner.clone());
        debug!(node = %id, "derived cell created");
        Ok(Self { inner })
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Current value.
    ///
    /// Inside another derived cell or a style computation this records the
    /// dependency and, during a frame, brings this cell up to date first.
    pub fn read(&self) -> T {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.inner.id);
            if let Some(frame) = ReactiveContext::current_frame() {
                if let Err(signal) = self.inner.settle(frame) {
                    panic::resume_unwind(Box::new(signal));
                }
            }
        }
        self.inner.state.lock().value.clone()
    }

    /// Read the cached value without tracking or settling.
    pub fn peek(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    pub fn status(&self) -> CellStatus {
        if self.inner.detached.load(Ordering::SeqCst) {
            return CellStatus::Detached;
        }
        match &self.inner.state.lock().error {
            Some(error) => CellStatus::Errored(error.clone()),
            None => CellStatus::Ok,
        }
    }

    /// How many times the computation has run, including the first.
    pub fn evaluation_count(&self) -> u64 {
        self.inner.evaluations.load(Ordering::Relaxed)
    }
}

impl<T> Clone for DerivedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DerivedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DerivedCell")
            .field("id", &self.inner.id)
            .field("value", &state.value)
            .field("errored", &state.error.is_some())
            .finish()
    }
}
