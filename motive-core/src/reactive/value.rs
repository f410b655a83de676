//! Value Cell Implementation
//!
//! A value cell is the mutable source of the graph. It holds one value and
//! is written either by the application (staged, applied at the next frame)
//! or by the animation run currently driving it (committed during the
//! Evaluating phase).
//!
//! # How Value Cells Work
//!
//! 1. A read inside a derived cell or style computation records the cell as
//!    a dependency. The cell joins the dependency topology the first time
//!    that happens, so cells nobody observes stay out of the graph.
//!
//! 2. `write`, `update`, `animate_to` and `cancel_animation` never touch the
//!    value directly. They stage an operation that the frame loop applies in
//!    its Collecting phase, in the order the operations were made.
//!
//! 3. At the end of Evaluating the frame loop compares each touched cell
//!    against its value at the previous frame boundary. Only a real change
//!    propagates.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{Reactive, RuntimeInner, StagedOp};
use crate::animation::{
    Animatable, AnimatedTarget, AnimationSpec, CompletionCallback, Components, PendingRun,
};
use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

pub(crate) struct ValueInner<T> {
    id: NodeId,
    value: RwLock<T>,
    /// Value at the last frame boundary.
    previous: Mutex<T>,
    changed_at: AtomicU64,
    attached: AtomicBool,
    detached: AtomicBool,
    runtime: Weak<RuntimeInner>,
}

impl<T> ValueInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn attach(&self) {
        if !self.attached.swap(true, Ordering::SeqCst) {
            if let Some(runtime) = self.runtime.upgrade() {
                runtime.attach(self.id, NodeKind::Value);
            }
        }
    }

    /// Apply a staged write. Returns `false` once the owning scope is gone.
    fn commit(&self, value: T) -> bool {
        if self.detached.load(Ordering::SeqCst) {
            return false;
        }
        *self.value.write() = value;
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.touch(self.id);
        }
        true
    }
}

impl<T> Reactive for ValueInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Value
    }

    fn changed_at(&self) -> u64 {
        self.changed_at.load(Ordering::SeqCst)
    }

    fn commit_frame(&self, frame: u64) -> bool {
        let current = self.value.read();
        let mut previous = self.previous.lock();
        if *current == *previous {
            return false;
        }
        *previous = current.clone();
        self.changed_at.store(frame, Ordering::SeqCst);
        true
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

impl<T: Animatable> AnimatedTarget for ValueInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn components(&self) -> Components {
        self.value.read().to_components()
    }

    fn commit_components(&self, components: &[f64]) {
        self.commit(T::from_components(components));
    }
}

/// A mutable value owned by a [`Scope`](crate::Scope).
///
/// Handles are cheap to clone and can be moved into gesture handlers and
/// completion callbacks on other threads.
///
/// # Example
///
/// ```rust,ignore
/// let offset = scope.value(0.0);
/// offset.write(120.0);          // visible after the next frame
/// offset.animate_to(AnimationSpec::spring(0.0, SpringConfig::default())?);
/// ```
pub struct ValueCell<T> {
    inner: Arc<ValueInner<T>>,
}

impl<T> ValueCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(initial: T, runtime: &Arc<RuntimeInner>) -> Self {
        let inner = Arc::new(ValueInner {
            id: NodeId::new(),
            value: RwLock::new(initial.clone()),
            previous: Mutex::new(initial),
            changed_at: AtomicU64::new(0),
            attached: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            runtime: Arc::downgrade(runtime),
        });
        runtime.register(inner.clone());
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Current committed value.
    ///
    /// Inside a derived cell or style computation this also records the
    /// cell as a dependency.
    pub fn read(&self) -> T {
        if ReactiveContext::is_active() {
            self.inner.attach();
            ReactiveContext::track_dependency(self.inner.id);
        }
        self.inner.value.read().clone()
    }

    /// Read without recording a dependency.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Stage a new value. Cancels the cell's running animation when applied.
    pub fn write(&self, value: T) {
        let inner = Arc::clone(&self.inner);
        self.stage(StagedOp::Write {
            node: self.inner.id,
            apply: Box::new(move || inner.commit(value)),
        });
    }

    /// Stage a write computed from the value current when it is applied.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.stage(StagedOp::Write {
            node: self.inner.id,
            apply: Box::new(move || {
                let next = f(&inner.value.read());
                inner.commit(next)
            }),
        });
    }

    /// Stop the running animation, leaving the value where the last frame
    /// put it. The run's callback receives `finished: false`.
    pub fn cancel_animation(&self) {
        self.stage(StagedOp::Cancel { node: self.inner.id });
    }

    /// Whether an animation run is currently driving this cell.
    pub fn is_animating(&self) -> bool {
        self.inner
            .runtime
            .upgrade()
            .is_some_and(|runtime| runtime.runs.lock().contains_key(&self.inner.id))
    }

    /// Whether the owning scope has unmounted.
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst)
    }

    fn stage(&self, op: StagedOp) {
        if self.is_detached() {
            warn!(node = %self.inner.id, "ignoring operation on detached value cell");
            return;
        }
        if let Some(evaluating) = ReactiveContext::current_node() {
            trace!(
                node = %self.inner.id,
                inside = %evaluating,
                "write staged from inside an evaluation"
            );
        }
        self.inner.attach();
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.stage(op);
        }
    }
}

impl<T: Animatable> ValueCell<T> {
    /// Start `spec` at the next frame, replacing any running animation.
    pub fn animate_to(&self, spec: AnimationSpec<T>) -> Result<()> {
        self.start(spec, None)
    }

    /// Like [`animate_to`](Self::animate_to), with a callback run in the
    /// Flushing phase once the animation ends or is interrupted.
    pub fn animate_to_with<F>(&self, spec: AnimationSpec<T>, on_complete: F) -> Result<()>
    where
        F: FnOnce(crate::animation::AnimationResult) + Send + 'static,
    {
        self.start(spec, Some(Box::new(on_complete)))
    }

    fn start(&self, spec: AnimationSpec<T>, callback: Option<CompletionCallback>) -> Result<()> {
        spec.validate()?;
        let run = PendingRun {
            target: self.inner.clone(),
            program: spec.lower(),
            callback,
        };
        self.stage(StagedOp::Animate {
            node: self.inner.id,
            run,
        });
        Ok(())
    }
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
