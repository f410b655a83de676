//! Style Computation
//!
//! A style computation maps cells to a [`PropertyBag`] for one view. It is
//! the only thing that crosses over to the renderer: the frame loop runs it
//! in the Rendering phase whenever a cell it read last time changed, and
//! hands each fresh bag to the renderer.
//!
//! The first evaluation happens in the first frame after creation, so a new
//! computation always produces one bag even if nothing it reads ever changes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use super::context::ReactiveContext;
use super::derived::panic_message;
use super::property::PropertyBag;
use super::runtime::RuntimeInner;
use crate::error::MotiveError;
use crate::graph::{NodeId, NodeKind};

struct StyleState {
    dependencies: Vec<NodeId>,
    evaluated: bool,
    last: Option<PropertyBag>,
}

pub(crate) struct StyleInner {
    id: NodeId,
    compute: Box<dyn Fn() -> PropertyBag + Send + Sync>,
    state: Mutex<StyleState>,
    runs: AtomicU64,
    detached: AtomicBool,
    runtime: Weak<RuntimeInner>,
}

impl StyleInner {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn is_evaluated(&self) -> bool {
        self.state.lock().evaluated
    }

    /// Mark detached. Returns `true` if the computation never ran.
    pub(crate) fn detach(&self) -> bool {
        self.detached.store(true, Ordering::SeqCst);
        !self.state.lock().evaluated
    }

    /// Re-run the computation if this is its first frame or one of its
    /// dependencies changed in `frame`. Returns the new bag.
    pub(crate) fn render(&self, runtime: &RuntimeInner, frame: u64) -> Option<PropertyBag> {
        let (dependencies, evaluated) = {
            let state = self.state.lock();
            (state.dependencies.clone(), state.evaluated)
        };

        let _ctx = ReactiveContext::enter(self.id, Some(frame));
        if evaluated {
            let mut dirty = false;
            for dependency in dependencies.iter().copied() {
                let Some(node) = runtime.lookup(dependency) else {
                    continue;
                };
                // Cycles below a style are absorbed by the derived cells
                // involved; the style just sees their frozen values.
                let _ = node.settle(frame);
                if node.changed_at() == frame {
                    dirty = true;
                    break;
                }
            }
            if !dirty {
                return None;
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.compute)()));
        let recorded = ReactiveContext::take_dependencies();
        self.runs.fetch_add(1, Ordering::Relaxed);

        if !evaluated {
            runtime.style_evaluated();
        }

        match outcome {
            Ok(bag) => {
                runtime.topology.lock().set_dependencies(self.id, &recorded);
                let mut state = self.state.lock();
                state.dependencies = recorded;
                state.evaluated = true;
                state.last = Some(bag.clone());
                trace!(style = %self.id, properties = bag.len(), "style recomputed");
                Some(bag)
            }
            Err(payload) => {
                let message = match payload.downcast_ref::<super::runtime::CycleSignal>() {
                    Some(signal) => format!("read a cyclic derived cell {}", signal.origin),
                    None => panic_message(payload.as_ref()),
                };
                error!(style = %self.id, %message, "style computation panicked, keeping last bag");
                // Keep watching whatever was read before the panic as well as
                // the previous dependencies, so a later change retries.
                let mut merged = dependencies;
                for node in recorded {
                    if !merged.contains(&node) {
                        merged.push(node);
                    }
                }
                runtime.topology.lock().set_dependencies(self.id, &merged);
                {
                    let mut state = self.state.lock();
                    state.dependencies = merged;
                    state.evaluated = true;
                }
                runtime.record_failure(MotiveError::EvaluationPanicked { node: self.id, message });
                None
            }
        }
    }
}

/// Handle to a registered style computation.
#[derive(Clone)]
pub struct StyleComputation {
    inner: Arc<StyleInner>,
}

impl StyleComputation {
    pub(crate) fn new<F>(compute: F, runtime: &Arc<RuntimeInner>) -> Self
    where
        F: Fn() -> PropertyBag + Send + Sync + 'static,
    {
        let inner = Arc::new(StyleInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            state: Mutex::new(StyleState {
                dependencies: Vec::new(),
                evaluated: false,
                last: None,
            }),
            runs: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            runtime: Arc::downgrade(runtime),
        });
        runtime.attach(inner.id, NodeKind::Style);
        runtime.styles.lock().insert(inner.id, Arc::clone(&inner));
        runtime.style_registered();
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The bag produced by the most recent successful evaluation.
    pub fn last(&self) -> Option<PropertyBag> {
        self.inner.state.lock().last.clone()
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Relaxed)
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst) || self.inner.runtime.strong_count() == 0
    }
}

impl std::fmt::Debug for StyleComputation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleComputation")
            .field("id", &self.inner.id)
            .field("runs", &self.run_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{FrameLoop, PropertyBag, Runtime};

    #[test]
    fn first_frame_evaluates_then_only_on_change() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let opacity = scope.value(1.0_f64);
        let unrelated = scope.value(0.0_f64);
        let style = scope.style({
            let opacity = opacity.clone();
            move || PropertyBag::new().with("opacity", opacity.read())
        });
        let mut frames = FrameLoop::new(&runtime);

        let report = frames.tick(0.0).unwrap();
        assert_eq!(report.styles.len(), 1);
        assert_eq!(style.run_count(), 1);

        unrelated.write(5.0);
        let report = frames.tick(16.0).unwrap();
        assert!(report.styles.is_empty());

        opacity.write(0.25);
        let report = frames.tick(32.0).unwrap();
        assert_eq!(report.styles[0].properties.number("opacity"), Some(0.25));
        assert_eq!(style.run_count(), 2);
    }

    #[test]
    fn panicking_style_keeps_previous_bag() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let width = scope.value(10.0_f64);
        let style = scope.style({
            let width = width.clone();
            move || {
                let w = width.read();
                assert!(w >= 0.0, "negative width");
                PropertyBag::new().with("width", w)
            }
        });
        let mut frames = FrameLoop::new(&runtime);
        frames.tick(0.0);

        width.write(-1.0);
        let report = frames.tick(16.0).unwrap();
        assert!(report.styles.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(style.last().unwrap().number("width"), Some(10.0));

        width.write(20.0);
        let report = frames.tick(32.0).unwrap();
        assert_eq!(report.styles[0].properties.number("width"), Some(20.0));
    }
}
