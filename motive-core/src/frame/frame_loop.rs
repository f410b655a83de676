//! The per-frame state machine.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, error, trace, warn};

use super::renderer::Renderer;
use super::report::{FramePhase, FrameReport, StyleUpdate};
use crate::animation::{ActiveRun, AnimationResult};
use crate::graph::NodeId;
use crate::reactive::{Runtime, RuntimeInner, StagedOp, StyleInner};

/// Drives a [`Runtime`] one display refresh at a time.
///
/// The platform calls [`tick`](Self::tick) from its vsync callback while
/// [`needs_frame`](Self::needs_frame) is true, and otherwise waits for the
/// runtime's wake callback.
///
/// # Example
///
/// ```rust,ignore
/// let mut frames = FrameLoop::new(&runtime);
/// offset.animate_to(AnimationSpec::timing(100.0, TimingConfig::default())?)?;
/// for report in frames.run_until_idle(0.0, 600) {
///     for update in &report.styles {
///         view_tree.apply(update.node, &update.properties);
///     }
/// }
/// ```
pub struct FrameLoop {
    runtime: Runtime,
    last_ms: Option<f64>,
    epoch: Instant,
}

impl FrameLoop {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            last_ms: None,
            epoch: Instant::now(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Whether there is any work for another frame.
    pub fn needs_frame(&self) -> bool {
        self.runtime.inner.needs_frame()
    }

    /// Run one frame at `now_ms`. Returns `None` without doing anything when
    /// the runtime is dormant.
    pub fn tick(&mut self, now_ms: f64) -> Option<FrameReport> {
        self.frame(now_ms, None)
    }

    /// Like [`tick`](Self::tick), handing each fresh bag to `renderer` during
    /// the Rendering phase.
    pub fn tick_into(&mut self, now_ms: f64, renderer: &mut dyn Renderer) -> Option<FrameReport> {
        self.frame(now_ms, Some(renderer))
    }

    /// Tick with a timestamp from the monotonic clock.
    pub fn tick_now(&mut self) -> Option<FrameReport> {
        let now_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        self.tick(now_ms)
    }

    /// Tick at the configured frame interval starting from `start_ms` until
    /// the runtime goes dormant or `max_frames` frames have run.
    pub fn run_until_idle(&mut self, start_ms: f64, max_frames: usize) -> Vec<FrameReport> {
        let interval = self.runtime.config().frame_interval_ms;
        let mut reports = Vec::new();
        for i in 0..max_frames {
            match self.tick(start_ms + interval * i as f64) {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        reports
    }

    fn frame(
        &mut self,
        now_ms: f64,
        mut renderer: Option<&mut dyn Renderer>,
    ) -> Option<FrameReport> {
        let rt = Arc::clone(&self.runtime.inner);
        if !rt.needs_frame() {
            rt.go_dormant();
            return None;
        }

        let now_ms = match self.last_ms {
            Some(last) if now_ms < last => {
                warn!(now_ms, last_ms = last, "frame timestamp went backwards, holding time");
                last
            }
            _ => now_ms,
        };
        self.last_ms = Some(now_ms);

        let frame = rt.frame.fetch_add(1, Ordering::SeqCst) + 1;
        let span = debug_span!("frame", frame);
        let _enter = span.enter();

        let mut report = FrameReport {
            frame,
            timestamp_ms: now_ms,
            ..FrameReport::default()
        };

        set_phase(&rt, FramePhase::Collecting);
        collect(&rt, now_ms, &mut report);

        set_phase(&rt, FramePhase::Evaluating);
        evaluate(&rt, now_ms, &mut report);
        let changed = commit_changes(&rt, frame);

        set_phase(&rt, FramePhase::Propagating);
        let affected = rt.topology.lock().affected(changed.iter().copied());
        for node in &affected {
            let Some(reactive) = rt.lookup(*node) else {
                continue;
            };
            if let Err(signal) = reactive.settle(frame) {
                warn!(
                    node = %node,
                    kind = ?reactive.kind(),
                    origin = %signal.origin,
                    "cycle escaped settle, node frozen"
                );
            }
        }

        set_phase(&rt, FramePhase::Rendering);
        let affected: HashSet<NodeId> = affected.into_iter().collect();
        let styles: Vec<Arc<StyleInner>> = rt.styles.lock().values().cloned().collect();
        for style in styles {
            if style.is_evaluated() && !affected.contains(&style.id()) {
                continue;
            }
            if let Some(properties) = style.render(&rt, frame) {
                if let Some(renderer) = renderer.as_deref_mut() {
                    renderer.apply(style.id(), &properties);
                }
                report.styles.push(StyleUpdate {
                    node: style.id(),
                    properties,
                });
            }
        }

        report.errored = rt.errored.lock().keys().copied().collect();
        if rt.config.log_errored_cells {
            for node in &report.errored {
                warn!(node = %node, "derived cell is errored, holding last value");
            }
        }
        report.errors = std::mem::take(&mut *rt.failures.lock());

        set_phase(&rt, FramePhase::Flushing);
        flush(&rt);

        set_phase(&rt, FramePhase::Idle);
        if !rt.needs_frame() {
            rt.go_dormant();
            // Something may have been staged between the check and the
            // store; make sure the platform hears about it.
            if rt.needs_frame() {
                rt.request_frame();
            }
        }

        debug!(
            styles = report.styles.len(),
            completed = report.completed_runs,
            cancelled = report.cancelled_runs,
            "frame done"
        );
        Some(report)
    }
}

fn set_phase(rt: &RuntimeInner, phase: FramePhase) {
    *rt.phase.lock() = phase;
    trace!(?phase, "phase");
}

/// Apply staged operations in FIFO order. Frame tasks may stage more work,
/// which is applied in further rounds up to the evaluation depth limit.
fn collect(rt: &RuntimeInner, now_ms: f64, report: &mut FrameReport) {
    for round in 0..rt.config.max_evaluation_depth {
        let ops = std::mem::take(&mut *rt.staged.lock());
        if ops.is_empty() {
            return;
        }
        trace!(round, ops = ops.len(), "collecting staged operations");
        for op in ops {
            apply(rt, op, now_ms, report);
        }
    }
    if !rt.staged.lock().is_empty() {
        warn!("frame tasks kept staging work, deferring the rest to the next frame");
    }
}

fn apply(rt: &RuntimeInner, op: StagedOp, now_ms: f64, report: &mut FrameReport) {
    match op {
        StagedOp::Write { node, apply } => {
            if rt.cancel_run(node).is_some() {
                report.cancelled_runs += 1;
            }
            if !apply() {
                debug!(node = %node, "dropped write to detached cell");
            }
        }
        StagedOp::Animate { node, run } => {
            if !rt.registry.contains_key(&node) {
                debug!(node = %node, "dropped animation for detached cell");
                if let Some(callback) = run.callback {
                    rt.callbacks
                        .lock()
                        .push_back(Box::new(move || callback(AnimationResult { finished: false })));
                }
                return;
            }
            let inherited = rt.cancel_run(node);
            if inherited.is_some() {
                report.cancelled_runs += 1;
            }
            let active = ActiveRun::start(run, inherited, now_ms);
            rt.runs.lock().insert(node, active);
        }
        StagedOp::Cancel { node } => {
            if rt.cancel_run(node).is_some() {
                report.cancelled_runs += 1;
            }
        }
        StagedOp::Task(task) => {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(message = %panic_text(payload.as_ref()), "frame task panicked");
            }
        }
    }
}

/// Advance every active run in registration order.
fn evaluate(rt: &RuntimeInner, now_ms: f64, report: &mut FrameReport) {
    let env = rt.driver_env();
    let mut runs = rt.runs.lock();
    let completed: Vec<NodeId> = runs
        .iter_mut()
        .filter_map(|(node, run)| run.advance(now_ms, &env).then_some(*node))
        .collect();
    for node in completed {
        if let Some(mut run) = runs.shift_remove(&node) {
            trace!(run = ?run.id(), state = ?run.state(), node = %node, "run finished");
            report.completed_runs += 1;
            if let Some(callback) = run.take_completion() {
                rt.callbacks.lock().push_back(callback);
            }
        }
    }
}

/// Compare touched value cells with the previous frame boundary.
fn commit_changes(rt: &RuntimeInner, frame: u64) -> Vec<NodeId> {
    let touched = std::mem::take(&mut *rt.touched.lock());
    touched
        .into_iter()
        .filter(|node| rt.lookup(*node).is_some_and(|cell| cell.commit_frame(frame)))
        .collect()
}

/// Run the callbacks queued before this phase began. Anything they queue
/// waits for the next frame.
fn flush(rt: &RuntimeInner) {
    let batch: Vec<_> = rt.callbacks.lock().drain(..).collect();
    for callback in batch {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!(message = %panic_text(payload.as_ref()), "control callback panicked");
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    crate::reactive::panic_message(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnimationSpec, Easing, PropertyBag, TimingConfig};
    use parking_lot::Mutex;

    #[test]
    fn dormant_runtime_produces_no_frames() {
        let runtime = Runtime::default();
        let mut frames = FrameLoop::new(&runtime);
        assert!(!frames.needs_frame());
        assert!(frames.tick(0.0).is_none());

        let scope = runtime.scope("test");
        let cell = scope.value(1);
        cell.write(2);
        assert!(frames.needs_frame());
        assert!(frames.tick(16.0).is_some());
        assert!(frames.tick(32.0).is_none());
    }

    #[test]
    fn phases_run_in_order_and_end_idle() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let rt = runtime.clone();
        let sink = seen.clone();
        let cell = scope.value(0.0_f64);
        let _style = scope.style({
            let rt = rt.clone();
            let sink = sink.clone();
            let cell = cell.clone();
            move || {
                sink.lock().push(rt.phase());
                PropertyBag::new().with("x", cell.read())
            }
        });
        runtime.run_on_frame({
            let rt = rt.clone();
            let sink = sink.clone();
            move || sink.lock().push(rt.phase())
        });
        runtime.run_on_control(move || sink.lock().push(rt.phase()));

        FrameLoop::new(&runtime).tick(0.0);
        assert_eq!(
            *seen.lock(),
            vec![FramePhase::Collecting, FramePhase::Rendering, FramePhase::Flushing]
        );
        assert_eq!(runtime.phase(), FramePhase::Idle);
    }

    #[test]
    fn frame_tasks_apply_their_writes_in_the_same_frame() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let cell = scope.value(0);
        let writer = cell.clone();
        runtime.run_on_frame(move || writer.write(9));

        FrameLoop::new(&runtime).tick(0.0);
        assert_eq!(cell.read(), 9);
    }

    #[test]
    fn derived_created_by_a_frame_task_sees_writes_from_that_frame() {
        let runtime = Runtime::default();
        let scope = Arc::new(runtime.scope("test"));
        let source = scope.value(1);
        let slot = Arc::new(Mutex::new(None));

        let task_scope = scope.clone();
        let writer = source.clone();
        let sink = slot.clone();
        runtime.run_on_frame(move || {
            writer.write(5);
            let reader = writer.clone();
            let doubled = task_scope.derived(move || reader.read() * 2).unwrap();
            *sink.lock() = Some(doubled);
        });

        let mut frames = FrameLoop::new(&runtime);
        frames.tick(0.0);
        let doubled = slot.lock().take().unwrap();
        assert_eq!(source.read(), 5);
        assert_eq!(doubled.peek(), 10);

        frames.tick(16.0);
        assert_eq!(doubled.peek(), 10);
    }

    #[test]
    fn callbacks_queued_while_flushing_wait_for_the_next_frame() {
        let runtime = Runtime::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let rt = runtime.clone();
        let sink = order.clone();
        runtime.run_on_control(move || {
            sink.lock().push(1);
            let sink = sink.clone();
            rt.run_on_control(move || sink.lock().push(2));
        });

        let mut frames = FrameLoop::new(&runtime);
        frames.tick(0.0);
        assert_eq!(*order.lock(), vec![1]);
        frames.tick(16.0);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn renderer_receives_bags_during_rendering() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let x = scope.value(0.0_f64);
        let style = scope.style({
            let x = x.clone();
            move || PropertyBag::new().with("translateX", x.read())
        });
        x.animate_to(AnimationSpec::timing(10.0, TimingConfig::new(32.0, Easing::Linear)).unwrap())
            .unwrap();

        let mut applied = Vec::new();
        let mut renderer =
            |node: NodeId, bag: &PropertyBag| applied.push((node, bag.number("translateX")));
        let mut frames = FrameLoop::new(&runtime);
        frames.tick_into(0.0, &mut renderer);
        frames.tick_into(16.0, &mut renderer);
        frames.tick_into(32.0, &mut renderer);
        assert!(frames.tick_into(48.0, &mut renderer).is_none());

        assert_eq!(
            applied,
            vec![(style.id(), Some(0.0)), (style.id(), Some(5.0)), (style.id(), Some(10.0))]
        );
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let runtime = Runtime::default();
        let scope = runtime.scope("test");
        let cell = scope.value(0);
        let mut frames = FrameLoop::new(&runtime);

        cell.write(1);
        frames.tick(100.0);
        cell.write(2);
        let report = frames.tick(50.0).unwrap();
        assert_eq!(report.timestamp_ms, 100.0);
    }
}
