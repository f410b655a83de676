//! Gesture recognizers
//!
//! A recognizer watches the events of a touch sequence and decides whether
//! its gesture happened. It never activates on its own: once its criteria
//! are met it *claims* activation and the bridge decides, based on the
//! composition, whether the claim is granted now, has to wait for other
//! recognizers to fail, or loses.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::error;

use super::event::{EventPhase, GestureEvent};
use crate::animation::Vec2;
use crate::error::{MotiveError, Result};
use crate::reactive::panic_message;

/// Lifecycle of a recognizer within one touch sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GestureState {
    Undetermined,
    /// Tracking the touch sequence, criteria not met yet.
    Began,
    /// Criteria met, waiting for a higher-priority recognizer to fail.
    AwaitingFailure,
    Active,
    End,
    Failed,
    Cancelled,
}

impl GestureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GestureState::End | GestureState::Failed | GestureState::Cancelled)
    }

    /// Still undecided and able to block recognizers that wait on it.
    pub fn is_pending(self) -> bool {
        matches!(self, GestureState::Began | GestureState::AwaitingFailure)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanConfig {
    /// Distance the focal point must travel before the pan claims.
    pub min_distance: f64,
    pub min_pointers: u32,
    pub max_pointers: u32,
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            min_distance: 10.0,
            min_pointers: 1,
            max_pointers: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub number_of_taps: u32,
    /// Longest a single press may last.
    pub max_duration_ms: f64,
    /// Longest gap between one release and the next press.
    pub max_delay_ms: f64,
    /// How far a press may drift and still count.
    pub max_distance: f64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            number_of_taps: 1,
            max_duration_ms: 500.0,
            max_delay_ms: 300.0,
            max_distance: 10.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinchConfig {
    /// Minimum `|scale - 1|` before the pinch claims.
    pub scale_threshold: f64,
}

impl Default for PinchConfig {
    fn default() -> Self {
        Self { scale_threshold: 0.05 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Radians.
    pub rotation_threshold: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_threshold: 0.08,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongPressConfig {
    pub min_duration_ms: f64,
    pub max_distance: f64,
}

impl Default for LongPressConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 500.0,
            max_distance: 10.0,
        }
    }
}

fn non_negative(what: &'static str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MotiveError::invalid(what, format!("{field} must be non-negative, got {value}")))
    }
}

fn positive(what: &'static str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MotiveError::invalid(what, format!("{field} must be positive, got {value}")))
    }
}

/// The kind of gesture a recognizer looks for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecognizerKind {
    Pan(PanConfig),
    Tap(TapConfig),
    Pinch(PinchConfig),
    Rotation(RotationConfig),
    LongPress(LongPressConfig),
}

impl RecognizerKind {
    pub fn validate(&self) -> Result<()> {
        match self {
            RecognizerKind::Pan(c) => {
                non_negative("pan", "min_distance", c.min_distance)?;
                if c.min_pointers == 0 || c.min_pointers > c.max_pointers {
                    return Err(MotiveError::invalid(
                        "pan",
                        format!("pointer range {}..={} is empty", c.min_pointers, c.max_pointers),
                    ));
                }
                Ok(())
            }
            RecognizerKind::Tap(c) => {
                if c.number_of_taps == 0 {
                    return Err(MotiveError::invalid("tap", "number_of_taps must be at least 1"));
                }
                positive("tap", "max_duration_ms", c.max_duration_ms)?;
                non_negative("tap", "max_delay_ms", c.max_delay_ms)?;
                non_negative("tap", "max_distance", c.max_distance)
            }
            RecognizerKind::Pinch(c) => positive("pinch", "scale_threshold", c.scale_threshold),
            RecognizerKind::Rotation(c) => {
                positive("rotation", "rotation_threshold", c.rotation_threshold)
            }
            RecognizerKind::LongPress(c) => {
                non_negative("long press", "min_duration_ms", c.min_duration_ms)?;
                non_negative("long press", "max_distance", c.max_distance)
            }
        }
    }

    /// Discrete gestures report start and end together on activation.
    pub fn is_discrete(&self) -> bool {
        matches!(self, RecognizerKind::Tap(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecognizerKind::Pan(_) => "pan",
            RecognizerKind::Tap(_) => "tap",
            RecognizerKind::Pinch(_) => "pinch",
            RecognizerKind::Rotation(_) => "rotation",
            RecognizerKind::LongPress(_) => "long_press",
        }
    }
}

/// What a pending recognizer concluded from an event or the passage of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    Track,
    Claim,
    Fail,
}

/// Per-sequence bookkeeping for the time- and distance-based criteria.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tracker {
    down_at: Option<f64>,
    taps: u32,
    /// Time by which the next press must arrive.
    next_press_by: Option<f64>,
}

impl Tracker {
    /// Interpret an event while the recognizer is pending. `claimed` is set
    /// once the criteria were met and the claim is waiting on the bridge.
    pub(crate) fn on_event(
        &mut self,
        kind: &RecognizerKind,
        event: &GestureEvent,
        claimed: bool,
    ) -> Progress {
        if event.phase == EventPhase::Cancel {
            return Progress::Fail;
        }
        if claimed {
            // A claimed continuous gesture still needs the touch to last
            // until it is granted; a discrete one has already happened.
            return match (kind.is_discrete(), event.phase) {
                (false, EventPhase::End) => Progress::Fail,
                _ => Progress::Track,
            };
        }

        match kind {
            RecognizerKind::Pan(c) => match event.phase {
                EventPhase::Start => Progress::Track,
                EventPhase::Update => {
                    if event.number_of_pointers > c.max_pointers {
                        Progress::Fail
                    } else if event.number_of_pointers >= c.min_pointers
                        && event.translation.length() >= c.min_distance
                    {
                        Progress::Claim
                    } else {
                        Progress::Track
                    }
                }
                _ => Progress::Fail,
            },
            RecognizerKind::Tap(c) => match event.phase {
                EventPhase::Start => {
                    self.down_at = Some(event.timestamp);
                    self.next_press_by = None;
                    Progress::Track
                }
                EventPhase::Update => {
                    if event.translation.length() > c.max_distance
                        || self.held_too_long(c, event.timestamp)
                    {
                        Progress::Fail
                    } else {
                        Progress::Track
                    }
                }
                EventPhase::End => {
                    if event.translation.length() > c.max_distance
                        || self.held_too_long(c, event.timestamp)
                    {
                        return Progress::Fail;
                    }
                    self.down_at = None;
                    self.taps += 1;
                    if self.taps >= c.number_of_taps {
                        Progress::Claim
                    } else {
                        self.next_press_by = Some(event.timestamp + c.max_delay_ms);
                        Progress::Track
                    }
                }
                EventPhase::Cancel => Progress::Fail,
            },
            RecognizerKind::Pinch(c) => match event.phase {
                EventPhase::Start => Progress::Track,
                EventPhase::Update => {
                    if event.number_of_pointers >= 2
                        && (event.scale - 1.0).abs() >= c.scale_threshold
                    {
                        Progress::Claim
                    } else {
                        Progress::Track
                    }
                }
                _ => Progress::Fail,
            },
            RecognizerKind::Rotation(c) => match event.phase {
                EventPhase::Start => Progress::Track,
                EventPhase::Update => {
                    if event.number_of_pointers >= 2
                        && event.rotation.abs() >= c.rotation_threshold
                    {
                        Progress::Claim
                    } else {
                        Progress::Track
                    }
                }
                _ => Progress::Fail,
            },
            RecognizerKind::LongPress(c) => match event.phase {
                EventPhase::Start => {
                    self.down_at = Some(event.timestamp);
                    self.check_hold(c, event.timestamp)
                }
                EventPhase::Update => {
                    if event.translation.length() > c.max_distance {
                        Progress::Fail
                    } else {
                        self.check_hold(c, event.timestamp)
                    }
                }
                _ => Progress::Fail,
            },
        }
    }

    /// Check the time windows at `now`.
    pub(crate) fn on_time(&mut self, kind: &RecognizerKind, now: f64, claimed: bool) -> Progress {
        if claimed {
            return Progress::Track;
        }
        match kind {
            RecognizerKind::Tap(c) => {
                if self.held_too_long(c, now) {
                    return Progress::Fail;
                }
                match self.next_press_by {
                    Some(deadline) if self.down_at.is_none() && now > deadline => Progress::Fail,
                    _ => Progress::Track,
                }
            }
            RecognizerKind::LongPress(c) => self.check_hold(c, now),
            _ => Progress::Track,
        }
    }

    /// Earliest time at which `on_time` could change its answer.
    pub(crate) fn deadline(&self, kind: &RecognizerKind) -> Option<f64> {
        match kind {
            RecognizerKind::Tap(c) => match self.down_at {
                Some(down) => Some(down + c.max_duration_ms),
                None => self.next_press_by,
            },
            RecognizerKind::LongPress(c) => self.down_at.map(|down| down + c.min_duration_ms),
            _ => None,
        }
    }

    fn held_too_long(&self, c: &TapConfig, now: f64) -> bool {
        self.down_at.is_some_and(|down| now - down > c.max_duration_ms)
    }

    fn check_hold(&self, c: &LongPressConfig, now: f64) -> Progress {
        match self.down_at {
            Some(down) if now - down >= c.min_duration_ms => Progress::Claim,
            _ => Progress::Track,
        }
    }
}

type EventHandler = Box<dyn FnMut(&GestureEvent) + Send>;
type EndHandler = Box<dyn FnMut(&GestureEvent, Vec2) + Send>;
type CancelHandler = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub(crate) struct Handlers {
    on_start: Option<EventHandler>,
    on_update: Option<EventHandler>,
    on_end: Option<EndHandler>,
    on_cancel: Option<CancelHandler>,
}

fn guarded(tag: &str, hook: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            recognizer = tag,
            hook,
            message = %panic_message(payload.as_ref()),
            "gesture handler panicked"
        );
    }
}

impl Handlers {
    pub(crate) fn start(&mut self, tag: &str, event: &GestureEvent) {
        if let Some(f) = self.on_start.as_mut() {
            guarded(tag, "on_start", || f(event));
        }
    }

    pub(crate) fn update(&mut self, tag: &str, event: &GestureEvent) {
        if let Some(f) = self.on_update.as_mut() {
            guarded(tag, "on_update", || f(event));
        }
    }

    pub(crate) fn end(&mut self, tag: &str, event: &GestureEvent) {
        if let Some(f) = self.on_end.as_mut() {
            let velocity = event.velocity;
            guarded(tag, "on_end", || f(event, velocity));
        }
    }

    pub(crate) fn cancel(&mut self, tag: &str) {
        if let Some(f) = self.on_cancel.as_mut() {
            guarded(tag, "on_cancel", f);
        }
    }
}

/// A configured recognizer with its handlers, ready to be composed.
///
/// # Example
///
/// ```rust,ignore
/// let drag = Recognizer::pan(PanConfig::default())?
///     .with_tag("drag")
///     .on_update(move |e| offset.write(start + e.translation))
///     .on_end(move |_, v| offset.animate_to(AnimationSpec::decay(v, DecayConfig::default())?));
/// ```
pub struct Recognizer {
    pub(crate) tag: Option<String>,
    pub(crate) kind: RecognizerKind,
    pub(crate) handlers: Handlers,
    pub(crate) requires_failure_of: Vec<String>,
}

impl Recognizer {
    pub fn new(kind: RecognizerKind) -> Result<Self> {
        kind.validate()?;
        Ok(Self {
            tag: None,
            kind,
            handlers: Handlers::default(),
            requires_failure_of: Vec::new(),
        })
    }

    pub fn pan(config: PanConfig) -> Result<Self> {
        Self::new(RecognizerKind::Pan(config))
    }

    pub fn tap(config: TapConfig) -> Result<Self> {
        Self::new(RecognizerKind::Tap(config))
    }

    pub fn pinch(config: PinchConfig) -> Result<Self> {
        Self::new(RecognizerKind::Pinch(config))
    }

    pub fn rotation(config: RotationConfig) -> Result<Self> {
        Self::new(RecognizerKind::Rotation(config))
    }

    pub fn long_press(config: LongPressConfig) -> Result<Self> {
        Self::new(RecognizerKind::LongPress(config))
    }

    /// Name used for `require_to_fail` edges, state queries and logs.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Do not activate until the recognizer tagged `tag` has failed.
    pub fn require_to_fail(mut self, tag: impl Into<String>) -> Self {
        self.requires_failure_of.push(tag.into());
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&GestureEvent) + Send + 'static,
    {
        self.handlers.on_start = Some(Box::new(f));
        self
    }

    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: FnMut(&GestureEvent) + Send + 'static,
    {
        self.handlers.on_update = Some(Box::new(f));
        self
    }

    /// Called when the gesture ends, with the release velocity.
    pub fn on_end<F>(mut self, f: F) -> Self
    where
        F: FnMut(&GestureEvent, Vec2) + Send + 'static,
    {
        self.handlers.on_end = Some(Box::new(f));
        self
    }

    pub fn on_cancel<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.handlers.on_cancel = Some(Box::new(f));
        self
    }

    pub fn kind(&self) -> &RecognizerKind {
        &self.kind
    }
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("requires_failure_of", &self.requires_failure_of)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configs_are_validated() {
        assert!(Recognizer::tap(TapConfig {
            number_of_taps: 0,
            ..TapConfig::default()
        })
        .is_err());
        assert!(Recognizer::pan(PanConfig {
            min_pointers: 3,
            max_pointers: 2,
            ..PanConfig::default()
        })
        .is_err());
        assert!(Recognizer::pinch(PinchConfig { scale_threshold: 0.0 }).is_err());
        assert!(Recognizer::long_press(LongPressConfig {
            min_duration_ms: -1.0,
            ..LongPressConfig::default()
        })
        .is_err());
        assert!(Recognizer::rotation(RotationConfig::default()).is_ok());
    }

    #[test]
    fn pan_claims_after_min_distance() {
        let kind = RecognizerKind::Pan(PanConfig::default());
        let mut tracker = Tracker::default();
        assert_eq!(tracker.on_event(&kind, &GestureEvent::start(0.0), false), Progress::Track);
        let small = GestureEvent::update(10.0).with_translation(3.0, 4.0);
        assert_eq!(tracker.on_event(&kind, &small, false), Progress::Track);
        let far = GestureEvent::update(20.0).with_translation(6.0, 8.0);
        assert_eq!(tracker.on_event(&kind, &far, false), Progress::Claim);
    }

    #[test]
    fn double_tap_waits_for_second_press() {
        let kind = RecognizerKind::Tap(TapConfig {
            number_of_taps: 2,
            ..TapConfig::default()
        });
        let mut tracker = Tracker::default();
        tracker.on_event(&kind, &GestureEvent::start(0.0), false);
        assert_eq!(tracker.on_event(&kind, &GestureEvent::end(50.0), false), Progress::Track);
        assert_eq!(tracker.deadline(&kind), Some(350.0));
        assert_eq!(tracker.on_time(&kind, 300.0, false), Progress::Track);
        assert_eq!(tracker.on_time(&kind, 351.0, false), Progress::Fail);
    }

    #[test]
    fn tap_fails_when_held_or_dragged() {
        let kind = RecognizerKind::Tap(TapConfig::default());
        let mut held = Tracker::default();
        held.on_event(&kind, &GestureEvent::start(0.0), false);
        assert_eq!(held.on_time(&kind, 600.0, false), Progress::Fail);

        let mut dragged = Tracker::default();
        dragged.on_event(&kind, &GestureEvent::start(0.0), false);
        let moved = GestureEvent::update(20.0).with_translation(30.0, 0.0);
        assert_eq!(dragged.on_event(&kind, &moved, false), Progress::Fail);
    }

    #[test]
    fn long_press_claims_on_time() {
        let kind = RecognizerKind::LongPress(LongPressConfig::default());
        let mut tracker = Tracker::default();
        tracker.on_event(&kind, &GestureEvent::start(100.0), false);
        assert_eq!(tracker.on_time(&kind, 400.0, false), Progress::Track);
        assert_eq!(tracker.on_time(&kind, 600.0, false), Progress::Claim);
    }
}
