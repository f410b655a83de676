//! Gesture Bridge
//!
//! The bridge feeds platform events into a composition of recognizers and
//! calls their handlers. Handlers typically write value cells or start
//! animations; both are staged, so the bridge can live on whatever thread
//! the platform delivers input on.
//!
//! # Resolution
//!
//! After every event, and whenever [`GestureBridge::advance`] moves time
//! forward, claims are resolved in rounds until nothing changes:
//!
//! 1. A claiming member fails if an exclusive rival, or a member it waits
//!    for, is already active.
//!
//! 2. A claiming member waits (AwaitingFailure) while anything it waits for
//!    is still pending.
//!
//! 3. The remaining claims are granted in declaration order. Granting one
//!    fails every exclusive rival and every member waiting on it, including
//!    rivals that claimed in the same round. Such a same-round conflict is
//!    the ambiguous case and is reported when the runtime asks for it.
//!
//! Arrival order of events never matters beyond which round a claim lands
//! in, so the outcome for a given event sequence is deterministic.

use tracing::{debug, trace, warn};

use super::composition::{Gesture, Plan};
use super::event::{EventPhase, GestureEvent};
use super::recognizer::{GestureState, Progress, Recognizer, Tracker};
use crate::config::RuntimeConfig;
use crate::error::{MotiveError, Result};

struct Member {
    tag: String,
    recognizer: Recognizer,
    state: GestureState,
    claimed: bool,
    tracker: Tracker,
    last_event: Option<GestureEvent>,
}

impl Member {
    fn reset(&mut self) {
        self.state = GestureState::Undetermined;
        self.claimed = false;
        self.tracker = Tracker::default();
        self.last_event = None;
    }
}

/// Runs one gesture composition for one view.
pub struct GestureBridge {
    name: String,
    members: Vec<Member>,
    exclusive: Vec<Vec<bool>>,
    waits_for: Vec<Vec<usize>>,
    pointer_down: bool,
    flag_ambiguity: bool,
    diagnostics: Vec<MotiveError>,
}

impl GestureBridge {
    /// Compile `gesture`. Fails on duplicate or unknown tags and on cyclic
    /// wait-for edges.
    pub fn new(
        name: impl Into<String>,
        gesture: impl Into<Gesture>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let plan = Plan::compile(gesture.into())?;
        let name = name.into();
        debug!(bridge = %name, recognizers = plan.members.len(), "gesture bridge created");
        Ok(Self {
            name,
            members: plan
                .members
                .into_iter()
                .map(|(tag, recognizer)| Member {
                    tag,
                    recognizer,
                    state: GestureState::Undetermined,
                    claimed: false,
                    tracker: Tracker::default(),
                    last_event: None,
                })
                .collect(),
            exclusive: plan.exclusive,
            waits_for: plan.waits_for,
            pointer_down: false,
            flag_ambiguity: config.flag_gesture_ambiguity,
            diagnostics: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feed one platform event.
    pub fn handle(&mut self, event: &GestureEvent) {
        trace!(bridge = %self.name, phase = ?event.phase, t = event.timestamp, "gesture event");
        // Time windows that elapsed before this event close first, which
        // may finish the previous touch sequence.
        self.check_time(event.timestamp);
        self.resolve();
        self.maybe_reset();

        self.pointer_down = event.pointer_down();
        for i in 0..self.members.len() {
            self.deliver(i, event);
        }
        self.resolve();
        self.maybe_reset();
    }

    /// Move time forward without an event, closing tap windows and
    /// completing long presses. Call at `next_deadline()`.
    pub fn advance(&mut self, now_ms: f64) {
        self.check_time(now_ms);
        self.resolve();
        self.maybe_reset();
    }

    /// Earliest time at which `advance` could change anything.
    pub fn next_deadline(&self) -> Option<f64> {
        self.members
            .iter()
            .filter(|m| m.state.is_pending() && !m.claimed)
            .filter_map(|m| m.tracker.deadline(&m.recognizer.kind))
            .min_by(f64::total_cmp)
    }

    pub fn state(&self, tag: &str) -> Option<GestureState> {
        self.members.iter().find(|m| m.tag == tag).map(|m| m.state)
    }

    pub fn states(&self) -> Vec<(String, GestureState)> {
        self.members.iter().map(|m| (m.tag.clone(), m.state)).collect()
    }

    pub fn is_pointer_down(&self) -> bool {
        self.pointer_down
    }

    /// Ambiguity reports collected since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<MotiveError> {
        std::mem::take(&mut self.diagnostics)
    }

    fn deliver(&mut self, i: usize, event: &GestureEvent) {
        let member = &mut self.members[i];
        match member.state {
            GestureState::Undetermined => {
                if event.phase != EventPhase::Start {
                    return;
                }
                member.state = GestureState::Began;
                trace!(recognizer = %member.tag, "began");
                self.track(i, event);
            }
            GestureState::Began | GestureState::AwaitingFailure => self.track(i, event),
            GestureState::Active => {
                let Member {
                    tag,
                    recognizer,
                    state,
                    ..
                } = member;
                match event.phase {
                    EventPhase::Start | EventPhase::Update => {
                        recognizer.handlers.update(tag, event)
                    }
                    EventPhase::End => {
                        *state = GestureState::End;
                        recognizer.handlers.end(tag, event);
                        debug!(recognizer = %tag, "ended");
                    }
                    EventPhase::Cancel => {
                        *state = GestureState::Cancelled;
                        recognizer.handlers.cancel(tag);
                        debug!(recognizer = %tag, "cancelled");
                    }
                }
            }
            GestureState::End | GestureState::Failed | GestureState::Cancelled => {}
        }
    }

    fn track(&mut self, i: usize, event: &GestureEvent) {
        let member = &mut self.members[i];
        // A claimed tap keeps the event it was recognized on.
        if !(member.claimed && member.recognizer.kind.is_discrete()) {
            member.last_event = Some(event.clone());
        }
        match member.tracker.on_event(&member.recognizer.kind, event, member.claimed) {
            Progress::Track => {}
            Progress::Claim => {
                trace!(recognizer = %member.tag, "claims activation");
                member.claimed = true;
            }
            Progress::Fail => self.fail(i),
        }
    }

    fn check_time(&mut self, now_ms: f64) {
        for i in 0..self.members.len() {
            let member = &mut self.members[i];
            if !member.state.is_pending() {
                continue;
            }
            match member.tracker.on_time(&member.recognizer.kind, now_ms, member.claimed) {
                Progress::Track => {}
                Progress::Claim => {
                    trace!(recognizer = %member.tag, "claims activation after hold");
                    member.claimed = true;
                    if let Some(event) = member.last_event.as_mut() {
                        event.timestamp = now_ms;
                    }
                }
                Progress::Fail => self.fail(i),
            }
        }
    }

    fn fail(&mut self, i: usize) {
        let member = &mut self.members[i];
        if member.state.is_terminal() || member.state == GestureState::Active {
            return;
        }
        member.state = GestureState::Failed;
        member.claimed = false;
        trace!(recognizer = %member.tag, "failed");
    }

    fn resolve(&mut self) {
        loop {
            let mut changed = false;
            let mut eligible = Vec::new();

            for i in 0..self.members.len() {
                let member = &self.members[i];
                if !member.claimed || !member.state.is_pending() {
                    continue;
                }
                let beaten = (0..self.members.len()).any(|j| {
                    self.members[j].state == GestureState::Active
                        && (self.exclusive[i][j] || self.waits_for[i].contains(&j))
                });
                if beaten {
                    self.fail(i);
                    changed = true;
                    continue;
                }
                let blocked = self.waits_for[i].iter().any(|&j| self.members[j].state.is_pending());
                if blocked {
                    if self.members[i].state != GestureState::AwaitingFailure {
                        self.members[i].state = GestureState::AwaitingFailure;
                        trace!(recognizer = %self.members[i].tag, "awaiting failure");
                        changed = true;
                    }
                    continue;
                }
                eligible.push(i);
            }

            let mut granted: Vec<usize> = Vec::new();
            for i in eligible {
                if let Some(&winner) = granted.iter().find(|&&g| self.exclusive[g][i]) {
                    self.report_ambiguity(winner, i);
                    self.fail(i);
                    changed = true;
                    continue;
                }
                self.activate(i);
                granted.push(i);
                changed = true;
            }

            if !changed {
                break;
            }
        }
    }

    fn activate(&mut self, i: usize) {
        for j in 0..self.members.len() {
            if j != i && (self.exclusive[i][j] || self.waits_for[j].contains(&i)) {
                self.fail(j);
            }
        }

        let member = &mut self.members[i];
        member.claimed = false;
        let event = member
            .last_event
            .clone()
            .unwrap_or_else(|| GestureEvent::start(0.0));
        debug!(bridge = %self.name, recognizer = %member.tag, "activated");

        let Member { tag, recognizer, state, .. } = member;
        recognizer.handlers.start(tag, &event);
        if recognizer.kind.is_discrete() {
            recognizer.handlers.end(tag, &event);
            *state = GestureState::End;
        } else {
            *state = GestureState::Active;
        }
    }

    fn report_ambiguity(&mut self, winner: usize, loser: usize) {
        if !self.flag_ambiguity {
            return;
        }
        let error = MotiveError::GestureResolutionAmbiguity {
            group: self.name.clone(),
            first: self.members[winner].tag.clone(),
            second: self.members[loser].tag.clone(),
        };
        warn!(%error, "gesture tie broken by declaration order");
        self.diagnostics.push(error);
    }

    /// Start a fresh touch sequence once every member has settled and no
    /// pointer is down.
    fn maybe_reset(&mut self) {
        if self.pointer_down {
            return;
        }
        let settled = self
            .members
            .iter()
            .all(|m| m.state.is_terminal() || m.state == GestureState::Undetermined);
        if settled && self.members.iter().any(|m| m.state != GestureState::Undetermined) {
            trace!(bridge = %self.name, "touch sequence finished, resetting");
            self.members.iter_mut().for_each(Member::reset);
        }
    }
}

impl std::fmt::Debug for GestureBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureBridge")
            .field("name", &self.name)
            .field("states", &self.states())
            .field("pointer_down", &self.pointer_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::recognizer::{LongPressConfig, PanConfig, TapConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recorded(tag: &'static str, kind: Recognizer, sink: &Arc<Mutex<Vec<String>>>) -> Recognizer {
        let (a, b, c, d) = (sink.clone(), sink.clone(), sink.clone(), sink.clone());
        kind.with_tag(tag)
            .on_start(move |_| a.lock().push(format!("{tag}:start")))
            .on_update(move |_| b.lock().push(format!("{tag}:update")))
            .on_end(move |_, _| c.lock().push(format!("{tag}:end")))
            .on_cancel(move || d.lock().push(format!("{tag}:cancel")))
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            flag_gesture_ambiguity: true,
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn pan_reports_lifecycle() {
        let events = log();
        let pan = recorded("pan", Recognizer::pan(PanConfig::default()).unwrap(), &events);
        let mut bridge = GestureBridge::new("card", pan, &config()).unwrap();

        bridge.handle(&GestureEvent::start(0.0));
        assert_eq!(bridge.state("pan"), Some(GestureState::Began));
        bridge.handle(&GestureEvent::update(16.0).with_translation(20.0, 0.0));
        assert_eq!(bridge.state("pan"), Some(GestureState::Active));
        bridge.handle(&GestureEvent::update(32.0).with_translation(40.0, 0.0));
        bridge.handle(&GestureEvent::end(48.0).with_velocity(900.0, 0.0));

        assert_eq!(*events.lock(), vec!["pan:start", "pan:update", "pan:end"]);
        assert_eq!(bridge.state("pan"), Some(GestureState::Undetermined));
    }

    #[test]
    fn end_velocity_is_passed_to_handler() {
        let velocity = Arc::new(Mutex::new(None));
        let sink = velocity.clone();
        let pan = Recognizer::pan(PanConfig::default())
            .unwrap()
            .on_end(move |_, v| *sink.lock() = Some(v));
        let mut bridge = GestureBridge::new("card", pan, &config()).unwrap();
        bridge.handle(&GestureEvent::start(0.0));
        bridge.handle(&GestureEvent::update(16.0).with_translation(0.0, 50.0));
        bridge.handle(&GestureEvent::end(32.0).with_velocity(0.0, -1200.0));
        assert_eq!(*velocity.lock(), Some(crate::Vec2::new(0.0, -1200.0)));
    }

    #[test]
    fn cancel_reaches_active_recognizer() {
        let events = log();
        let pan = recorded("pan", Recognizer::pan(PanConfig::default()).unwrap(), &events);
        let mut bridge = GestureBridge::new("card", pan, &config()).unwrap();
        bridge.handle(&GestureEvent::start(0.0));
        bridge.handle(&GestureEvent::update(16.0).with_translation(20.0, 0.0));
        bridge.handle(&GestureEvent::cancel(32.0));
        assert_eq!(*events.lock(), vec!["pan:start", "pan:cancel"]);
    }

    #[test]
    fn long_press_blocks_pan_until_it_fails() {
        let events = log();
        let press = Recognizer::long_press(LongPressConfig::default()).unwrap();
        let press = recorded("press", press, &events);
        let pan = recorded("pan", Recognizer::pan(PanConfig::default()).unwrap(), &events);
        let gesture = Gesture::exclusive([press, pan]);
        let mut bridge = GestureBridge::new("row", gesture, &config()).unwrap();

        bridge.handle(&GestureEvent::start(0.0));
        // Within the press's slop the pan cannot claim yet.
        bridge.handle(&GestureEvent::update(16.0).with_translation(8.0, 0.0));
        assert_eq!(bridge.state("pan"), Some(GestureState::Began));
        // Moving past the press's slop fails it and frees the pan.
        bridge.handle(&GestureEvent::update(32.0).with_translation(25.0, 0.0));
        assert_eq!(bridge.state("press"), Some(GestureState::Failed));
        assert_eq!(bridge.state("pan"), Some(GestureState::Active));
    }

    #[test]
    fn long_press_activates_through_advance() {
        let events = log();
        let press = Recognizer::long_press(LongPressConfig::default()).unwrap();
        let press = recorded("press", press, &events);
        let mut bridge = GestureBridge::new("row", press, &config()).unwrap();

        bridge.handle(&GestureEvent::start(100.0));
        assert_eq!(bridge.next_deadline(), Some(600.0));
        bridge.advance(599.0);
        assert_eq!(bridge.state("press"), Some(GestureState::Began));
        bridge.advance(600.0);
        assert_eq!(bridge.state("press"), Some(GestureState::Active));
        bridge.handle(&GestureEvent::end(900.0));
        assert_eq!(*events.lock(), vec!["press:start", "press:end"]);
    }

    #[test]
    fn simultaneous_members_both_activate() {
        let events = log();
        let pinch = recorded("pinch", Recognizer::pinch(Default::default()).unwrap(), &events);
        let rotate = recorded("rotate", Recognizer::rotation(Default::default()).unwrap(), &events);
        let gesture = Gesture::simultaneous([pinch, rotate]);
        let mut bridge = GestureBridge::new("photo", gesture, &config()).unwrap();

        bridge.handle(&GestureEvent::start(0.0).with_pointers(2));
        bridge.handle(
            &GestureEvent::update(16.0)
                .with_pointers(2)
                .with_scale(1.2)
                .with_rotation(0.3),
        );
        assert_eq!(bridge.state("pinch"), Some(GestureState::Active));
        assert_eq!(bridge.state("rotate"), Some(GestureState::Active));
    }

    #[test]
    fn equal_priority_tie_goes_to_declaration_order() {
        let events = log();
        let first = recorded("first", Recognizer::tap(TapConfig::default()).unwrap(), &events);
        let second = recorded("second", Recognizer::tap(TapConfig::default()).unwrap(), &events);
        let gesture = Gesture::exclusive_by_priority([(0, first), (0, second)]);
        let mut bridge = GestureBridge::new("tie", gesture, &config()).unwrap();

        bridge.handle(&GestureEvent::start(0.0));
        bridge.handle(&GestureEvent::end(40.0));

        assert_eq!(*events.lock(), vec!["first:start", "first:end"]);
        let diagnostics = bridge.take_diagnostics();
        assert!(matches!(
            diagnostics.as_slice(),
            [MotiveError::GestureResolutionAmbiguity { first, second, .. }]
                if first == "first" && second == "second"
        ));
    }

    #[test]
    fn higher_priority_wins_regardless_of_declaration() {
        let events = log();
        let low = recorded("low", Recognizer::tap(TapConfig::default()).unwrap(), &events);
        let high = recorded("high", Recognizer::tap(TapConfig::default()).unwrap(), &events);
        let gesture = Gesture::exclusive_by_priority([(1, low), (9, high)]);
        let mut bridge = GestureBridge::new("prio", gesture, &config()).unwrap();

        bridge.handle(&GestureEvent::start(0.0));
        bridge.handle(&GestureEvent::end(40.0));

        assert_eq!(*events.lock(), vec!["high:start", "high:end"]);
        assert!(bridge.take_diagnostics().is_empty());
    }
}
