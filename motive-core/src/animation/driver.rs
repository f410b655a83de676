//! Animation drivers
//!
//! A [`Driver`] is the running form of a [`Program`]: elapsed time, child
//! index, integrator state. The frame loop calls [`Driver::step`] once per
//! frame with the frame timestamp. Waiting (delays, sequence hand-offs) is
//! just state inspected on the next step.

use tracing::warn;

use super::decay::DecayState;
use super::easing::Easing;
use super::spec::{Program, RepeatCount};
use super::spring::SpringState;
use super::value::{lerp_components, Components};

/// Runtime settings a driver needs while stepping.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DriverEnv {
    pub substep_ms: f64,
    pub max_spring_frames: Option<u64>,
}

/// Result of one step.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Step {
    pub value: Components,
    pub done: bool,
}

#[derive(Debug)]
pub(crate) enum Driver {
    Timing {
        from: Components,
        to: Components,
        duration_ms: f64,
        easing: Easing,
        start_ms: f64,
        last_value: Components,
        last_ms: f64,
        velocity: Components,
    },
    Spring {
        state: SpringState,
        last_ms: f64,
        frames: u64,
    },
    Decay {
        state: DecayState,
        last_ms: f64,
    },
    Sequence {
        steps: Vec<Program>,
        index: usize,
        current: Box<Driver>,
    },
    Delay {
        until_ms: f64,
        hold: Components,
        then: Program,
        current: Option<Box<Driver>>,
    },
    Repeat {
        spec: Program,
        count: RepeatCount,
        reverse: bool,
        iteration: u32,
        origin: Components,
        current: Box<Driver>,
    },
}

fn zeros(len: usize) -> Components {
    std::iter::repeat(0.0).take(len).collect()
}

impl Driver {
    /// Start `program` from `from` at time `now_ms`. `velocity` is the
    /// velocity inherited from an interrupted run or a previous sequence step.
    pub(crate) fn start(
        program: &Program,
        from: Components,
        velocity: Option<Components>,
        now_ms: f64,
    ) -> Driver {
        match program {
            Program::Timing { to, config } => Driver::Timing {
                last_value: from.clone(),
                velocity: zeros(from.len()),
                from,
                to: to.clone(),
                duration_ms: config.duration_ms,
                easing: config.easing,
                start_ms: now_ms,
                last_ms: now_ms,
            },
            Program::Spring {
                to,
                config,
                velocity: explicit,
            } => {
                let initial = explicit
                    .clone()
                    .or(velocity)
                    .unwrap_or_else(|| zeros(from.len()));
                Driver::Spring {
                    state: SpringState::new(*config, from, to.clone(), initial),
                    last_ms: now_ms,
                    frames: 0,
                }
            }
            Program::Decay { velocity: initial, config, clamp } => Driver::Decay {
                state: DecayState::new(*config, from, initial.clone(), clamp.clone()),
                last_ms: now_ms,
            },
            Program::Sequence(steps) => {
                let first = steps
                    .first()
                    .map(|p| Driver::start(p, from.clone(), velocity.clone(), now_ms))
                    .unwrap_or_else(|| Driver::hold(from, now_ms));
                Driver::Sequence {
                    steps: steps.clone(),
                    index: 0,
                    current: Box::new(first),
                }
            }
            Program::Delay { delay_ms, then } => Driver::Delay {
                until_ms: now_ms + delay_ms,
                hold: from,
                then: (**then).clone(),
                current: None,
            },
            Program::Repeat { spec, count, reverse } => Driver::Repeat {
                current: Box::new(Driver::start(spec, from.clone(), velocity, now_ms)),
                spec: (**spec).clone(),
                count: *count,
                reverse: *reverse,
                iteration: 0,
                origin: from,
            },
        }
    }

    /// A zero-length timing that completes on its first step.
    fn hold(value: Components, now_ms: f64) -> Driver {
        Driver::Timing {
            last_value: value.clone(),
            velocity: zeros(value.len()),
            from: value.clone(),
            to: value,
            duration_ms: 0.0,
            easing: Easing::Linear,
            start_ms: now_ms,
            last_ms: now_ms,
        }
    }

    /// Instantaneous velocity in units per second.
    pub(crate) fn velocity(&self) -> Components {
        match self {
            Driver::Timing { velocity, .. } => velocity.clone(),
            Driver::Spring { state, .. } => state.velocity().clone(),
            Driver::Decay { state, .. } => state.velocity().clone(),
            Driver::Sequence { current, .. } | Driver::Repeat { current, .. } => current.velocity(),
            Driver::Delay { current, hold, .. } => current
                .as_ref()
                .map(|c| c.velocity())
                .unwrap_or_else(|| zeros(hold.len())),
        }
    }

    /// Advance to `now_ms`.
    pub(crate) fn step(&mut self, now_ms: f64, env: &DriverEnv) -> Step {
        match self {
            Driver::Timing {
                from,
                to,
                duration_ms,
                easing,
                start_ms,
                last_value,
                last_ms,
                velocity,
            } => {
                let elapsed = now_ms - *start_ms;
                let done = elapsed >= *duration_ms;
                let value = if done {
                    to.clone()
                } else {
                    lerp_components(from, to, easing.apply(elapsed / *duration_ms))
                };
                let dt = now_ms - *last_ms;
                if dt > 0.0 {
                    *velocity = value
                        .iter()
                        .zip(last_value.iter())
                        .map(|(v, l)| (v - l) / dt * 1000.0)
                        .collect();
                }
                *last_value = value.clone();
                *last_ms = now_ms;
                Step { value, done }
            }
            Driver::Spring { state, last_ms, frames } => {
                let dt = now_ms - *last_ms;
                *last_ms = now_ms;
                *frames += 1;
                let mut done = state.step(dt, env.substep_ms);
                if !done {
                    if let Some(cap) = env.max_spring_frames {
                        if *frames >= cap {
                            warn!(frames = *frames, "spring hit the frame cap; snapping to target");
                            state.settle_on_target();
                            done = true;
                        }
                    }
                }
                Step {
                    value: state.position().clone(),
                    done,
                }
            }
            Driver::Decay { state, last_ms } => {
                let dt = now_ms - *last_ms;
                *last_ms = now_ms;
                let done = state.step(dt);
                Step {
                    value: state.position().clone(),
                    done,
                }
            }
            Driver::Sequence { steps, index, current } => {
                let step = current.step(now_ms, env);
                if !step.done {
                    return step;
                }
                *index += 1;
                match steps.get(*index) {
                    Some(next) => {
                        let velocity = current.velocity();
                        **current = Driver::start(next, step.value.clone(), Some(velocity), now_ms);
                        Step {
                            value: step.value,
                            done: false,
                        }
                    }
                    None => step,
                }
            }
            Driver::Delay {
                until_ms,
                hold,
                then,
                current,
            } => {
                if current.is_none() {
                    if now_ms < *until_ms {
                        return Step {
                            value: hold.clone(),
                            done: false,
                        };
                    }
                    *current = Some(Box::new(Driver::start(then, hold.clone(), None, now_ms)));
                }
                match current {
                    Some(driver) => driver.step(now_ms, env),
                    None => Step {
                        value: hold.clone(),
                        done: true,
                    },
                }
            }
            Driver::Repeat {
                spec,
                count,
                reverse,
                iteration,
                origin,
                current,
            } => {
                let step = current.step(now_ms, env);
                if !step.done {
                    return step;
                }
                *iteration += 1;
                if let RepeatCount::Times(n) = *count {
                    if *iteration >= n {
                        return step;
                    }
                }

                let (program, from) = if *reverse {
                    let program = if *iteration % 2 == 1 {
                        spec.retargeted(origin)
                    } else {
                        spec.clone()
                    };
                    (program, step.value.clone())
                } else {
                    (spec.clone(), origin.clone())
                };
                **current = Driver::start(&program, from, None, now_ms);
                let restarted = current.step(now_ms, env);
                Step {
                    value: restarted.value,
                    done: false,
                }
            }
        }
    }
}
