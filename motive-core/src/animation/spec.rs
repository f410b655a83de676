//! Declarative animation specs
//!
//! An [`AnimationSpec`] describes what a cell should do: reach a value over a
//! duration, spring to it, coast from a velocity, or a composition of those.
//! Specs are plain data. Assigning one to a cell with
//! [`ValueCell::animate_to`](crate::ValueCell::animate_to) starts a run.
//!
//! Every constructor validates its parameters, so a spec that exists can
//! always run.

use serde::{Deserialize, Serialize};

use super::decay::DecayConfig;
use super::easing::Easing;
use super::spring::SpringConfig;
use super::value::{Animatable, Components};
use crate::error::{MotiveError, Result};

/// Configuration for a timing animation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub duration_ms: f64,
    pub easing: Easing,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300.0,
            easing: Easing::InOutQuad,
        }
    }
}

impl TimingConfig {
    pub fn new(duration_ms: f64, easing: Easing) -> Self {
        Self { duration_ms, easing }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.duration_ms.is_finite() && self.duration_ms >= 0.0) {
            return Err(MotiveError::invalid(
                "timing",
                format!("duration must be non-negative, got {}", self.duration_ms),
            ));
        }
        self.easing.validate()
    }
}

/// How many times a repeated animation runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCount {
    Times(u32),
    Infinite,
}

/// Outcome handed to a run's completion callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationResult {
    /// `true` when the run reached its natural end, `false` when it was
    /// cancelled, replaced or its scope unmounted.
    pub finished: bool,
}

/// A declarative animation targeting values of type `T`.
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationSpec<T> {
    Timing {
        to: T,
        config: TimingConfig,
    },
    Spring {
        to: T,
        config: SpringConfig,
        /// Explicit initial velocity. When absent the run inherits the
        /// velocity of the run it interrupts, or starts at rest.
        velocity: Option<T>,
    },
    Decay {
        velocity: T,
        config: DecayConfig,
        clamp: Option<(T, T)>,
    },
    Sequence(Vec<AnimationSpec<T>>),
    Delay {
        delay_ms: f64,
        then: Box<AnimationSpec<T>>,
    },
    Repeat {
        spec: Box<AnimationSpec<T>>,
        count: RepeatCount,
        /// Ping-pong between the iteration's start and the child's target.
        /// Only valid when the child is a timing or spring, possibly delayed.
        reverse: bool,
    },
}

impl<T: Animatable> AnimationSpec<T> {
    pub fn timing(to: T, config: TimingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::Timing { to, config })
    }

    pub fn spring(to: T, config: SpringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::Spring {
            to,
            config,
            velocity: None,
        })
    }

    pub fn spring_with_velocity(to: T, config: SpringConfig, velocity: T) -> Result<Self> {
        config.validate()?;
        Ok(Self::Spring {
            to,
            config,
            velocity: Some(velocity),
        })
    }

    pub fn decay(velocity: T, config: DecayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::Decay {
            velocity,
            config,
            clamp: None,
        })
    }

    /// A decay that stops when any component reaches `lo` or `hi`.
    pub fn decay_clamped(velocity: T, lo: T, hi: T, config: DecayConfig) -> Result<Self> {
        config.validate()?;
        let below = lo
            .to_components()
            .iter()
            .zip(hi.to_components().iter())
            .all(|(l, h)| l <= h);
        if !below {
            return Err(MotiveError::invalid("decay", "clamp lower bound exceeds upper bound"));
        }
        Ok(Self::Decay {
            velocity,
            config,
            clamp: Some((lo, hi)),
        })
    }

    pub fn sequence(steps: Vec<AnimationSpec<T>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(MotiveError::invalid("sequence", "needs at least one animation"));
        }
        Ok(Self::Sequence(steps))
    }

    pub fn delay(delay_ms: f64, then: AnimationSpec<T>) -> Result<Self> {
        if !(delay_ms.is_finite() && delay_ms >= 0.0) {
            return Err(MotiveError::invalid(
                "delay",
                format!("delay must be non-negative, got {delay_ms}"),
            ));
        }
        Ok(Self::Delay {
            delay_ms,
            then: Box::new(then),
        })
    }

    /// Repeat `spec`. With `reverse`, the child must head to a single target
    /// (a timing or spring, possibly delayed) so odd iterations can swap it.
    pub fn repeat(spec: AnimationSpec<T>, count: RepeatCount, reverse: bool) -> Result<Self> {
        if count == RepeatCount::Times(0) {
            return Err(MotiveError::invalid("repeat", "count must be at least 1"));
        }
        if reverse && !spec.has_target() {
            return Err(MotiveError::invalid("repeat", "reverse needs a timing or spring to swap"));
        }
        Ok(Self::Repeat {
            spec: Box::new(spec),
            count,
            reverse,
        })
    }

    /// Re-check the whole tree. Needed for specs assembled from the enum
    /// variants directly instead of the constructors.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Timing { config, .. } => config.validate(),
            Self::Spring { config, .. } => config.validate(),
            Self::Decay { config, .. } => config.validate(),
            Self::Sequence(steps) => {
                if steps.is_empty() {
                    return Err(MotiveError::invalid("sequence", "needs at least one animation"));
                }
                steps.iter().try_for_each(Self::validate)
            }
            Self::Delay { delay_ms, then } => {
                if !(delay_ms.is_finite() && *delay_ms >= 0.0) {
                    return Err(MotiveError::invalid("delay", "delay must be non-negative"));
                }
                then.validate()
            }
            Self::Repeat { spec, count, reverse } => {
                if *count == RepeatCount::Times(0) {
                    return Err(MotiveError::invalid("repeat", "count must be at least 1"));
                }
                if *reverse && !spec.has_target() {
                    return Err(MotiveError::invalid(
                        "repeat",
                        "reverse needs a timing or spring to swap",
                    ));
                }
                spec.validate()
            }
        }
    }

    fn has_target(&self) -> bool {
        match self {
            Self::Timing { .. } | Self::Spring { .. } => true,
            Self::Delay { then, .. } => then.has_target(),
            Self::Decay { .. } | Self::Sequence(_) | Self::Repeat { .. } => false,
        }
    }

    /// Erase the value type.
    pub(crate) fn lower(&self) -> Program {
        match self {
            Self::Timing { to, config } => Program::Timing {
                to: to.to_components(),
                config: *config,
            },
            Self::Spring { to, config, velocity } => Program::Spring {
                to: to.to_components(),
                config: *config,
                velocity: velocity.as_ref().map(Animatable::to_components),
            },
            Self::Decay { velocity, config, clamp } => Program::Decay {
                velocity: velocity.to_components(),
                config: *config,
                clamp: clamp
                    .as_ref()
                    .map(|(lo, hi)| (lo.to_components(), hi.to_components())),
            },
            Self::Sequence(steps) => Program::Sequence(steps.iter().map(Self::lower).collect()),
            Self::Delay { delay_ms, then } => Program::Delay {
                delay_ms: *delay_ms,
                then: Box::new(then.lower()),
            },
            Self::Repeat { spec, count, reverse } => Program::Repeat {
                spec: Box::new(spec.lower()),
                count: *count,
                reverse: *reverse,
            },
        }
    }
}

/// Type-erased animation tree over component vectors.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Program {
    Timing {
        to: Components,
        config: TimingConfig,
    },
    Spring {
        to: Components,
        config: SpringConfig,
        velocity: Option<Components>,
    },
    Decay {
        velocity: Components,
        config: DecayConfig,
        clamp: Option<(Components, Components)>,
    },
    Sequence(Vec<Program>),
    Delay {
        delay_ms: f64,
        then: Box<Program>,
    },
    Repeat {
        spec: Box<Program>,
        count: RepeatCount,
        reverse: bool,
    },
}

impl Program {
    /// Copy of this program heading to `to` instead. Used by reversing
    /// repeats, which only accept children with a target.
    pub(crate) fn retargeted(&self, to: &Components) -> Program {
        match self {
            Program::Timing { config, .. } => Program::Timing {
                to: to.clone(),
                config: *config,
            },
            Program::Spring { config, velocity, .. } => Program::Spring {
                to: to.clone(),
                config: *config,
                velocity: velocity.clone(),
            },
            Program::Delay { delay_ms, then } => Program::Delay {
                delay_ms: *delay_ms,
                then: Box::new(then.retargeted(to)),
            },
            other => other.clone(),
        }
    }

    /// Whether the first thing this program does is spring, meaning it should
    /// pick up the velocity of an interrupted run.
    pub(crate) fn starts_with_spring(&self) -> bool {
        match self {
            Program::Spring { .. } => true,
            Program::Sequence(steps) => steps.first().is_some_and(Program::starts_with_spring),
            Program::Repeat { spec, .. } => spec.starts_with_spring(),
            _ => false,
        }
    }
}
