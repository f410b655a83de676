//! Animation Primitives
//!
//! Time-driven generators that move a cell toward a target:
//!
//! - **Timing**: interpolate over a fixed duration through an easing curve
//! - **Spring**: integrate a damped harmonic oscillator until at rest
//! - **Decay**: coast from an initial velocity with exponential deceleration
//! - **Sequence**, **Delay**, **Repeat**: compose the above
//!
//! Specs are declarative values ([`AnimationSpec`]). Assigning one to a cell
//! creates a run that the frame loop advances once per frame. Starting a new
//! run on a cell cancels the previous one and continues from the cell's
//! current value, carrying spring velocity across the interruption.

mod decay;
mod driver;
mod easing;
mod run;
mod spec;
mod spring;
mod value;

pub use decay::DecayConfig;
pub use easing::{Easing, StepPosition};
pub use run::{CompletionCallback, RunId, RunState};
pub use spec::{AnimationResult, AnimationSpec, RepeatCount, TimingConfig};
pub use spring::SpringConfig;
pub use value::{lerp_components, Animatable, Components, Rgba, Vec2};

pub(crate) use driver::DriverEnv;
pub(crate) use run::{ActiveRun, AnimatedTarget, PendingRun};
