//! Motive Core
//!
//! This crate provides the animation value engine behind Motive views.
//! It implements:
//!
//! - Value cells, derived cells and style computations with automatic
//!   dependency tracking
//! - Animation primitives (timing, spring, decay and their compositions)
//! - A frame loop that advances animations, propagates changes and hands
//!   property bags to the renderer once per display refresh
//! - A gesture bridge that turns platform touch events into cell writes
//!
//! # Architecture
//!
//! - `reactive`: cells, scopes and the runtime that owns them
//! - `graph`: dependency topology and propagation order
//! - `animation`: declarative specs and the drivers that run them
//! - `frame`: the per-frame state machine and renderer hand-off
//! - `gesture`: recognizers, composition and the event bridge
//!
//! # Example
//!
//! ```rust
//! use motive_core::{AnimationSpec, FrameLoop, PropertyBag, Runtime, SpringConfig, Transform};
//!
//! # fn main() -> motive_core::Result<()> {
//! let runtime = Runtime::default();
//! let card = runtime.scope("card");
//!
//! let offset = card.value(0.0_f64);
//! let opacity = card.derived({
//!     let offset = offset.clone();
//!     move || 1.0 - (offset.read().abs() / 300.0).min(1.0)
//! })?;
//! card.style({
//!     let offset = offset.clone();
//!     move || {
//!         PropertyBag::new()
//!             .with("opacity", opacity.read())
//!             .with("transform", vec![Transform::TranslateX(offset.read())])
//!     }
//! });
//!
//! offset.animate_to(AnimationSpec::spring(120.0, SpringConfig::default())?)?;
//!
//! // A platform driver would call `tick_now` once per display refresh.
//! let mut frames = FrameLoop::new(&runtime);
//! for report in frames.run_until_idle(0.0, 600) {
//!     assert!(report.errors.is_empty());
//! }
//! assert_eq!(offset.read(), 120.0);
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod config;
pub mod error;
pub mod frame;
pub mod gesture;
pub mod graph;
pub mod reactive;

pub use animation::{
    Animatable, AnimationResult, AnimationSpec, DecayConfig, Easing, RepeatCount, Rgba,
    SpringConfig, StepPosition, TimingConfig, Vec2,
};
pub use config::RuntimeConfig;
pub use error::{MotiveError, Result};
pub use frame::{FrameLoop, FramePhase, FrameReport, Renderer, StyleUpdate};
pub use gesture::{Gesture, GestureBridge, GestureEvent, GestureState, Recognizer};
pub use graph::NodeId;
pub use reactive::{
    CellStatus, DerivedCell, PropertyBag, PropertyValue, Runtime, Scope, StyleComputation,
    Transform, ValueCell,
};

/// Stop the animation driving `cell`, if any.
pub fn cancel_animation<T>(cell: &ValueCell<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    cell.cancel_animation();
}
