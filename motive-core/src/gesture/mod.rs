//! Gesture Bridge
//!
//! Turns platform touch events into handler calls. Recognizers (pan, tap,
//! pinch, rotation, long press) are composed into a tree that decides which
//! of them may be active together, and the bridge resolves competing claims
//! deterministically.
//!
//! Handlers run on the caller's thread, outside the frame loop. Anything
//! they write to a value cell is staged for the next frame.

mod bridge;
mod composition;
mod event;
mod recognizer;

pub use bridge::GestureBridge;
pub use composition::Gesture;
pub use event::{EventPhase, GestureEvent};
pub use recognizer::{
    GestureState, LongPressConfig, PanConfig, PinchConfig, Recognizer, RecognizerKind,
    RotationConfig, TapConfig,
};
