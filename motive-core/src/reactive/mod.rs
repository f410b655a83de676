//! Reactive Primitives
//!
//! This module implements the value graph: value cells, derived cells and
//! style computations, owned by scopes and coordinated by a runtime.
//!
//! # Concepts
//!
//! ## Value Cells
//!
//! A value cell is a mutable container for one animatable or plain value.
//! The application writes it, animations drive it, and reads inside a
//! derived cell or style computation register it as a dependency.
//!
//! ## Derived Cells
//!
//! A derived cell caches a pure computation over other cells. It is settled
//! once per frame, in dependency order, and recomputes only when something
//! it read last time actually changed.
//!
//! ## Style Computations
//!
//! A style computation is the sink of the graph. It produces a property bag
//! for the renderer whenever one of its inputs changed.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local evaluation stack. Reading a cell
//! while a computation is on the stack records the edge. The same stack
//! detects cycles: a derived cell asked to settle while it is already being
//! evaluated is reading its own output.

mod context;
mod derived;
mod property;
mod runtime;
mod scope;
mod style;
mod value;

pub use derived::{CellStatus, DerivedCell};
pub use property::{PropertyBag, PropertyValue, Transform};
pub use runtime::Runtime;
pub use scope::Scope;
pub use style::StyleComputation;
pub use value::ValueCell;

pub(crate) use runtime::{RuntimeInner, StagedOp};
pub(crate) use style::StyleInner;
pub(crate) use derived::panic_message;
