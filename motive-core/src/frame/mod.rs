//! Frame Loop
//!
//! One frame is one pass through a fixed sequence of phases:
//!
//! 1. **Collecting**: staged writes, animation starts and cancellations
//!    are applied in the order they were made. Frame tasks run here.
//!
//! 2. **Evaluating**: active runs advance in registration order and commit
//!    their values. Commits are visible to everything evaluated later in
//!    the same frame.
//!
//! 3. **Propagating**: every derived cell downstream of a changed value
//!    cell is settled in dependency order.
//!
//! 4. **Rendering**: style computations whose inputs changed, or that have
//!    never run, produce property bags for the renderer.
//!
//! 5. **Flushing**: completion callbacks and `run_on_control` closures run
//!    in FIFO order, outside any evaluation.
//!
//! The loop is dormant whenever there is nothing staged, no active run, no
//! pending callback and no unevaluated style. A dormant loop produces no
//! frames; the runtime's wake callback tells the platform when to resume.

mod frame_loop;
mod renderer;
mod report;

pub use frame_loop::FrameLoop;
pub use renderer::Renderer;
pub use report::{FramePhase, FrameReport, StyleUpdate};
