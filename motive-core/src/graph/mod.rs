//! Dependency Topology
//!
//! This module tracks the edges between value cells, derived cells and style
//! computations.
//!
//! # Overview
//!
//! The topology is a directed graph that is expected to be acyclic:
//!
//! - Nodes are value cells (roots), derived cells, or style computations
//!   (leaves)
//! - Edges point from a dependency to its dependent: if B reads A, there is
//!   an edge A -> B
//!
//! Edges are not declared up front. A derived cell or style computation
//! records what it read during its most recent evaluation and its edge set is
//! replaced wholesale afterwards, so conditional reads move edges around from
//! one frame to the next.
//!
//! When value cells change, the frame loop asks the topology for every node
//! reachable from them in dependency order. Nodes caught in a cycle cannot be
//! ordered; they are appended at the end so the evaluator still visits them
//! and can flag them.

mod node;
mod topology;

pub use node::{Node, NodeId, NodeKind};
pub use topology::Topology;
