//! Graph Nodes
//!
//! Identifiers shared by every cell kind, and the per-node edge record kept
//! by the topology.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Identity of a value cell, derived cell or style computation.
///
/// All kinds draw from one process-wide counter, so ids never collide
/// across runtimes either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is, which fixes where it may sit in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Written by the application or an animation run; never reads.
    Value,
    /// Reads cells and can itself be read.
    Derived,
    /// Reads cells; nothing reads it.
    Style,
}

/// Edge record for one node.
///
/// Both directions are kept so that propagation can walk forward from a
/// changed value and teardown can unhook a node from both sides. Sets are
/// insertion-ordered to keep sibling order reproducible between runs.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    /// Cells this node read during its last evaluation.
    reads: IndexSet<NodeId>,
    /// Nodes whose last evaluation read this one.
    readers: IndexSet<NodeId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            reads: IndexSet::new(),
            readers: IndexSet::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn reads(&self) -> &IndexSet<NodeId> {
        &self.reads
    }

    pub fn readers(&self) -> &IndexSet<NodeId> {
        &self.readers
    }

    pub(crate) fn link_read(&mut self, source: NodeId) {
        self.reads.insert(source);
    }

    pub(crate) fn link_reader(&mut self, reader: NodeId) {
        self.readers.insert(reader);
    }

    /// Forget `other` on both sides of this node.
    pub(crate) fn unlink(&mut self, other: NodeId) {
        self.reads.shift_remove(&other);
        self.readers.shift_remove(&other);
    }

    pub(crate) fn clear_reads(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.reads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_display_with_hash() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with('#'));
    }

    #[test]
    fn reads_keep_first_insertion_order() {
        let mut node = Node::new(NodeKind::Derived);
        let (x, y) = (NodeId::new(), NodeId::new());
        node.link_read(x);
        node.link_read(y);
        node.link_read(x);
        assert_eq!(node.reads().iter().copied().collect::<Vec<_>>(), vec![x, y]);

        node.unlink(x);
        assert_eq!(node.clear_reads().len(), 1);
        assert!(node.reads().is_empty());
    }
}
