//! Evaluation Context
//!
//! The evaluation context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read, the
//! current computation records it as a dependency.
//!
//! # Implementation
//!
//! We use a thread-local stack of entries. Entering a derived cell or style
//! computation pushes an entry; the returned guard pops it on drop, including
//! while unwinding out of a panicking computation.
//!
//! The stack doubles as the cycle guard. A node that is asked to settle while
//! it already has an entry on the stack is reading its own output.
//!
//! Each entry also carries the frame number it is evaluating for, or `None`
//! when a derived cell runs its first evaluation at creation. Tracked reads
//! of derived cells only pull-settle them when a frame is known.

use std::cell::RefCell;

use indexmap::IndexSet;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug)]
struct ContextEntry {
    node: NodeId,
    frame: Option<u64>,
    /// Cells read during this evaluation, in first-read order.
    dependencies: IndexSet<NodeId>,
}

/// Guard that pops the context entry when dropped.
pub struct ReactiveContext {
    node: NodeId,
}

impl ReactiveContext {
    /// Enter a new context for `node`.
    pub fn enter(node: NodeId, frame: Option<u64>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                node,
                frame,
                dependencies: IndexSet::new(),
            });
        });
        Self { node }
    }

    /// Check if there is an active context on this thread.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The node whose evaluation is running, if any.
    pub fn current_node() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.node))
    }

    /// The frame the innermost evaluation belongs to.
    pub fn current_frame() -> Option<u64> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.frame))
    }

    /// Whether `node` is already being evaluated further up the stack.
    pub fn contains(node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().any(|entry| entry.node == node))
    }

    /// Number of nested evaluations on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read of `node` in the innermost evaluation.
    pub fn track_dependency(node: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.dependencies.insert(node);
            }
        });
    }

    /// Take the dependencies recorded by the innermost evaluation.
    pub fn take_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies).into_iter().collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.node, self.node,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.node, entry.node
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_node() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        {
            let _ctx = ReactiveContext::enter(id, Some(3));
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_node(), Some(id));
            assert_eq!(ReactiveContext::current_frame(), Some(3));
        }
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_node().is_none());
    }

    #[test]
    fn dependencies_are_deduplicated_in_read_order() {
        let id = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let _ctx = ReactiveContext::enter(id, None);

        ReactiveContext::track_dependency(b);
        ReactiveContext::track_dependency(a);
        ReactiveContext::track_dependency(b);

        assert_eq!(ReactiveContext::take_dependencies(), vec![b, a]);
        assert!(ReactiveContext::take_dependencies().is_empty());
    }

    #[test]
    fn nested_contexts_and_cycle_guard() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        let _outer_ctx = ReactiveContext::enter(outer, Some(1));
        {
            let _inner_ctx = ReactiveContext::enter(inner, Some(1));
            assert_eq!(ReactiveContext::depth(), 2);
            assert!(ReactiveContext::contains(outer));
            assert!(ReactiveContext::contains(inner));
        }
        assert!(!ReactiveContext::contains(inner));
        assert_eq!(ReactiveContext::current_node(), Some(outer));
    }

    #[test]
    fn guard_pops_while_unwinding() {
        let id = NodeId::new();
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id, None);
            std::panic::resume_unwind(Box::new("boom"));
        });
        assert!(result.is_err());
        assert!(!ReactiveContext::contains(id));
    }
}
