//! Dependency Ordering
//!
//! The topology determines the order in which affected nodes are evaluated
//! within a frame. It ensures that dependencies are always visited before
//! their dependents.
//!
//! # Algorithm
//!
//! 1. Collect every node reachable from the changed value cells (BFS over
//!    dependent edges)
//! 2. Sort them topologically (Kahn's algorithm restricted to the collected
//!    set)
//! 3. Append whatever Kahn could not place. Those nodes sit on a cycle; the
//!    evaluator visits them last and flags them.
//!
//! Whether a visited node actually recomputes is decided by the evaluator,
//! which compares its recorded dependencies against what changed this frame.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;

use super::node::{Node, NodeId, NodeKind};

/// Owns every node and edge of one runtime's dependency graph.
#[derive(Debug, Default)]
pub struct Topology {
    nodes: HashMap<NodeId, Node>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node if it is not present yet.
    pub fn ensure_node(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes.entry(id).or_insert_with(|| Node::new(kind));
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.remove(&node_id) else {
            return;
        };
        for neighbour in node.reads().iter().chain(node.readers()) {
            if let Some(other) = self.nodes.get_mut(neighbour) {
                other.unlink(node_id);
            }
        }
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Replace the dependency set of `node_id` with `dependencies`.
    ///
    /// Returns `false` when the new edges close a cycle. The edges are
    /// recorded either way, so later changes upstream still reach the node
    /// and the evaluator can keep reporting it.
    pub fn set_dependencies(&mut self, node_id: NodeId, dependencies: &[NodeId]) -> bool {
        let acyclic = !self.would_cycle(node_id, dependencies);

        let previous = match self.nodes.get_mut(&node_id) {
            Some(node) => node.clear_reads(),
            None => return acyclic,
        };
        for old in previous {
            if let Some(source) = self.nodes.get_mut(&old) {
                source.unlink(node_id);
            }
        }

        // Cells that never joined the graph cannot change, so they are
        // skipped.
        let linked: Vec<NodeId> = dependencies
            .iter()
            .copied()
            .filter(|source| match self.nodes.get_mut(source) {
                Some(node) => {
                    node.link_reader(node_id);
                    true
                }
                None => false,
            })
            .collect();
        if let Some(node) = self.nodes.get_mut(&node_id) {
            linked.into_iter().for_each(|source| node.link_read(source));
        }

        acyclic
    }

    /// Check whether making `node_id` depend on `dependencies` would close a
    /// cycle, i.e. whether any of them is already downstream of `node_id`.
    pub fn would_cycle(&self, node_id: NodeId, dependencies: &[NodeId]) -> bool {
        if dependencies.contains(&node_id) {
            return true;
        }
        let targets: HashSet<NodeId> = dependencies.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node_id]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for &reader in node.readers() {
                    if targets.contains(&reader) {
                        return true;
                    }
                    queue.push_back(reader);
                }
            }
        }
        false
    }

    /// Collect every node reachable from `changed` and return them in
    /// dependency order. The changed nodes themselves are not included.
    pub fn affected<I>(&self, changed: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut reached = IndexSet::new();
        let mut queue = VecDeque::new();

        for source_id in changed {
            if let Some(source) = self.nodes.get(&source_id) {
                queue.extend(source.readers().iter().copied());
            }
        }

        while let Some(node_id) = queue.pop_front() {
            if !reached.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                queue.extend(node.readers().iter().copied());
            }
        }

        self.topological_sort(reached)
    }

    /// Kahn's algorithm over `nodes`, counting only edges inside the set.
    fn topological_sort(&self, nodes: IndexSet<NodeId>) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            let degree = self
                .nodes
                .get(&node_id)
                .map(|node| node.reads().iter().filter(|d| nodes.contains(*d)).count())
                .unwrap_or(0);
            in_degree.insert(node_id, degree);
            if degree == 0 {
                queue.push_back(node_id);
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for reader in node.readers() {
                    if let Some(degree) = in_degree.get_mut(reader) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*reader);
                        }
                    }
                }
            }
        }

        if result.len() < nodes.len() {
            let placed: HashSet<NodeId> = result.iter().copied().collect();
            result.extend(nodes.into_iter().filter(|id| !placed.contains(id)));
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(topology: &mut Topology) -> (NodeId, NodeId, NodeId) {
        let source = NodeId::new();
        let derived = NodeId::new();
        let style = NodeId::new();
        topology.ensure_node(source, NodeKind::Value);
        topology.ensure_node(derived, NodeKind::Derived);
        topology.ensure_node(style, NodeKind::Style);
        assert!(topology.set_dependencies(derived, &[source]));
        assert!(topology.set_dependencies(style, &[derived]));
        (source, derived, style)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut topology = Topology::new();
        let (source, derived, _) = chain(&mut topology);
        assert_eq!(topology.node_count(), 3);

        topology.remove_node(source);
        assert_eq!(topology.node_count(), 2);
        assert!(topology.node(derived).unwrap().reads().is_empty());
    }

    #[test]
    fn set_dependencies_replaces_edges() {
        let mut topology = Topology::new();
        let (source, derived, _) = chain(&mut topology);
        let other = NodeId::new();
        topology.ensure_node(other, NodeKind::Value);

        topology.set_dependencies(derived, &[other]);

        assert!(!topology.node(source).unwrap().readers().contains(&derived));
        assert!(topology.node(other).unwrap().readers().contains(&derived));
    }

    #[test]
    fn affected_is_in_dependency_order() {
        let mut topology = Topology::new();
        let (source, derived, style) = chain(&mut topology);

        let order = topology.affected([source]);
        assert_eq!(order, vec![derived, style]);
    }

    #[test]
    fn diamond_visits_join_after_both_arms() {
        let mut topology = Topology::new();
        let a = NodeId::new();
        let left = NodeId::new();
        let right = NodeId::new();
        let join = NodeId::new();
        topology.ensure_node(a, NodeKind::Value);
        for id in [left, right, join] {
            topology.ensure_node(id, NodeKind::Derived);
        }
        topology.set_dependencies(left, &[a]);
        topology.set_dependencies(right, &[a]);
        topology.set_dependencies(join, &[left, right]);

        let order = topology.affected([a]);
        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&join));
    }

    #[test]
    fn cycle_is_reported_and_still_ordered() {
        let mut topology = Topology::new();
        let source = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        topology.ensure_node(source, NodeKind::Value);
        topology.ensure_node(a, NodeKind::Derived);
        topology.ensure_node(b, NodeKind::Derived);

        assert!(topology.set_dependencies(a, &[source]));
        assert!(topology.set_dependencies(b, &[a]));
        assert!(topology.would_cycle(a, &[source, b]));
        assert!(!topology.set_dependencies(a, &[source, b]));

        let order = topology.affected([source]);
        assert_eq!(order.len(), 2);
        assert!(order.contains(&a) && order.contains(&b));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut topology = Topology::new();
        let a = NodeId::new();
        topology.ensure_node(a, NodeKind::Derived);
        assert!(topology.would_cycle(a, &[a]));
    }
}
