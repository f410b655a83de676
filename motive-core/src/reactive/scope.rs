//! Scopes
//!
//! A scope stands for one mounted component. Everything the component
//! creates goes through its scope, and unmounting the scope tears all of it
//! down at once: nodes leave the graph, running animations are cancelled
//! and the handles the component gave away become inert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::derived::DerivedCell;
use super::property::PropertyBag;
use super::runtime::{Runtime, RuntimeInner};
use super::style::StyleComputation;
use super::value::ValueCell;
use crate::error::{MotiveError, Result};
use crate::graph::NodeId;

/// Owner of the cells created for one component.
pub struct Scope {
    name: String,
    runtime: Arc<RuntimeInner>,
    owned: Mutex<Vec<NodeId>>,
    mounted: AtomicBool,
}

impl Scope {
    pub(crate) fn new(name: String, runtime: Arc<RuntimeInner>) -> Self {
        Self {
            name,
            runtime,
            owned: Mutex::new(Vec::new()),
            mounted: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> Runtime {
        Runtime {
            inner: Arc::clone(&self.runtime),
        }
    }

    /// Create a value cell. No side effects until it is read or written.
    pub fn value<T>(&self, initial: T) -> ValueCell<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let cell = ValueCell::new(initial, &self.runtime);
        self.adopt(cell.id());
        cell
    }

    /// Create a derived cell, evaluating `compute` immediately.
    pub fn derived<T, F>(&self, compute: F) -> Result<DerivedCell<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        if !self.is_mounted() {
            return Err(MotiveError::Detached { node: NodeId::new() });
        }
        let cell = DerivedCell::new(compute, &self.runtime)?;
        self.adopt(cell.id());
        Ok(cell)
    }

    /// Register a style computation. It first runs in the next frame.
    pub fn style<F>(&self, compute: F) -> StyleComputation
    where
        F: Fn() -> PropertyBag + Send + Sync + 'static,
    {
        let style = StyleComputation::new(compute, &self.runtime);
        self.adopt(style.id());
        style
    }

    fn adopt(&self, node: NodeId) {
        if self.is_mounted() {
            self.owned.lock().push(node);
        } else {
            warn!(scope = %self.name, node = %node, "created in an unmounted scope, detaching");
            self.runtime.release(&[node]);
        }
    }

    /// Unregister every node this scope created. Idempotent; also runs on
    /// drop.
    pub fn unmount(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        let owned = std::mem::take(&mut *self.owned.lock());
        debug!(scope = %self.name, nodes = owned.len(), "scope unmounted");
        self.runtime.release(&owned);
    }

    /// Nodes still owned by this scope.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.owned.lock().clone()
    }

    /// Whether any node of this scope is in the dependency topology.
    #[cfg(test)]
    fn contains_attached(&self) -> bool {
        let topology = self.runtime.topology.lock();
        self.owned.lock().iter().any(|id| topology.contains(*id))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("mounted", &self.is_mounted())
            .field("nodes", &self.owned.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnimationResult, AnimationSpec, FrameLoop, SpringConfig};

    #[test]
    fn unmount_cancels_runs_and_detaches_handles() {
        let runtime = Runtime::default();
        let scope = runtime.scope("card");
        let x = scope.value(0.0_f64);
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        x.animate_to_with(AnimationSpec::spring(100.0, SpringConfig::default()).unwrap(), move |r| {
            sink.lock().push(r)
        })
        .unwrap();

        let mut frames = FrameLoop::new(&runtime);
        frames.tick(0.0);
        frames.tick(16.0);
        assert!(x.is_animating());

        scope.unmount();
        assert!(x.is_detached());
        assert_eq!(runtime.active_run_count(), 0);

        frames.tick(32.0);
        assert_eq!(*results.lock(), vec![AnimationResult { finished: false }]);

        let frozen = x.read();
        x.write(500.0);
        frames.tick(48.0);
        assert_eq!(x.read(), frozen);
    }

    #[test]
    fn derived_in_unmounted_scope_is_rejected() {
        let runtime = Runtime::default();
        let scope = runtime.scope("gone");
        scope.unmount();
        assert!(matches!(scope.derived(|| 1), Err(MotiveError::Detached { .. })));
    }

    #[test]
    fn value_cells_join_the_topology_lazily() {
        let runtime = Runtime::default();
        let scope = runtime.scope("lazy");
        let cell = scope.value(1);
        assert!(!scope.contains_attached());

        let _ = cell.read();
        assert!(!scope.contains_attached());

        cell.write(2);
        assert!(scope.contains_attached());
    }
}
