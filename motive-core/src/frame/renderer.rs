//! Renderer hand-off.

use crate::graph::NodeId;
use crate::reactive::PropertyBag;

/// Receives property bags during the Rendering phase.
///
/// Only styles whose inputs changed are delivered, so a renderer should
/// treat each call as a full replacement of that view's animated props.
pub trait Renderer {
    fn apply(&mut self, node: NodeId, properties: &PropertyBag);
}

impl<F> Renderer for F
where
    F: FnMut(NodeId, &PropertyBag),
{
    fn apply(&mut self, node: NodeId, properties: &PropertyBag) {
        self(node, properties)
    }
}
