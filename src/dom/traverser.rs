//! A per-tag handler registry driven over the DOM in document order.
//!
//! Handlers run in registration order for each matching node. A handler may
//! mutate the tree around the node it was given; it reports where traversal
//! should resume so the walk stays coherent across detaches and splices.

use super::{Document, NodeId};
use crate::{
    common::Result,
    env::Env,
};

/// Where to go after a handler ran.
pub enum Traverse {
    /// Descend into the node's children, then continue with its next sibling.
    Continue,
    /// Skip the node's children and continue with its next sibling.
    SkipChildren,
    /// Resume at the given node (`None` ends the current sibling run). Used
    /// by handlers that detach or replace the node they were given.
    ResumeAt(Option<NodeId>),
}

/// A traverser callback.
pub type Handler = fn(&mut Document, NodeId, &mut Env) -> Result<Traverse>;

/// An ordered set of per-tag handlers.
#[derive(Default)]
pub struct DomTraverser {
    /// `(tag filter, handler)` pairs in registration order. A `None` filter
    /// matches every node, including text and comments.
    handlers: Vec<(Option<&'static str>, Handler)>,
}

impl DomTraverser {
    /// Creates an empty traverser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the given tag name, or for every node when
    /// `tag` is `None`.
    pub fn add(mut self, tag: Option<&'static str>, handler: Handler) -> Self {
        self.handlers.push((tag, handler));
        self
    }

    /// Walks the subtree under `root` (exclusive) in document order.
    pub fn traverse(&self, doc: &mut Document, root: NodeId, env: &mut Env) -> Result {
        self.walk_children(doc, root, env)
    }

    fn walk_children(&self, doc: &mut Document, parent: NodeId, env: &mut Env) -> Result {
        let mut cur = doc.first_child(parent);
        while let Some(node) = cur {
            // The handler may detach `node`; remember where we would have
            // gone so the walk can continue from a stable point.
            let fallback = doc.next_sibling(node);
            match self.visit(doc, node, env)? {
                Traverse::ResumeAt(next) => {
                    cur = next;
                }
                Traverse::SkipChildren => {
                    cur = if doc.parent(node).is_some() {
                        doc.next_sibling(node)
                    } else {
                        fallback
                    };
                }
                Traverse::Continue => {
                    if doc.parent(node).is_some() {
                        if doc.is_element(node) {
                            self.walk_children(doc, node, env)?;
                        }
                        cur = doc.next_sibling(node);
                    } else {
                        cur = fallback;
                    }
                }
            }
        }
        Ok(())
    }

    fn visit(&self, doc: &mut Document, node: NodeId, env: &mut Env) -> Result<Traverse> {
        for (filter, handler) in &self.handlers {
            if let Some(tag) = filter {
                if doc.name(node) != *tag {
                    continue;
                }
            }
            match handler(doc, node, env)? {
                Traverse::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(Traverse::Continue)
    }
}
