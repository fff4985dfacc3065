//! An arena-backed HTML DOM.
//!
//! Nodes are indexed by [`NodeId`] into a flat arena owned by [`Document`];
//! parents and children are id links, so tree surgery never fights the borrow
//! checker and detached subtrees simply stop being reachable. Round-trip
//! metadata lives in a separate side-table (see [`data`]), reached through a
//! numeric id stored in a placeholder attribute.

use crate::tokens::Tsr;
pub use data::{DATA_ID_ATTR, DataMw, DataParsoid, Dsr, NodeData, PageBundle};

pub mod data;
pub mod traverser;

/// An index into a document's node arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The content kind of a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// An element. The name and attributes live on the [`Node`].
    Element,
    /// A text node.
    Text(String),
    /// A comment node. The text excludes the `<!--`/`-->` delimiters.
    Comment(String),
    /// Pre-rendered HTML from an external parser, emitted verbatim. Produced
    /// only for extension tags without a native implementation.
    Raw(String),
}

/// One DOM node.
#[derive(Clone, Debug)]
pub struct Node {
    /// The content kind.
    pub kind: NodeKind,
    /// The lowercase tag name. Empty for non-elements.
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// The parent node, if attached.
    parent: Option<NodeId>,
    /// Child ids in document order.
    children: Vec<NodeId>,
}

/// An arena-backed document fragment rooted at a `<body>` element.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    /// The root `<body>` element.
    pub body: NodeId,
    /// The round-trip metadata side-table.
    pub data: NodeData,
    /// The serialized side-tables, populated by the cleanup pass.
    pub bundle: PageBundle,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            data: NodeData::default(),
            bundle: PageBundle::default(),
        };
        doc.body = doc.create_element("body");
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap());
        self.nodes.push(node);
        id
    }

    /// Allocates a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(Node {
            kind: NodeKind::Element,
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
            parent: None,
            children: Vec::new(),
        })
    }

    /// Allocates a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node {
            kind: NodeKind::Text(text.into()),
            name: String::new(),
            attrs: Vec::new(),
            parent: None,
            children: Vec::new(),
        })
    }

    /// Allocates a detached comment node.
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node {
            kind: NodeKind::Comment(text.into()),
            name: String::new(),
            attrs: Vec::new(),
            parent: None,
            children: Vec::new(),
        })
    }

    /// Borrows a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutably borrows a node.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// True when the node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element)
    }

    /// The text content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The tag name. Empty for non-elements.
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    /// True for a text node containing only whitespace, or a comment.
    pub fn is_inter_structure(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::Text(t) => t.chars().all(|c| c.is_ascii_whitespace()),
            NodeKind::Comment(_) => true,
            NodeKind::Element | NodeKind::Raw(_) => false,
        }
    }

    /// Allocates a detached raw-HTML node.
    pub fn create_raw(&mut self, html: impl Into<String>) -> NodeId {
        self.alloc(Node {
            kind: NodeKind::Raw(html.into()),
            name: String::new(),
            attrs: Vec::new(),
            parent: None,
            children: Vec::new(),
        })
    }

    // Attributes ///////////////////////////////////////////////////////////

    /// Looks up an attribute value.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing one of the same name.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let node = self.node_mut(id);
        if let Some(attr) = node.attrs.iter_mut().find(|(k, _)| k == name) {
            attr.1 = value.into();
        } else {
            node.attrs.push((name.to_string(), value.into()));
        }
    }

    /// Removes an attribute, returning its value.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let node = self.node_mut(id);
        let index = node.attrs.iter().position(|(k, _)| k == name)?;
        Some(node.attrs.remove(index).1)
    }

    /// True when the `typeof` attribute contains the given space-separated
    /// entry.
    pub fn has_type_of(&self, id: NodeId, entry: &str) -> bool {
        self.attr(id, "typeof")
            .is_some_and(|t| t.split_ascii_whitespace().any(|e| e == entry))
    }

    /// Prepends an entry to the `typeof` attribute, preserving existing
    /// entries.
    pub fn prepend_type_of(&mut self, id: NodeId, entry: &str) {
        let merged = match self.attr(id, "typeof") {
            Some(existing) if !existing.is_empty() => format!("{entry} {existing}"),
            _ => entry.to_string(),
        };
        self.set_attr(id, "typeof", merged);
    }

    // Navigation ///////////////////////////////////////////////////////////

    /// The parent node, if attached.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// The children of a node.
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// The first child.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    /// The last child.
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.last().copied()
    }

    /// The position of a node within its parent.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// The next sibling.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// The previous sibling.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index.checked_sub(1).and_then(|i| self.children(parent).get(i).copied())
    }

    /// The chain of ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            out.push(n);
            cur = self.parent(n);
        }
        out
    }

    // Mutation /////////////////////////////////////////////////////////////

    /// Appends a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "append of attached node");
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Inserts a detached node immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new: NodeId) {
        let parent = self.parent(sibling).expect("insert_before on detached node");
        let index = self.index_in_parent(sibling).unwrap();
        self.node_mut(new).parent = Some(parent);
        self.node_mut(parent).children.insert(index, new);
    }

    /// Inserts a detached node immediately after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, new: NodeId) {
        let parent = self.parent(sibling).expect("insert_after on detached node");
        let index = self.index_in_parent(sibling).unwrap();
        self.node_mut(new).parent = Some(parent);
        self.node_mut(parent).children.insert(index + 1, new);
    }

    /// Detaches a node from its parent. The node and its subtree stay in the
    /// arena but are no longer reachable from the body.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            let index = self.index_in_parent(id).unwrap();
            self.node_mut(parent).children.remove(index);
            self.node_mut(id).parent = None;
        }
    }

    /// Wraps `id` in a fresh element, which takes its place in the tree.
    pub fn wrap_in(&mut self, id: NodeId, name: &str) -> NodeId {
        let wrapper = self.create_element(name);
        if self.parent(id).is_some() {
            self.insert_before(id, wrapper);
            self.detach(id);
        }
        self.append(wrapper, id);
        wrapper
    }

    /// Deep-copies the body children of `frag` into this document before
    /// `before` (or appended to `parent` when `before` is `None`), carrying
    /// the side-table records over under fresh ids.
    pub fn import_fragment(
        &mut self,
        frag: &Document,
        parent: NodeId,
        before: Option<NodeId>,
    ) -> Vec<NodeId> {
        let roots: Vec<NodeId> = frag.children(frag.body).to_vec();
        let mut imported = Vec::with_capacity(roots.len());
        for root in roots {
            let copy = self.import_node(frag, root);
            match before {
                Some(b) => self.insert_before(b, copy),
                None => self.append(parent, copy),
            }
            imported.push(copy);
        }
        imported
    }

    fn import_node(&mut self, frag: &Document, id: NodeId) -> NodeId {
        let src = frag.node(id);
        let copy = self.alloc(Node {
            kind: src.kind.clone(),
            name: src.name.clone(),
            attrs: src.attrs.clone(),
            parent: None,
            children: Vec::new(),
        });
        // Freshen the data id so the copy owns its own records.
        if let Some(old) = frag.data_id(id) {
            let fresh = self.data.fresh_id();
            if let Some(dp) = frag.data.parsoid.get(&old).cloned() {
                self.data.parsoid.insert(fresh, dp);
            }
            if let Some(mw) = frag.data.mw.get(&old).cloned() {
                self.data.mw.insert(fresh, mw);
            }
            self.set_attr(copy, DATA_ID_ATTR, fresh.to_string());
        }
        for child in frag.children(id).to_vec() {
            let child_copy = self.import_node(frag, child);
            self.append(copy, child_copy);
        }
        copy
    }

    // Side-table access ////////////////////////////////////////////////////

    /// The node's data id, when one has been assigned.
    pub fn data_id(&self, id: NodeId) -> Option<u32> {
        self.attr(id, DATA_ID_ATTR).and_then(|v| v.parse().ok())
    }

    /// The node's data id, assigning one if needed.
    pub fn ensure_data_id(&mut self, id: NodeId) -> u32 {
        if let Some(existing) = self.data_id(id) {
            existing
        } else {
            let fresh = self.data.fresh_id();
            self.set_attr(id, DATA_ID_ATTR, fresh.to_string());
            fresh
        }
    }

    /// The node's `data-parsoid` record, when one exists.
    pub fn dp(&self, id: NodeId) -> Option<&DataParsoid> {
        self.data_id(id).and_then(|d| self.data.parsoid.get(&d))
    }

    /// The node's `data-parsoid` record, creating it if needed.
    pub fn dp_mut(&mut self, id: NodeId) -> &mut DataParsoid {
        let d = self.ensure_data_id(id);
        self.data.parsoid.entry(d).or_default()
    }

    /// The node's `data-mw` record, when one exists.
    pub fn dmw(&self, id: NodeId) -> Option<&DataMw> {
        self.data_id(id).and_then(|d| self.data.mw.get(&d))
    }

    /// The node's `data-mw` record, creating it if needed.
    pub fn dmw_mut(&mut self, id: NodeId) -> &mut DataMw {
        let d = self.ensure_data_id(id);
        self.data.mw.entry(d).or_default()
    }

    /// Convenience read of the node's DSR.
    pub fn dsr(&self, id: NodeId) -> Option<Dsr> {
        self.dp(id).and_then(|dp| dp.dsr)
    }

    /// Convenience read of the node's TSR.
    pub fn tsr(&self, id: NodeId) -> Option<Tsr> {
        self.dp(id).and_then(|dp| dp.tsr)
    }

    /// All nodes of the body subtree in document (pre) order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &child in self.children(n).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// The concatenated text content of a subtree.
    pub fn text_content(&self, root: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(root) {
            if let NodeKind::Text(t) = &self.node(n).kind {
                out.push_str(t);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_surgery() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let t = doc.create_text("hello");
        doc.append(doc.body, p);
        doc.append(p, t);

        let b = doc.create_element("b");
        doc.insert_before(t, b);
        assert_eq!(doc.children(p), &[b, t]);
        assert_eq!(doc.prev_sibling(t), Some(b));
        assert_eq!(doc.next_sibling(b), Some(t));

        doc.detach(b);
        assert_eq!(doc.children(p), &[t]);
        assert_eq!(doc.parent(b), None);

        let span = doc.wrap_in(t, "span");
        assert_eq!(doc.children(p), &[span]);
        assert_eq!(doc.children(span), &[t]);
    }

    #[test]
    fn type_of_merge_preserves_existing() {
        let mut doc = Document::new();
        let fig = doc.create_element("figure");
        doc.set_attr(fig, "typeof", "mw:Image");
        doc.prepend_type_of(fig, "mw:Transclusion");
        assert_eq!(doc.attr(fig, "typeof"), Some("mw:Transclusion mw:Image"));
        assert!(doc.has_type_of(fig, "mw:Image"));
        assert!(doc.has_type_of(fig, "mw:Transclusion"));
    }

    #[test]
    fn import_freshens_data_ids() {
        let mut frag = Document::new();
        let span = frag.create_element("span");
        frag.append(frag.body, span);
        frag.dp_mut(span).dsr = Some(Dsr::span(0, 4));

        let mut doc = Document::new();
        // Occupy id 0 in the target document first.
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        doc.ensure_data_id(p);

        let imported = doc.import_fragment(&frag, doc.body, None);
        assert_eq!(imported.len(), 1);
        let copy = imported[0];
        assert_ne!(doc.data_id(copy), frag.data_id(span));
        assert_eq!(doc.dp(copy).unwrap().dsr, Some(Dsr::span(0, 4)));
    }
}
