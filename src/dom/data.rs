//! The per-document data side-table.
//!
//! DOM nodes never carry their round-trip metadata inline. Each element that
//! has any is given a numeric id, stored in a placeholder attribute, and the
//! records live in [`NodeData`] keyed by that id. The indirection means the
//! metadata is serialized exactly once, by the cleanup pass, instead of being
//! re-encoded on every mutation.

use crate::tokens::Tsr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The placeholder attribute holding a node's data id.
pub const DATA_ID_ATTR: &str = "data-object-id";

/// A DOM source range: `[content-start, content-end, open-width, close-width]`
/// byte offsets into the original wikitext. `None` means unknown; downstream
/// consumers must not extrapolate past an unknown offset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dsr(
    pub Option<usize>,
    pub Option<usize>,
    pub Option<usize>,
    pub Option<usize>,
);

impl Dsr {
    /// Creates a range with known endpoints and no width information.
    pub fn span(start: usize, end: usize) -> Self {
        Dsr(Some(start), Some(end), None, None)
    }

    /// True when both endpoints are known.
    pub fn is_valid(&self) -> bool {
        self.0.is_some() && self.1.is_some()
    }
}

/// Pass-scratch state. Never serialized; cleared by the pass that consumed it.
#[derive(Clone, Debug, Default)]
pub struct Tmp {
    /// Set by the tree builder on nodes it moved out of a table.
    pub fostered_candidate: bool,
    /// The end-tag source range recorded by the tree builder for elements
    /// whose close position cannot be derived from the open tag.
    pub end_tsr: Option<Tsr>,
    /// Open/close widths for wikitext constructs, consumed by the DSR pass.
    pub tag_widths: Option<(usize, usize)>,
    /// The serialized argument description carried by a transclusion's start
    /// marker, consumed by the encapsulation pass.
    pub tpl_arg_info: Option<crate::tokens::TemplateArgInfo>,
    /// Ids of the template ranges covering this node (encapsulation phase B).
    pub covered_ranges: Vec<u32>,
}

/// The `data-parsoid` record for one element.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataParsoid {
    /// The element's source range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsr: Option<Dsr>,
    /// The source range of the token that produced the element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsr: Option<Tsr>,
    /// Raw source text, for constructs whose source cannot be recovered from
    /// offsets alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// The syntax variant of the source construct (`"html"` or `"wikitext"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx: Option<String>,
    /// The element was foster-parented out of a table by the tree builder.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub fostered: bool,
    /// The close tag was implied rather than present in the source.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub auto_inserted_end: bool,
    /// The name of the first wikitext node of an encapsulated range, recorded
    /// for the serializer's newline-constraint resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_wikitext_node: Option<String>,
    /// Per-template parameter source-offset arrays for an encapsulated range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi: Option<serde_json::Value>,
    /// Pass scratch.
    #[serde(skip, default)]
    pub tmp: Tmp,
}

/// The `data-mw` record for one element: semantic metadata that survives into
/// the output for editing clients.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataMw {
    /// Ordered template parts: literal wikitext runs interleaved with
    /// `template`/`templatearg` argument objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<serde_json::Value>>,
    /// Extension tag name, for extension output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Extension invocation attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
    /// Extension tag body, when the extension asked for it to be preserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Media caption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl DataMw {
    /// True when no field is set; empty records are not serialized.
    pub fn is_empty(&self) -> bool {
        self.parts.is_none()
            && self.name.is_none()
            && self.attrs.is_none()
            && self.body.is_none()
            && self.caption.is_none()
    }
}

/// The side-table proper: data records keyed by numeric node id.
#[derive(Debug, Default)]
pub struct NodeData {
    /// The next id to hand out. Monotonically increasing per document.
    next: u32,
    /// `data-parsoid` records.
    pub parsoid: HashMap<u32, DataParsoid>,
    /// `data-mw` records.
    pub mw: HashMap<u32, DataMw>,
}

impl NodeData {
    /// Hands out a fresh id.
    pub fn fresh_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Removes the records for an id. Used by cleanup to drop data belonging
    /// to deleted nodes so the table holds no dangling ids.
    pub fn remove(&mut self, id: u32) {
        self.parsoid.remove(&id);
        self.mw.remove(&id);
    }

    /// Copies the records for `id` under a fresh id, returning it.
    pub fn clone_records(&mut self, id: u32) -> u32 {
        let fresh = self.fresh_id();
        if let Some(dp) = self.parsoid.get(&id).cloned() {
            self.parsoid.insert(fresh, dp);
        }
        if let Some(mw) = self.mw.get(&id).cloned() {
            self.mw.insert(fresh, mw);
        }
        fresh
    }
}

/// The serialized side-tables written out alongside the HTML, keyed by the
/// `id` attributes assigned during cleanup.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PageBundle {
    /// `data-parsoid` records by node id.
    pub parsoid: BTreeMap<String, DataParsoid>,
    /// `data-mw` records by node id.
    pub mw: BTreeMap<String, DataMw>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsr_serializes_as_array() {
        let dsr = Dsr(Some(0), Some(12), Some(2), None);
        let json = serde_json::to_string(&dsr).unwrap();
        assert_eq!(json, "[0,12,2,null]");
    }

    #[test]
    fn empty_flags_are_omitted() {
        let dp = DataParsoid {
            dsr: Some(Dsr::span(0, 4)),
            ..DataParsoid::default()
        };
        let json = serde_json::to_string(&dp).unwrap();
        assert_eq!(json, r#"{"dsr":[0,4,null,null]}"#);
    }

    #[test]
    fn clone_freshens_ids() {
        let mut data = NodeData::default();
        let id = data.fresh_id();
        data.parsoid.insert(id, DataParsoid::default());
        let fresh = data.clone_records(id);
        assert_ne!(id, fresh);
        assert!(data.parsoid.contains_key(&fresh));
    }
}
