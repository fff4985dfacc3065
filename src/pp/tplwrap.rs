//! Pass 9: template range encapsulation.
//!
//! Each transclusion left a start/end marker meta pair in the DOM, joined by
//! an about id. This pass finds the minimal DOM subtree covering each
//! expansion (phase A), resolves nesting and overlap between ranges (phase
//! B), and rewrites each surviving top-level range into its encapsulated
//! form (phase C): one element carrying the transclusion `typeof` and the
//! full `data-mw`, every sibling in the range sharing the `about`, and the
//! markers removed.

use super::fixups::is_marker_meta;
use crate::{
    common::Result,
    dom::{Document, Dsr, NodeId},
    env::Env,
    tokens::TemplateArgInfo,
};
use std::collections::{HashMap, HashSet};

/// One wrappable transclusion range.
#[derive(Debug)]
struct TplRange {
    /// Sequential id, assigned in document order of the end markers.
    id: u32,
    /// The shared about id (`#mwt<n>`).
    about: String,
    /// The start marker meta. The end marker stands in when the start was
    /// lost to foster-parenting.
    start_elem: NodeId,
    /// The end marker meta.
    end_elem: NodeId,
    /// The first node of the range, after climbing to the common ancestor.
    start: NodeId,
    /// The last node of the range.
    end: NodeId,
    /// The range's source start, from the start marker's DSR.
    start_offset: Option<usize>,
    /// The end marker was fostered in front of the start.
    flipped: bool,
    /// The range is a `{{{…}}}` parameter, not a `{{…}}` transclusion.
    is_param: bool,
}

impl TplRange {
    /// The endpoints in document order, regardless of `flipped`.
    fn ordered(&self) -> (NodeId, NodeId) {
        if self.flipped {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        }
    }
}

/// One transclusion's contribution to a compound `data-mw.parts`.
#[derive(Debug)]
struct PartSource {
    is_param: bool,
    info: Option<TemplateArgInfo>,
    span: Option<(usize, usize)>,
}

/// Runs the pass.
pub fn wrap(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let ranges = find_wrappable_template_ranges(doc);
    if ranges.is_empty() {
        return Ok(());
    }
    let (top, compounds) = find_top_level_non_overlapping_ranges(doc, ranges)?;
    encapsulate_templates(doc, env, top, compounds)
}

fn fosterable_position(doc: &Document, node: NodeId) -> bool {
    doc.parent(node)
        .is_some_and(|p| matches!(doc.name(p), "table" | "tbody" | "tr"))
}

////////////////////////////////////////////////////////////////////////////
// Phase A
////////////////////////////////////////////////////////////////////////////

fn find_wrappable_template_ranges(doc: &mut Document) -> Vec<TplRange> {
    // Pair markers by about id, in document order.
    let mut open: HashMap<String, NodeId> = HashMap::new();
    let mut pairs: Vec<(String, NodeId, NodeId, bool)> = Vec::new();
    for node in doc.descendants(doc.body) {
        if !is_marker_meta(doc, node) {
            continue;
        }
        let type_of = doc.attr(node, "typeof").unwrap_or_default().to_string();
        let about = doc.attr(node, "about").unwrap_or_default().to_string();
        let is_param = type_of.starts_with("mw:Param");
        if type_of.ends_with("/End") {
            match open.remove(&about) {
                Some(start) => pairs.push((about, start, node, is_param)),
                None => {
                    // Foster-parenting can reorder the markers; the end
                    // marker serves as both endpoints.
                    log::warn!(target: "tplwrap", "end marker for {about} found before its start");
                    pairs.push((about, node, node, is_param));
                }
            }
        } else {
            open.insert(about, node);
        }
    }
    for (about, node) in open {
        log::warn!(target: "tplwrap", "unterminated transclusion {about}");
        doc.detach(node);
    }

    let mut ranges = Vec::with_capacity(pairs.len());
    for (id, (about, start_elem, end_elem, is_param)) in pairs.into_iter().enumerate() {
        let (mut start, mut end) = minimal_range(doc, start_elem, end_elem);

        // Adjacent markers with nothing between them get a synthetic,
        // wrappable target.
        if start == start_elem
            && end == end_elem
            && doc.next_sibling(start_elem) == Some(end_elem)
            && !fosterable_position(doc, start_elem)
        {
            let span = doc.create_element("span");
            doc.insert_before(end_elem, span);
            if let Some(dsr) = doc.dsr(start_elem) {
                doc.dp_mut(span).dsr = Some(Dsr(dsr.1, dsr.1, Some(0), Some(0)));
            }
        }

        // A non-element range start in a fosterable position cannot anchor
        // the range. Push leading whitespace and comments into the
        // following row when possible; otherwise the range grows to the
        // parent.
        if fosterable_position(doc, start) && !doc.is_element(start) {
            let mut probe = Some(start);
            let mut leading = Vec::new();
            while let Some(n) = probe {
                if n != end && doc.is_inter_structure(n) {
                    leading.push(n);
                    probe = doc.next_sibling(n);
                } else {
                    break;
                }
            }
            match probe {
                Some(row) if matches!(doc.name(row), "tr" | "tbody") && row != end => {
                    let anchor = doc.first_child(row);
                    for &ws in leading.iter().rev() {
                        doc.detach(ws);
                        match anchor {
                            Some(anchor) => doc.insert_before(anchor, ws),
                            None => doc.append(row, ws),
                        }
                    }
                    start = row;
                }
                _ => {
                    let parent = doc.parent(start).expect("fosterable nodes have parents");
                    start = parent;
                    end = relevel(doc, end, parent).unwrap_or(start);
                }
            }
        }

        // A non-element start elsewhere gets a wrapper span, which adopts
        // the start marker's range.
        if !doc.is_element(start) {
            let wrapper = doc.wrap_in(start, "span");
            if let Some(dsr) = doc.dsr(start_elem) {
                doc.dp_mut(wrapper).dsr = Some(dsr);
            }
            if end == start {
                end = wrapper;
            }
            start = wrapper;
        }

        // A range anchored at a table reaches back over content the tree
        // builder fostered out of it.
        while doc.name(start) == "table" {
            match doc.prev_sibling(start) {
                Some(prev) if doc.dp(prev).is_some_and(|dp| dp.fostered) => start = prev,
                _ => break,
            }
        }

        // Conversely, a range whose markers were all fostered sits just in
        // front of the table its content belongs to; the table is part of
        // the range.
        if end == end_elem && doc.dp(end_elem).is_some_and(|dp| dp.fostered) {
            let mut probe = doc.next_sibling(end);
            while let Some(n) = probe {
                if doc.is_inter_structure(n) {
                    probe = doc.next_sibling(n);
                } else {
                    break;
                }
            }
            if let Some(table) = probe {
                if doc.name(table) == "table" {
                    end = table;
                }
            }
        }

        // Fostering may have put the endpoints out of sibling order.
        let flipped = match (doc.index_in_parent(start), doc.index_in_parent(end)) {
            (Some(a), Some(b)) if doc.parent(start) == doc.parent(end) => a > b,
            _ => false,
        };

        let start_offset = doc.dsr(start_elem).and_then(|d| d.0);
        ranges.push(TplRange {
            id: id as u32,
            about,
            start_elem,
            end_elem,
            start,
            end,
            start_offset,
            flipped,
            is_param,
        });
    }
    ranges
}

/// Climbs to the common ancestor of the markers and returns its children on
/// the two paths.
fn minimal_range(doc: &Document, start: NodeId, end: NodeId) -> (NodeId, NodeId) {
    if start == end {
        return (start, end);
    }
    // Ancestor set of the start, each mapped to the start-path child below
    // it.
    let mut path_child: HashMap<NodeId, NodeId> = HashMap::new();
    let mut cur = start;
    while let Some(parent) = doc.parent(cur) {
        path_child.insert(parent, cur);
        cur = parent;
    }
    let mut end_child = end;
    loop {
        let Some(parent) = doc.parent(end_child) else {
            // Detached subtree; fall back to the markers themselves.
            return (start, end);
        };
        if let Some(&start_child) = path_child.get(&parent) {
            return (start_child, end_child);
        }
        end_child = parent;
    }
}

/// Walks `node` up until its parent is `parent`.
fn relevel(doc: &Document, node: NodeId, parent: NodeId) -> Option<NodeId> {
    let mut cur = node;
    loop {
        let p = doc.parent(cur)?;
        if p == parent {
            return Some(cur);
        }
        cur = p;
    }
}

////////////////////////////////////////////////////////////////////////////
// Phase B
////////////////////////////////////////////////////////////////////////////

type Compounds = HashMap<u32, Vec<PartSource>>;

fn find_top_level_non_overlapping_ranges(
    doc: &mut Document,
    mut ranges: Vec<TplRange>,
) -> Result<(Vec<TplRange>, Compounds)> {
    // 1. Tag every sibling in every range's span with the covering range
    //    ids.
    for range in &ranges {
        let (start, end) = range.ordered();
        let id = range.id;
        let mut cur = Some(start);
        while let Some(node) = cur {
            doc.dp_mut(node).tmp.covered_ranges.push(id);
            if node == end {
                break;
            }
            cur = doc.next_sibling(node);
        }
    }

    // 2. A range whose start has an ancestor covered by another range is
    //    nested inside it; record the outermost enclosing range.
    let offsets: HashMap<u32, Option<usize>> =
        ranges.iter().map(|r| (r.id, r.start_offset)).collect();
    let mut subsumed: HashMap<u32, u32> = HashMap::new();
    for range in &ranges {
        let (start, _) = range.ordered();
        let mut enclosing: Option<u32> = None;
        for ancestor in doc.ancestors(start) {
            let covering = doc
                .dp(ancestor)
                .map(|dp| dp.tmp.covered_ranges.clone())
                .unwrap_or_default();
            for other in covering {
                if other == range.id {
                    continue;
                }
                let better = match enclosing {
                    None => true,
                    Some(cur) => offset_key(&offsets, other) < offset_key(&offsets, cur),
                };
                if better {
                    enclosing = Some(other);
                }
            }
        }
        if let Some(enclosing) = enclosing {
            insert_subsumed(&mut subsumed, range.id, enclosing);
        }
    }

    // 3. Ranges sharing both endpoints collapse into the textually earlier
    //    one.
    for i in 0..ranges.len() {
        for j in (i + 1)..ranges.len() {
            let (a, b) = (&ranges[i], &ranges[j]);
            if a.ordered() != b.ordered() {
                continue;
            }
            let (inner, outer) = if offset_key(&offsets, a.id) <= offset_key(&offsets, b.id) {
                (b.id, a.id)
            } else {
                (a.id, b.id)
            };
            insert_subsumed(&mut subsumed, inner, outer);
        }
    }

    // 4. Textual order.
    ranges.sort_by_key(|r| (r.start_offset.unwrap_or(usize::MAX), r.id));

    // 5. Emit top-level ranges, folding subsumed and overlapping ranges
    //    into their hosts.
    let mut top: Vec<TplRange> = Vec::new();
    let mut compounds: Compounds = HashMap::new();
    for range in ranges {
        if subsumed.contains_key(&range.id) {
            let host = resolve_subsumed(&subsumed, range.id);
            let part = part_source(doc, &range);
            strip_markers(doc, &range);
            compounds.entry(host).or_default().push(part);
            continue;
        }

        if let Some(prev) = top.last_mut() {
            if overlaps(doc, prev, &range) {
                if range.flipped {
                    // Tree-builder reordering never produces a flipped
                    // range that overlaps its predecessor; reaching this
                    // point is a programmer error.
                    debug_assert!(false, "flipped range in overlap merge");
                    return Err(crate::common::Error::Internal(format!(
                        "flipped range {} reached the overlap merge",
                        range.about
                    )));
                }
                // The merged range keeps the later end marker; the
                // superseded one and the newcomer's start marker go.
                let old_end = prev.end_elem;
                if doc.name(old_end) == "meta" && doc.parent(old_end).is_some() {
                    doc.detach(old_end);
                }
                prev.end = range.end;
                prev.end_elem = range.end_elem;
                let part = part_source(doc, &range);
                if doc.name(range.start_elem) == "meta" && doc.parent(range.start_elem).is_some() {
                    doc.detach(range.start_elem);
                }
                compounds.entry(prev.id).or_default().push(part);
                continue;
            }
        }

        compounds
            .entry(range.id)
            .or_default()
            .push(part_source(doc, &range));
        top.push(range);
    }

    Ok((top, compounds))
}

fn offset_key(offsets: &HashMap<u32, Option<usize>>, id: u32) -> (usize, u32) {
    (
        offsets.get(&id).copied().flatten().unwrap_or(usize::MAX),
        id,
    )
}

/// Records `inner → outer`, refusing edges that would close a cycle.
fn insert_subsumed(subsumed: &mut HashMap<u32, u32>, inner: u32, outer: u32) {
    if inner == outer {
        return;
    }
    // Walk outer's chain; if it reaches inner the edge would be circular.
    let mut seen = HashSet::new();
    let mut cur = outer;
    while let Some(&next) = subsumed.get(&cur) {
        if next == inner || !seen.insert(next) {
            debug_assert!(next != inner, "cycle in subsumed ranges");
            log::warn!(target: "tplwrap", "refusing circular subsumption {inner} -> {outer}");
            return;
        }
        cur = next;
    }
    subsumed.entry(inner).or_insert(outer);
}

fn resolve_subsumed(subsumed: &HashMap<u32, u32>, id: u32) -> u32 {
    let mut cur = id;
    let mut seen = HashSet::new();
    while let Some(&next) = subsumed.get(&cur) {
        if !seen.insert(next) {
            break;
        }
        cur = next;
    }
    cur
}

/// Sibling-order overlap check between a settled range and the next one.
fn overlaps(doc: &Document, prev: &TplRange, next: &TplRange) -> bool {
    let (_, prev_end) = prev.ordered();
    let (next_start, _) = next.ordered();
    if doc.parent(prev_end) != doc.parent(next_start) || doc.parent(prev_end).is_none() {
        return false;
    }
    match (doc.index_in_parent(next_start), doc.index_in_parent(prev_end)) {
        (Some(ns), Some(pe)) => ns <= pe,
        _ => false,
    }
}

fn part_source(doc: &Document, range: &TplRange) -> PartSource {
    let info = doc
        .dp(range.start_elem)
        .and_then(|dp| dp.tmp.tpl_arg_info.clone());
    let span = doc
        .dsr(range.start_elem)
        .and_then(|d| Some((d.0?, d.1?)));
    PartSource { is_param: range.is_param, info, span }
}

fn strip_markers(doc: &mut Document, range: &TplRange) {
    for node in [range.start_elem, range.end_elem] {
        if doc.name(node) == "meta" && doc.parent(node).is_some() {
            doc.detach(node);
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// Phase C
////////////////////////////////////////////////////////////////////////////

fn encapsulate_templates(
    doc: &mut Document,
    env: &mut Env,
    top: Vec<TplRange>,
    mut compounds: Compounds,
) -> Result {
    for range in top {
        if range.flipped {
            log::warn!(target: "tplwrap", "flipped range {} encapsulated as-is", range.about);
        }
        let (start, end) = range.ordered();
        if doc.parent(start).is_none() || doc.parent(start) != doc.parent(end) {
            log::warn!(target: "tplwrap", "range {} lost its endpoints", range.about);
            strip_markers(doc, &range);
            continue;
        }

        // 1. Every node in the range shares the about id. Non-element
        //    nodes in unfosterable positions get a wrapper span; in
        //    fosterable positions the tree builder already guarantees they
        //    are inter-element whitespace, which is left alone.
        let mut siblings = Vec::new();
        let mut cur = Some(start);
        while let Some(node) = cur {
            siblings.push(node);
            if node == end {
                break;
            }
            cur = doc.next_sibling(node);
        }
        let mut stamped = Vec::with_capacity(siblings.len());
        for node in siblings {
            if doc.is_element(node) {
                doc.set_attr(node, "about", range.about.clone());
                stamped.push(node);
            } else if !fosterable_position(doc, node) && !doc.is_inter_structure(node) {
                let wrapper = doc.wrap_in(node, "span");
                doc.set_attr(wrapper, "about", range.about.clone());
                stamped.push(wrapper);
            } else {
                stamped.push(node);
            }
        }

        // 2. The encapsulation target: the first element that is not a
        //    marker meta.
        let target = stamped.iter().copied().find(|&n| {
            doc.is_element(n) && !is_marker_meta(doc, n) && n != range.end_elem
        });
        let Some(target) = target else {
            let err = crate::common::Error::Encapsulation { about: range.about.clone() };
            log::error!(target: "tplwrap", "{err}");
            strip_markers(doc, &range);
            continue;
        };

        // 3. The transclusion type joins any pre-existing types.
        let base_type = if range.is_param { "mw:Param" } else { "mw:Transclusion" };
        doc.prepend_type_of(target, base_type);

        // 4. The range's DSR comes from the markers.
        let start_dsr = doc.dsr(range.start_elem);
        let valid = start_dsr.is_some_and(|d| d.is_valid());
        if !valid {
            log::warn!(
                target: "tplwrap",
                "skipping encapsulation data for {}: no source range",
                range.about
            );
            strip_markers(doc, &range);
            continue;
        }
        let start_dsr = start_dsr.unwrap();
        let mut ds = start_dsr.0.unwrap();
        let mut de = start_dsr.1.unwrap();
        if let Some(end_dsr) = doc.dsr(end) {
            if let Some(e1) = end_dsr.1 {
                if e1 > de {
                    de = e1;
                }
            }
            let start_fostered = doc.dp(start).is_some_and(|dp| dp.fostered);
            if doc.name(end) == "table" {
                if let Some(e0) = end_dsr.0 {
                    if e0 < ds || start_fostered {
                        ds = e0;
                    }
                }
            }
        }

        // 5. Assemble data-mw.parts, with interstitial wikitext for gaps.
        let sources = compounds.remove(&range.id).unwrap_or_default();
        let (parts, param_infos) = build_parts(env, sources, ds, de);
        let single_part = parts.len() == 1;

        // 6. Fostered single-part ranges cannot be usefully round-tripped —
        //    unless the range grew to cover its table, whose source span is
        //    real.
        let range_fostered = doc.dp(start).is_some_and(|dp| dp.fostered);
        let mut dsr = Dsr(Some(ds), Some(de), None, None);
        if range_fostered && single_part && doc.name(end) != "table" {
            dsr.1 = dsr.0;
        }

        if let Some(name) = first_wikitext_node_name(&parts, doc.name(target)) {
            doc.dp_mut(target).first_wikitext_node = Some(name);
        }
        doc.dp_mut(target).dsr = Some(dsr);
        if !param_infos.is_empty() {
            doc.dp_mut(target).pi = Some(serde_json::Value::Array(param_infos));
        }
        doc.dmw_mut(target).parts = Some(parts);

        // 7. The markers have served their purpose.
        if range.start_elem != target {
            strip_markers(doc, &range);
        } else {
            if doc.name(range.end_elem) == "meta" && doc.parent(range.end_elem).is_some() {
                doc.detach(range.end_elem);
            }
        }
    }
    Ok(())
}

/// Builds the ordered `parts` array and the per-template parameter offset
/// arrays.
fn build_parts(
    env: &Env,
    mut sources: Vec<PartSource>,
    range_start: usize,
    range_end: usize,
) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
    sources.sort_by_key(|s| s.span.map(|(a, _)| a).unwrap_or(usize::MAX));

    let src = &env.page.source;
    let mut parts = Vec::new();
    let mut param_infos = Vec::new();
    let mut cursor = range_start;
    for source in &sources {
        if let Some((s, e)) = source.span {
            if s > cursor {
                if let Some(gap) = src.get(cursor..s) {
                    parts.push(serde_json::Value::String(gap.to_string()));
                }
            }
            cursor = cursor.max(e);
        }
        let Some(info) = &source.info else {
            continue;
        };
        let mut params = serde_json::Map::new();
        let mut pi = Vec::new();
        for p in &info.params {
            params.insert(p.k.clone(), serde_json::json!({ "wt": p.v }));
            let mut entry = serde_json::json!({ "k": p.k });
            if let Some(span) = p.v_span {
                entry["srcOffsets"] = serde_json::json!([span.0, span.1]);
            }
            pi.push(entry);
        }
        param_infos.push(serde_json::Value::Array(pi));

        let key = if source.is_param { "templatearg" } else { "template" };
        parts.push(serde_json::json!({
            key: {
                "target": { "wt": info.target.wt },
                "params": params,
            }
        }));
    }
    if cursor < range_end {
        if let Some(tail) = src.get(cursor..range_end) {
            parts.push(serde_json::Value::String(tail.to_string()));
        }
    }
    (parts, param_infos)
}

/// When a literal run precedes the first templated content, the serializer
/// needs to know which DOM node starts the templated part.
fn first_wikitext_node_name(parts: &[serde_json::Value], target_name: &str) -> Option<String> {
    match parts.first() {
        Some(serde_json::Value::String(_)) => Some(target_name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{Env, InMemoryDataAccess, PageConfig},
        tokens::{TemplateParam, TemplateTarget, Tsr},
    };

    fn env_for(src: &str) -> Env {
        Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", src),
            Box::new(InMemoryDataAccess::new()),
        )
    }

    fn marker(doc: &mut Document, type_of: &str, about: &str, tsr: (usize, usize)) -> NodeId {
        let meta = doc.create_element("meta");
        doc.set_attr(meta, "typeof", type_of);
        doc.set_attr(meta, "about", about);
        doc.dp_mut(meta).tsr = Some(Tsr(tsr.0, tsr.1));
        doc.dp_mut(meta).dsr = Some(Dsr(Some(tsr.0), Some(tsr.1), None, None));
        meta
    }

    fn arg_info(target: &str, params: &[(&str, &str)], span: (usize, usize)) -> TemplateArgInfo {
        TemplateArgInfo {
            target: TemplateTarget { wt: target.into(), href: None },
            params: params
                .iter()
                .map(|(k, v)| TemplateParam {
                    k: (*k).into(),
                    v: (*v).into(),
                    named: false,
                    k_span: None,
                    v_span: None,
                })
                .collect(),
            span: Tsr(span.0, span.1),
        }
    }

    /// `{{echo|foo}}` expanded into `startmeta <p>foo</p> endmeta`.
    #[test]
    fn simple_range_encapsulates_on_paragraph() {
        let src = "{{echo|foo}}";
        let mut env = env_for(src);
        let mut doc = Document::new();
        let start = marker(&mut doc, "mw:Transclusion", "#mwt1", (0, 12));
        doc.dp_mut(start).tmp.tpl_arg_info = Some(arg_info("echo", &[("1", "foo")], (0, 12)));
        doc.append(doc.body, start);
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let text = doc.create_text("foo");
        doc.append(p, text);
        let end = marker(&mut doc, "mw:Transclusion/End", "#mwt1", (12, 12));
        doc.append(doc.body, end);

        wrap(&mut doc, &mut env, true).unwrap();

        assert_eq!(doc.children(doc.body).to_vec(), vec![p], "markers removed");
        assert!(doc.has_type_of(p, "mw:Transclusion"));
        assert_eq!(doc.attr(p, "about"), Some("#mwt1"));
        assert_eq!(doc.dsr(p), Some(Dsr(Some(0), Some(12), None, None)));
        let parts = doc.dmw(p).unwrap().parts.clone().unwrap();
        assert_eq!(
            parts,
            vec![serde_json::json!({
                "template": {
                    "target": { "wt": "echo" },
                    "params": { "1": { "wt": "foo" } },
                }
            })]
        );
    }

    /// Nested expansion: the inner range is subsumed and contributes its
    /// argument info to the outer wrapper's parts.
    #[test]
    fn nested_range_is_subsumed() {
        let src = "{{outer|{{inner}}}}";
        let mut env = env_for(src);
        let mut doc = Document::new();

        let o_start = marker(&mut doc, "mw:Transclusion", "#mwt1", (0, 19));
        doc.dp_mut(o_start).tmp.tpl_arg_info =
            Some(arg_info("outer", &[("1", "{{inner}}")], (0, 19)));
        doc.append(doc.body, o_start);

        let div = doc.create_element("div");
        doc.append(doc.body, div);
        let i_start = marker(&mut doc, "mw:Transclusion", "#mwt2", (8, 17));
        doc.dp_mut(i_start).tmp.tpl_arg_info = Some(arg_info("inner", &[], (8, 17)));
        doc.append(div, i_start);
        let span = doc.create_element("span");
        doc.append(div, span);
        let i_end = marker(&mut doc, "mw:Transclusion/End", "#mwt2", (17, 17));
        doc.append(div, i_end);

        let o_end = marker(&mut doc, "mw:Transclusion/End", "#mwt1", (19, 19));
        doc.append(doc.body, o_end);

        wrap(&mut doc, &mut env, true).unwrap();

        assert!(doc.has_type_of(div, "mw:Transclusion"));
        assert!(
            !doc.has_type_of(span, "mw:Transclusion"),
            "no separate top-level wrapper for the inner range"
        );
        let parts = doc.dmw(div).unwrap().parts.clone().unwrap();
        assert_eq!(parts.len(), 2, "outer part plus subsumed inner part: {parts:?}");
        assert!(parts[0]["template"]["target"]["wt"] == "outer");
        assert!(parts[1]["template"]["target"]["wt"] == "inner");
    }

    /// Interleaved markers (the tree builder reordered content across the
    /// two expansions) merge into one wrapper covering the union, with
    /// ordered parts.
    #[test]
    fn overlapping_ranges_merge() {
        let src = "{{a}}{{b}}";
        let mut env = env_for(src);
        let mut doc = Document::new();

        // Document order: aStart, A, bStart, aEnd, B, bEnd — the second
        // range starts before the first one ends.
        let a_start = marker(&mut doc, "mw:Transclusion", "#mwt1", (0, 5));
        doc.dp_mut(a_start).tmp.tpl_arg_info = Some(arg_info("a", &[], (0, 5)));
        doc.append(doc.body, a_start);
        let a_text = doc.create_text("A");
        doc.append(doc.body, a_text);
        let b_start = marker(&mut doc, "mw:Transclusion", "#mwt2", (5, 10));
        doc.dp_mut(b_start).tmp.tpl_arg_info = Some(arg_info("b", &[], (5, 10)));
        doc.append(doc.body, b_start);
        let a_end = marker(&mut doc, "mw:Transclusion/End", "#mwt1", (5, 5));
        doc.append(doc.body, a_end);
        let b_text = doc.create_text("B");
        doc.append(doc.body, b_text);
        let b_end = marker(&mut doc, "mw:Transclusion/End", "#mwt2", (10, 10));
        doc.append(doc.body, b_end);

        wrap(&mut doc, &mut env, true).unwrap();

        // Exactly one wrapper covering the union survives.
        let wrappers: Vec<_> = doc
            .descendants(doc.body)
            .into_iter()
            .filter(|&n| doc.has_type_of(n, "mw:Transclusion"))
            .collect();
        assert_eq!(wrappers.len(), 1, "one merged wrapper");
        let wrapper = wrappers[0];
        assert_eq!(doc.dsr(wrapper), Some(Dsr(Some(0), Some(10), None, None)));
        let parts = doc.dmw(wrapper).unwrap().parts.clone().unwrap();
        assert_eq!(parts.len(), 2, "a then b: {parts:?}");
        assert_eq!(parts[0]["template"]["target"]["wt"], "a");
        assert_eq!(parts[1]["template"]["target"]["wt"], "b");
        // No markers survive anywhere.
        for node in doc.descendants(doc.body) {
            assert!(!is_marker_meta(&doc, node), "marker meta survived");
        }
    }

    /// A transclusion inside a table: the expansion is fostered out and the
    /// wrapper range pulls its start down to the table's.
    #[test]
    fn fostered_range_covers_table() {
        let src = "{|\n{{echo|foo}}\n|}";
        let mut env = env_for(src);
        let mut doc = Document::new();

        let start = marker(&mut doc, "mw:Transclusion", "#mwt1", (3, 15));
        doc.dp_mut(start).tmp.tpl_arg_info = Some(arg_info("echo", &[("1", "foo")], (3, 15)));
        doc.dp_mut(start).fostered = true;
        doc.append(doc.body, start);
        let text = doc.create_text("foo");
        doc.append(doc.body, text);
        doc.dp_mut(text).fostered = true;
        let end = marker(&mut doc, "mw:Transclusion/End", "#mwt1", (15, 15));
        doc.dp_mut(end).fostered = true;
        doc.append(doc.body, end);
        let table = doc.create_element("table");
        doc.append(doc.body, table);
        doc.dp_mut(table).dsr = Some(Dsr(Some(0), Some(18), Some(2), Some(2)));

        wrap(&mut doc, &mut env, true).unwrap();

        // The fostered text was wrapped so the range has an element target.
        let kids = doc.children(doc.body).to_vec();
        let wrapper = kids
            .iter()
            .copied()
            .find(|&n| doc.has_type_of(n, "mw:Transclusion"))
            .expect("a wrapper exists");
        assert_eq!(doc.attr(wrapper, "about"), Some("#mwt1"));
        // The table end pulls the range over the whole construct.
        let dsr = doc.dsr(wrapper).unwrap();
        assert_eq!(dsr.0, Some(0), "start pulled down to the table's");
        assert_eq!(dsr.1, Some(18));
        for node in doc.descendants(doc.body) {
            assert!(!is_marker_meta(&doc, node));
        }
    }
}
