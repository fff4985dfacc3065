//! Pass 8: DOM source range computation.
//!
//! A bottom-up walk that assigns `[content-start, content-end, open-width,
//! close-width]` to every element, from the token source ranges recorded by
//! the tree builder and the known widths of the wikitext constructs they
//! represent. Offsets flow forward through siblings: a node with a known
//! range re-synchronizes the stream; an unknown range propagates `None`
//! rather than extrapolating.
//!
//! Content between transclusion markers deliberately stays unknown — its
//! offsets would point into the template's source, not this document's.
//! The encapsulation pass derives the wrapper's range from the markers.

use super::fixups::is_marker_meta;
use crate::{
    common::Result,
    dom::{Document, Dsr, NodeId, NodeKind},
    env::Env,
};

/// Runs the pass.
pub fn compute(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let src_len = env.page.source.len();
    let body = doc.body;
    let end = walk_children(doc, body, Some(0), src_len);
    let body_end = end.or(Some(src_len));
    doc.dp_mut(body).dsr = Some(Dsr(Some(0), body_end, Some(0), Some(0)));
    validate(doc, src_len);
    Ok(())
}

/// Walks the children of `node`, threading the running offset. Returns the
/// offset after the last child, when known.
fn walk_children(doc: &mut Document, node: NodeId, start: Option<usize>, src_len: usize) -> Option<usize> {
    let mut cs = start;
    for child in doc.children(node).to_vec() {
        // A transclusion's expanded content carries no usable offsets; the
        // stream resumes at the end marker.
        if is_marker_meta(doc, child) {
            let tsr = doc.tsr(child);
            if let Some(tsr) = tsr {
                doc.dp_mut(child).dsr = Some(Dsr(Some(tsr.0), Some(tsr.1), None, None));
            }
            let is_end = doc
                .attr(child, "typeof")
                .is_some_and(|t| t.ends_with("/End"));
            cs = if is_end { tsr.map(|t| t.1) } else { None };
            continue;
        }

        cs = node_span(doc, child, cs, src_len);
    }
    cs
}

/// Computes and stores the span of one node, returning the offset after it.
fn node_span(doc: &mut Document, node: NodeId, cs: Option<usize>, src_len: usize) -> Option<usize> {
    match &doc.node(node).kind {
        NodeKind::Text(t) => cs.map(|c| c + t.len()),
        NodeKind::Comment(t) => cs.map(|c| c + t.len() + "<!---->".len()),
        NodeKind::Raw(_) => None,
        NodeKind::Element => element_span(doc, node, cs, src_len),
    }
}

fn element_span(doc: &mut Document, node: NodeId, cs: Option<usize>, src_len: usize) -> Option<usize> {
    let (tsr, tag_widths, end_tsr) = {
        let dp = doc.dp(node);
        (
            dp.and_then(|dp| dp.tsr),
            dp.and_then(|dp| dp.tmp.tag_widths),
            dp.and_then(|dp| dp.tmp.end_tsr),
        )
    };

    let dsr = if let (Some(tsr), Some((open_w, close_w))) = (tsr, tag_widths) {
        // The token range covers the whole construct and the construct's
        // open/close widths are known (headings; table cells have a zero
        // close width and an end recovered from content).
        let content_start = tsr.0 + open_w;
        if close_w > 0 {
            walk_children(doc, node, Some(content_start), src_len);
            Dsr(Some(tsr.0), Some(tsr.1), Some(open_w), Some(close_w))
        } else {
            let content_end = walk_children(doc, node, Some(content_start), src_len);
            Dsr(Some(tsr.0), content_end, Some(open_w), Some(0))
        }
    } else if let Some(tsr) = tsr {
        // The token range covers the open tag (literal HTML, table
        // structure lines).
        let open_w = tsr.len();
        let content_end = walk_children(doc, node, Some(tsr.1), src_len);
        match end_tsr {
            Some(end) => Dsr(Some(tsr.0), Some(end.1), Some(open_w), Some(end.len())),
            None => Dsr(Some(tsr.0), content_end, Some(open_w), Some(0)),
        }
    } else {
        // No source information of its own: the element covers exactly its
        // children.
        let content_end = walk_children(doc, node, cs, src_len);
        Dsr(cs, content_end, Some(0), Some(0))
    };

    doc.dp_mut(node).dsr = Some(dsr);
    dsr.1
}

/// Nulls out ranges that violate `0 ≤ a ≤ b ≤ len(source)`.
fn validate(doc: &mut Document, src_len: usize) {
    for node in doc.descendants(doc.body) {
        let Some(dsr) = doc.dsr(node) else { continue };
        let ok = match (dsr.0, dsr.1) {
            (Some(a), Some(b)) => a <= b && b <= src_len,
            (Some(a), None) => a <= src_len,
            (None, Some(b)) => b <= src_len,
            (None, None) => true,
        };
        if !ok {
            log::debug!(target: "dsr", "dropping inconsistent range {dsr:?}");
            doc.dp_mut(node).dsr = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{Env, InMemoryDataAccess, PageConfig},
        tokens::Tsr,
    };

    fn env_for(src: &str) -> Env {
        Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", src),
            Box::new(InMemoryDataAccess::new()),
        )
    }

    #[test]
    fn heading_widths() {
        // "==ab==\n"
        let mut doc = Document::new();
        let h = doc.create_element("h2");
        doc.append(doc.body, h);
        {
            let dp = doc.dp_mut(h);
            dp.tsr = Some(Tsr(0, 6));
            dp.tmp.tag_widths = Some((2, 2));
        }
        let t = doc.create_text("ab");
        doc.append(h, t);
        let nl = doc.create_text("\n");
        doc.append(doc.body, nl);

        compute(&mut doc, &mut env_for("==ab==\n"), true).unwrap();
        assert_eq!(doc.dsr(h), Some(Dsr(Some(0), Some(6), Some(2), Some(2))));
    }

    #[test]
    fn synthetic_paragraph_flows_from_text() {
        // "hi"
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let t = doc.create_text("hi");
        doc.append(p, t);

        compute(&mut doc, &mut env_for("hi"), true).unwrap();
        assert_eq!(doc.dsr(p), Some(Dsr(Some(0), Some(2), Some(0), Some(0))));
    }

    #[test]
    fn content_between_markers_stays_unknown() {
        // "{{echo|foo}}" expanded: startmeta, p(foo), endmeta
        let src = "{{echo|foo}}";
        let mut doc = Document::new();
        let start = doc.create_element("meta");
        doc.set_attr(start, "typeof", "mw:Transclusion");
        doc.append(doc.body, start);
        doc.dp_mut(start).tsr = Some(Tsr(0, 12));
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let t = doc.create_text("foo");
        doc.append(p, t);
        let end = doc.create_element("meta");
        doc.set_attr(end, "typeof", "mw:Transclusion/End");
        doc.append(doc.body, end);
        doc.dp_mut(end).tsr = Some(Tsr(12, 12));

        compute(&mut doc, &mut env_for(src), true).unwrap();
        assert_eq!(doc.dsr(start), Some(Dsr(Some(0), Some(12), None, None)));
        assert_eq!(
            doc.dsr(p),
            Some(Dsr(None, None, Some(0), Some(0))),
            "expanded content has no trustworthy offsets"
        );
        assert_eq!(doc.dsr(end), Some(Dsr(Some(12), Some(12), None, None)));
    }
}
