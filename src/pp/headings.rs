//! Passes 14 and 16: heading anchors and id deduplication.

use crate::{
    common::{Result, anchor_encode, legacy_anchor_encode},
    dom::{Document, NodeId},
    env::Env,
};
use std::collections::HashSet;

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Pass 14: assign each heading an anchor id derived from its text. When
/// the modern id is not pure ASCII, a legacy dot-escaped fallback id is
/// emitted in a child span for old-style fragment links.
pub fn gen_anchors(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if !HEADINGS.contains(&doc.name(node)) || doc.parent(node).is_none() {
            continue;
        }
        if doc.attr(node, "id").is_some() {
            continue;
        }
        let text = heading_text(doc, node);
        let id = anchor_encode(&text);
        if id.is_empty() {
            continue;
        }
        let legacy = legacy_anchor_encode(&text);
        doc.set_attr(node, "id", id.clone());
        if legacy != id {
            let span = doc.create_element("span");
            doc.set_attr(span, "typeof", "mw:FallbackId");
            doc.set_attr(span, "id", legacy);
            match doc.first_child(node) {
                Some(first) => doc.insert_before(first, span),
                None => doc.append(node, span),
            }
        }
    }
    Ok(())
}

/// Pass 16: document-wide id deduplication. The second occurrence of a base
/// id gets `_2`, the third `_3`, and so on.
pub fn dedupe_ids(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    let mut seen: HashSet<String> = HashSet::new();
    for node in doc.descendants(doc.body) {
        if !doc.is_element(node) {
            continue;
        }
        let Some(id) = doc.attr(node, "id").map(str::to_string) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.clone()) {
            continue;
        }
        let mut n = 2;
        let fresh = loop {
            let candidate = format!("{id}_{n}");
            if seen.insert(candidate.clone()) {
                break candidate;
            }
            n += 1;
        };
        doc.set_attr(node, "id", fresh);
    }
    Ok(())
}

/// The anchor-relevant text of a heading, excluding fallback spans.
fn heading_text(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(node) {
        if doc.is_element(*child) && doc.has_type_of(*child, "mw:FallbackId") {
            continue;
        }
        out.push_str(&doc.text_content(*child));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    fn env() -> Env {
        Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        )
    }

    fn heading(doc: &mut Document, text: &str) -> NodeId {
        let h = doc.create_element("h1");
        doc.append(doc.body, h);
        let t = doc.create_text(text);
        doc.append(h, t);
        h
    }

    #[test]
    fn ascii_heading_has_no_fallback() {
        let mut doc = Document::new();
        let h = heading(&mut doc, "Test 1 2 3");
        gen_anchors(&mut doc, &mut env(), true).unwrap();
        assert_eq!(doc.attr(h, "id"), Some("Test_1_2_3"));
        assert!(doc.children(h).iter().all(|&c| !doc.is_element(c)));
    }

    #[test]
    fn non_ascii_heading_gets_fallback_span() {
        let mut doc = Document::new();
        let h = heading(&mut doc, "Références");
        gen_anchors(&mut doc, &mut env(), true).unwrap();
        assert_eq!(doc.attr(h, "id"), Some("Références"));
        let span = doc.children(h)[0];
        assert!(doc.has_type_of(span, "mw:FallbackId"));
        assert_eq!(doc.attr(span, "id"), Some("R.C3.A9f.C3.A9rences"));
    }

    #[test]
    fn duplicate_ids_get_suffixes() {
        let mut doc = Document::new();
        let a = heading(&mut doc, "a");
        let b = heading(&mut doc, "a");
        let c = heading(&mut doc, "a");
        let mut env = env();
        gen_anchors(&mut doc, &mut env, true).unwrap();
        dedupe_ids(&mut doc, &mut env, true).unwrap();
        assert_eq!(doc.attr(a, "id"), Some("a"));
        assert_eq!(doc.attr(b, "id"), Some("a_2"));
        assert_eq!(doc.attr(c, "id"), Some("a_3"));
    }
}
