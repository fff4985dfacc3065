//! Structural fix-up passes: tree-builder repairs, normalization, marker
//! migration, and the cell/list traverser.

use crate::{
    common::Result,
    config::TPL_META_TYPE,
    dom::{Document, NodeId, NodeKind, traverser::{DomTraverser, Traverse}},
    env::Env,
};

/// Pass 2: repairs for artifacts of token-stream recovery.
///
/// Drops empty paragraphs produced by blank-line runs and flattens `<a>`
/// elements that ended up nested through broken markup.
pub fn tree_builder_fixups(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.parent(node).is_none() && node != doc.body {
            continue;
        }
        match doc.name(node) {
            "p" => {
                if doc.children(node).is_empty() && doc.node(node).attrs.is_empty() {
                    doc.detach(node);
                }
            }
            "a" => {
                // A nested <a> is illegal; hoist it after its host.
                if let Some(inner) = doc
                    .children(node)
                    .iter()
                    .copied()
                    .find(|&c| doc.name(c) == "a")
                {
                    doc.detach(inner);
                    doc.insert_after(node, inner);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Pass 3: normalization. Merges adjacent text nodes and removes empty
/// ones so later offset arithmetic sees canonical structure.
pub fn normalize(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if !doc.is_element(node) {
            continue;
        }
        let children = doc.children(node).to_vec();
        let mut prev_text: Option<NodeId> = None;
        for child in children {
            match &doc.node(child).kind {
                NodeKind::Text(t) if t.is_empty() => {
                    doc.detach(child);
                }
                NodeKind::Text(t) => {
                    if let Some(prev) = prev_text {
                        let merged = t.clone();
                        if let NodeKind::Text(pt) = &mut doc.node_mut(prev).kind {
                            pt.push_str(&merged);
                        }
                        doc.detach(child);
                    } else {
                        prev_text = Some(child);
                    }
                }
                _ => {
                    prev_text = None;
                }
            }
        }
    }
    Ok(())
}

/// Pass 5: migrate template marker metas.
///
/// A start marker stranded as the last child of an element (or an end
/// marker as a first child) makes its range spuriously cover the whole
/// element; move such markers out before ranges are computed.
pub fn migrate_template_markers(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    let mut changed = true;
    while changed {
        changed = false;
        for node in doc.descendants(doc.body) {
            if !is_marker_meta(doc, node) {
                continue;
            }
            let Some(parent) = doc.parent(node) else { continue };
            if parent == doc.body {
                continue;
            }
            let is_end = doc
                .attr(node, "typeof")
                .is_some_and(|t| t.ends_with("/End"));
            if !is_end && doc.last_child(parent) == Some(node) {
                doc.detach(node);
                doc.insert_after(parent, node);
                changed = true;
            } else if is_end && doc.first_child(parent) == Some(node) {
                doc.detach(node);
                doc.insert_before(parent, node);
                changed = true;
            }
        }
    }
    Ok(())
}

/// Pass 6: preformatting blocks. The newline terminating the last content
/// line of an indent-pre is structure, not content.
pub fn fix_pres(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.name(node) != "pre" {
            continue;
        }
        if let Some(last) = doc.last_child(node) {
            if let NodeKind::Text(t) = &mut doc.node_mut(last).kind {
                if t.ends_with('\n') {
                    t.pop();
                    if t.is_empty() {
                        doc.detach(last);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Pass 7: migrate trailing newlines. A newline-only text node at the end
/// of a block belongs between blocks, not inside the last one.
pub fn migrate_trailing_newlines(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if !doc.is_element(node) || node == doc.body || doc.parent(node).is_none() {
            continue;
        }
        if matches!(doc.name(node), "pre" | "body") {
            continue;
        }
        let Some(last) = doc.last_child(node) else { continue };
        let is_nl_only = matches!(&doc.node(last).kind, NodeKind::Text(t) if !t.is_empty() && t.chars().all(|c| c == '\n'));
        if is_nl_only {
            doc.detach(last);
            doc.insert_after(node, last);
        }
    }
    Ok(())
}

/// Pass 12: list-item fix-ups, table-cell fix-ups, and style deduplication,
/// as a single traverser.
pub fn cell_and_list_fixups(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let traverser = DomTraverser::new()
        .add(Some("li"), |doc, node, _env| {
            // A li holding only whitespace renders as an empty bullet; drop
            // it unless round-trip data hangs off it.
            let only_ws = doc.children(node).iter().all(|&c| doc.is_inter_structure(c));
            if only_ws && doc.attr(node, "about").is_none() && doc.dsr(node).is_none() {
                let next = doc.next_sibling(node);
                doc.detach(node);
                return Ok(Traverse::ResumeAt(next));
            }
            Ok(Traverse::Continue)
        })
        .add(Some("td"), |doc, node, _env| {
            dedupe_style(doc, node);
            Ok(Traverse::Continue)
        })
        .add(Some("th"), |doc, node, _env| {
            dedupe_style(doc, node);
            Ok(Traverse::Continue)
        })
        .add(Some("tr"), |doc, node, _env| {
            dedupe_style(doc, node);
            Ok(Traverse::Continue)
        });
    let body = doc.body;
    traverser.traverse(doc, body, env)
}

/// Collapses repeated declarations inside a style attribute, keeping the
/// last occurrence of each property.
fn dedupe_style(doc: &mut Document, node: NodeId) {
    let Some(style) = doc.attr(node, "style").map(str::to_string) else {
        return;
    };
    let mut props: Vec<(String, String)> = Vec::new();
    for decl in style.split(';') {
        let Some((k, v)) = decl.split_once(':') else { continue };
        let k = k.trim().to_ascii_lowercase();
        let v = v.trim().to_string();
        if k.is_empty() {
            continue;
        }
        if let Some(existing) = props.iter_mut().find(|(name, _)| *name == k) {
            existing.1 = v;
        } else {
            props.push((k, v));
        }
    }
    let rebuilt = props
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(";");
    if !rebuilt.is_empty() {
        doc.set_attr(node, "style", rebuilt);
    }
}

/// True for a transclusion start/end marker meta.
pub fn is_marker_meta(doc: &Document, node: NodeId) -> bool {
    doc.name(node) == "meta"
        && doc
            .attr(node, "typeof")
            .is_some_and(|t| TPL_META_TYPE.is_match(t))
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

    #[test]
    fn marker_migration_moves_stranded_start() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let text = doc.create_text("x");
        doc.append(p, text);
        let meta = doc.create_element("meta");
        doc.set_attr(meta, "typeof", "mw:Transclusion");
        doc.append(p, meta);

        migrate_template_markers(&mut doc, &mut env(), true).unwrap();
        assert_eq!(doc.parent(meta), Some(doc.body), "start marker moved out");
        assert_eq!(doc.children(doc.body).to_vec(), vec![p, meta]);
    }

    #[test]
    fn style_dedupe_keeps_last() {
        let mut doc = Document::new();
        let td = doc.create_element("td");
        doc.append(doc.body, td);
        doc.set_attr(td, "style", "color: red; width:1px; color: blue");
        dedupe_style(&mut doc, td);
        assert_eq!(doc.attr(td, "style"), Some("color:blue;width:1px"));
    }

    #[test]
    fn trailing_newline_migrates() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let a = doc.create_text("x");
        doc.append(p, a);
        let nl = doc.create_text("\n");
        doc.append(p, nl);

        migrate_trailing_newlines(&mut doc, &mut env(), true).unwrap();
        assert_eq!(doc.children(p).to_vec(), vec![a]);
        assert_eq!(doc.next_sibling(p), Some(nl));
    }
}
