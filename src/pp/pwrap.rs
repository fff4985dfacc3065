//! Pass 4: paragraph-wrap fix-up.
//!
//! The token-level wrapper produces the paragraphs for ordinary text flow;
//! this pass catches inline content that reached the body without one —
//! mostly fragments spliced in by template and extension expansion.

use crate::{
    common::Result,
    config::BLOCK_TAGS,
    dom::{Document, NodeId},
    env::Env,
};

/// Runs the pass.
pub fn wrap_stray_inline(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    let children = doc.children(doc.body).to_vec();
    let mut run: Vec<NodeId> = Vec::new();
    for child in children {
        if needs_wrap(doc, child) {
            run.push(child);
        } else {
            flush_run(doc, &mut run);
        }
    }
    flush_run(doc, &mut run);
    Ok(())
}

/// True for a body child that belongs inside a paragraph.
fn needs_wrap(doc: &Document, node: NodeId) -> bool {
    if doc.is_element(node) {
        let name = doc.name(node);
        return !BLOCK_TAGS.contains(name) && name != "meta" && name != "link" && name != "style";
    }
    // Text with visible content; whitespace and comments stay bare.
    doc.text(node).is_some_and(|t| !t.trim().is_empty())
}

fn flush_run(doc: &mut Document, run: &mut Vec<NodeId>) {
    if run.is_empty() {
        return;
    }
    let first = run[0];
    let p = doc.create_element("p");
    doc.insert_before(first, p);
    for &node in run.iter() {
        doc.detach(node);
        doc.append(p, node);
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    #[test]
    fn wraps_inline_runs_only() {
        let mut doc = Document::new();
        let text = doc.create_text("loose");
        let b = doc.create_element("b");
        let table = doc.create_element("table");
        let tail = doc.create_text("more");
        doc.append(doc.body, text);
        doc.append(doc.body, b);
        doc.append(doc.body, table);
        doc.append(doc.body, tail);

        let mut env = Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        );
        wrap_stray_inline(&mut doc, &mut env, true).unwrap();

        let kids = doc.children(doc.body).to_vec();
        assert_eq!(kids.len(), 3);
        assert_eq!(doc.name(kids[0]), "p");
        assert_eq!(doc.children(kids[0]).to_vec(), vec![text, b]);
        assert_eq!(doc.name(kids[1]), "table");
        assert_eq!(doc.name(kids[2]), "p");
    }
}
