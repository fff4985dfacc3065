//! Pass 1: mark fostered content.
//!
//! The tree builder leaves a scratch breadcrumb on every node it moved out
//! of a table. This pass promotes the breadcrumb to the durable
//! `data-parsoid` flag and sweeps up inter-element whitespace and comments
//! that were carried along with a fostered run. The encapsulation pass
//! consults the flag to distinguish tree-builder-induced range overlap from
//! overlap present in the wikitext itself.

use crate::{common::Result, dom::Document, env::Env};

/// Runs the pass.
pub fn mark(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    let nodes = doc.descendants(doc.body);

    for &node in &nodes {
        let is_candidate = doc
            .dp(node)
            .is_some_and(|dp| dp.tmp.fostered_candidate);
        if is_candidate {
            let dp = doc.dp_mut(node);
            dp.fostered = true;
            dp.tmp.fostered_candidate = false;
        }
    }

    // Whitespace and comments that sit between fostered content and its
    // table were moved by the same mechanism; mark them too.
    for &node in &nodes {
        if doc.name(node) != "table" {
            continue;
        }
        let mut swept = Vec::new();
        let mut cur = doc.prev_sibling(node);
        while let Some(prev) = cur {
            if doc.is_inter_structure(prev) {
                swept.push(prev);
                cur = doc.prev_sibling(prev);
                continue;
            }
            if doc.dp(prev).is_some_and(|dp| dp.fostered) {
                for &ws in &swept {
                    doc.dp_mut(ws).fostered = true;
                }
            }
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Env, InMemoryDataAccess, PageConfig};

    fn env() -> Env {
        Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        )
    }

    #[test]
    fn promotes_breadcrumbs() {
        let mut doc = Document::new();
        let text = doc.create_text("x");
        let table = doc.create_element("table");
        doc.append(doc.body, text);
        doc.append(doc.body, table);
        doc.dp_mut(text).tmp.fostered_candidate = true;

        mark(&mut doc, &mut env(), true).unwrap();
        let dp = doc.dp(text).unwrap();
        assert!(dp.fostered);
        assert!(!dp.tmp.fostered_candidate);
    }
}
