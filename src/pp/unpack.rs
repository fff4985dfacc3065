//! Pass 10: link neighbours and DOM-fragment unpacking.
//!
//! Runs before the per-extension post-processors so extensions see their
//! own unpacked content.

use crate::{
    common::Result,
    dom::{Document, NodeId, NodeKind},
    env::Env,
    tt::exttags::DOM_FRAGMENT_TYPE,
};

/// Runs the pass.
pub fn run(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    unpack_fragments(doc, env)?;
    glue_link_neighbours(doc, env)
}

/// Splices stored DOM fragments over their carrier metas, transferring the
/// carrier's about id onto the spliced roots.
fn unpack_fragments(doc: &mut Document, env: &mut Env) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.parent(node).is_none() || !doc.has_type_of(node, DOM_FRAGMENT_TYPE) {
            continue;
        }
        let Some(id) = doc.attr(node, "data-mw-fragment").map(str::to_string) else {
            continue;
        };
        let Some(frag) = env.take_fragment(&id) else {
            log::warn!(target: "pp", "missing fragment {id}");
            doc.detach(node);
            continue;
        };
        let about = doc.attr(node, "about").map(str::to_string);
        let unwrap = doc.attr(node, "data-unwrap").is_some();

        let parent = doc.parent(node).unwrap();
        let mut imported = doc.import_fragment(&frag, parent, Some(node));
        if unwrap && imported.len() == 1 && doc.is_element(imported[0]) {
            // Splice the wrapper's children in its place.
            let wrapper = imported[0];
            let children = doc.children(wrapper).to_vec();
            for &child in &children {
                doc.detach(child);
                doc.insert_before(wrapper, child);
            }
            doc.detach(wrapper);
            imported = children;
        }
        if let Some(about) = about {
            for &root in &imported {
                if doc.is_element(root) {
                    doc.set_attr(root, "about", about.clone());
                }
            }
        }
        doc.detach(node);
    }
    Ok(())
}

/// Pulls link trails (and prefixes, for languages that use them) into their
/// adjacent wiki links.
fn glue_link_neighbours(doc: &mut Document, env: &mut Env) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.name(node) != "a" || doc.parent(node).is_none() {
            continue;
        }
        let is_wikilink = doc
            .attr(node, "rel")
            .is_some_and(|r| r.split_ascii_whitespace().any(|e| e == "mw:WikiLink"));
        if !is_wikilink {
            continue;
        }

        // Trail: leading word characters of the following text node move
        // inside the link.
        if let Some(next) = doc.next_sibling(node) {
            if let NodeKind::Text(text) = &doc.node(next).kind {
                if let Some(m) = env.site.link_trail.find(text) {
                    let trail = m.as_str().to_string();
                    let rest = text[m.end()..].to_string();
                    append_text(doc, node, &trail);
                    if rest.is_empty() {
                        doc.detach(next);
                    } else if let NodeKind::Text(t) = &mut doc.node_mut(next).kind {
                        *t = rest;
                    }
                }
            }
        }

        // Prefix: trailing word characters of the preceding text node.
        if let Some(prefix_re) = &env.site.link_prefix {
            if let Some(prev) = doc.prev_sibling(node) {
                if let NodeKind::Text(text) = &doc.node(prev).kind {
                    if let Some(m) = prefix_re.find(text) {
                        let prefix = m.as_str().to_string();
                        let rest = text[..m.start()].to_string();
                        prepend_text(doc, node, &prefix);
                        if rest.is_empty() {
                            doc.detach(prev);
                        } else if let NodeKind::Text(t) = &mut doc.node_mut(prev).kind {
                            *t = rest;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn append_text(doc: &mut Document, link: NodeId, text: &str) {
    if let Some(last) = doc.last_child(link) {
        if let NodeKind::Text(t) = &mut doc.node_mut(last).kind {
            t.push_str(text);
            return;
        }
    }
    let node = doc.create_text(text);
    doc.append(link, node);
}

fn prepend_text(doc: &mut Document, link: NodeId, text: &str) {
    if let Some(first) = doc.first_child(link) {
        if let NodeKind::Text(t) = &mut doc.node_mut(first).kind {
            *t = format!("{text}{t}");
            return;
        }
    }
    let node = doc.create_text(text);
    doc.append(link, node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    #[test]
    fn trail_moves_into_link() {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        doc.set_attr(a, "rel", "mw:WikiLink");
        doc.append(doc.body, a);
        let label = doc.create_text("Foo");
        doc.append(a, label);
        let tail = doc.create_text("bars and more");
        doc.append(doc.body, tail);

        let mut env = Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        );
        run(&mut doc, &mut env, true).unwrap();

        assert_eq!(doc.text_content(a), "Foobars");
        assert_eq!(doc.text(doc.next_sibling(a).unwrap()), Some(" and more"));
    }
}
