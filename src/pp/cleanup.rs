//! Passes 19–22: marker stripping, external link classes, final cleanup
//! with data serialization, and red-link annotation.

use crate::{
    common::Result,
    dom::{DATA_ID_ATTR, Document, PageBundle},
    env::Env,
};

/// Pass 19: strip marker metas.
///
/// Encapsulation removes the markers of every range it processes; this is
/// the safety net for ranges that failed, so no marker meta ever reaches
/// the output.
pub fn strip_marker_metas(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.parent(node).is_none() {
            continue;
        }
        if super::fixups::is_marker_meta(doc, node) {
            log::debug!(target: "pp", "stripping stray marker meta");
            doc.detach(node);
        }
    }
    Ok(())
}

/// Pass 20: external link classes.
pub fn add_ext_link_classes(doc: &mut Document, _env: &mut Env, _at_top: bool) -> Result {
    for node in doc.descendants(doc.body) {
        if doc.name(node) != "a" {
            continue;
        }
        let is_ext = doc
            .attr(node, "rel")
            .is_some_and(|r| r.split_ascii_whitespace().any(|e| e == "mw:ExtLink"));
        if !is_ext {
            continue;
        }
        let class = if doc.children(node).is_empty() {
            "external autonumber"
        } else if doc.attr(node, "href") == Some(doc.text_content(node).trim()) {
            "external free"
        } else {
            "external text"
        };
        doc.set_attr(node, "class", class);
    }
    Ok(())
}

/// Pass 21: empty-element cleanup and data serialization.
///
/// Unadorned empty paragraphs are dropped. Every element still holding
/// side-table records gets its output id, the records move into the
/// document's page bundle, and the placeholder attribute disappears — after
/// this pass the side-table holds no dangling ids.
pub fn final_cleanup(doc: &mut Document, _env: &mut Env, at_top: bool) -> Result {
    // Empty-element cleanup.
    for node in doc.descendants(doc.body) {
        if doc.parent(node).is_none() {
            continue;
        }
        if doc.name(node) == "p"
            && doc.children(node).is_empty()
            && doc.node(node).attrs.is_empty()
        {
            doc.detach(node);
        }
    }

    if !at_top {
        // Nested documents keep their placeholder ids; the host document
        // re-keys them when the fragment is imported.
        return Ok(());
    }

    // Data serialization.
    let mut bundle = PageBundle::default();
    let reachable = doc.descendants(doc.body);
    for &node in &reachable {
        let Some(data_id) = doc.data_id(node) else { continue };
        doc.remove_attr(node, DATA_ID_ATTR);
        if !doc.is_element(node) {
            doc.data.remove(data_id);
            continue;
        }

        let dp = doc.data.parsoid.remove(&data_id);
        let mw = doc.data.mw.remove(&data_id);
        let dp = dp.filter(|dp| {
            dp.dsr.is_some()
                || dp.tsr.is_some()
                || dp.src.is_some()
                || dp.stx.is_some()
                || dp.fostered
                || dp.auto_inserted_end
                || dp.first_wikitext_node.is_some()
                || dp.pi.is_some()
        });
        let mw = mw.filter(|mw| !mw.is_empty());
        if dp.is_none() && mw.is_none() {
            continue;
        }

        let key = match doc.attr(node, "id") {
            Some(id) => id.to_string(),
            None => {
                let id = format!("mw{data_id}");
                doc.set_attr(node, "id", id.clone());
                id
            }
        };
        if let Some(dp) = dp {
            bundle.parsoid.insert(key.clone(), dp);
        }
        if let Some(mw) = mw {
            bundle.mw.insert(key, mw);
        }
    }

    // Records belonging to detached nodes would dangle; drop them.
    doc.data.parsoid.clear();
    doc.data.mw.clear();
    doc.bundle = bundle;
    Ok(())
}

/// Pass 22: red-link annotation, batched through the data-access
/// collaborator. Off by default.
pub fn annotate_red_links(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    if !env.options.red_links {
        return Ok(());
    }
    let mut links = Vec::new();
    for node in doc.descendants(doc.body) {
        if doc.name(node) != "a" {
            continue;
        }
        let is_wikilink = doc
            .attr(node, "rel")
            .is_some_and(|r| r.split_ascii_whitespace().any(|e| e == "mw:WikiLink"));
        if !is_wikilink {
            continue;
        }
        if let Some(title) = doc.attr(node, "title") {
            links.push((node, title.to_string()));
        }
    }
    if links.is_empty() {
        return Ok(());
    }

    let titles: Vec<String> = links.iter().map(|(_, t)| t.clone()).collect();
    let existing = env.data_access.pages_exist(&titles);
    for (node, title) in links {
        if existing.get(&title).copied() == Some(false) {
            let class = match doc.attr(node, "class") {
                Some(existing) if !existing.is_empty() => format!("{existing} new"),
                _ => "new".to_string(),
            };
            doc.set_attr(node, "class", class);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dom::Dsr,
        env::{InMemoryDataAccess, PageConfig},
    };

    fn env() -> Env {
        Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        )
    }

    #[test]
    fn serialization_moves_records_to_bundle() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        doc.dp_mut(p).dsr = Some(Dsr::span(0, 4));
        let bare = doc.create_element("span");
        doc.append(doc.body, bare);
        doc.ensure_data_id(bare);

        final_cleanup(&mut doc, &mut env(), true).unwrap();

        assert_eq!(doc.attr(p, DATA_ID_ATTR), None);
        let id = doc.attr(p, "id").unwrap();
        assert!(doc.bundle.parsoid.contains_key(id));
        assert!(
            !doc.bundle.parsoid.keys().any(|k| k.is_empty()),
            "no empty keys"
        );
        assert!(doc.data.parsoid.is_empty(), "no dangling side-table records");
        assert_eq!(doc.attr(bare, "id"), None, "recordless nodes get no id");
    }

    #[test]
    fn ext_link_classes() {
        let mut doc = Document::new();
        let free = doc.create_element("a");
        doc.set_attr(free, "rel", "mw:ExtLink");
        doc.set_attr(free, "href", "https://x.example");
        doc.append(doc.body, free);
        let label = doc.create_text("https://x.example");
        doc.append(free, label);

        let auto = doc.create_element("a");
        doc.set_attr(auto, "rel", "mw:ExtLink");
        doc.set_attr(auto, "href", "https://y.example");
        doc.append(doc.body, auto);

        add_ext_link_classes(&mut doc, &mut env(), true).unwrap();
        assert_eq!(doc.attr(free, "class"), Some("external free"));
        assert_eq!(doc.attr(auto, "class"), Some("external autonumber"));
    }
}
