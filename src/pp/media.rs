//! Pass 13: media info addition.
//!
//! Collects every media placeholder, batch-fetches metadata through the
//! data-access collaborator, and fills in dimensions and file URLs.

use crate::{common::Result, dom::Document, env::Env};

/// Runs the pass.
pub fn add_info(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let mut wanted = Vec::new();
    for node in doc.descendants(doc.body) {
        if doc.name(node) != "img" {
            continue;
        }
        if let Some(resource) = doc.attr(node, "resource") {
            let title = resource
                .trim_start_matches("./")
                .replace('_', " ");
            wanted.push((node, crate::common::decode_entities(&title).into_owned()));
        }
    }
    if wanted.is_empty() {
        return Ok(());
    }

    let titles: Vec<String> = wanted.iter().map(|(_, t)| t.clone()).collect();
    let infos = env.data_access.media_info(&titles);
    for (node, title) in wanted {
        // The caption travels on a scratch attribute until this pass moves
        // it into data-mw.
        let caption = doc
            .parent(node)
            .and_then(|p| doc.remove_attr(p, "data-mw-caption"));
        if let Some(caption) = caption {
            let parent = doc.parent(node).unwrap();
            doc.dmw_mut(parent).caption = Some(caption);
        }
        let Some(info) = infos.get(&title) else {
            log::debug!(target: "pp", "no media info for {title}");
            continue;
        };
        doc.set_attr(node, "src", info.url.clone());
        doc.set_attr(node, "width", info.width.to_string());
        doc.set_attr(node, "height", info.height.to_string());
    }
    Ok(())
}
