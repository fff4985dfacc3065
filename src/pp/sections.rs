//! Pass 15: section wrapping.
//!
//! Top-level content is grouped into `<section data-mw-section-id="…">`
//! elements: a lead section, then one section per heading, nested by
//! heading level.

use crate::{
    common::Result,
    dom::{Document, NodeId},
    env::Env,
};

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Runs the pass.
pub fn wrap(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    if !env.options.wrap_sections {
        return Ok(());
    }

    let children = doc.children(doc.body).to_vec();
    // (level, section) of each open section, outermost first.
    let mut stack: Vec<(u8, NodeId)> = Vec::new();
    let mut next_id = 0u32;

    let lead = doc.create_element("section");
    doc.set_attr(lead, "data-mw-section-id", next_id.to_string());
    next_id += 1;
    doc.append(doc.body, lead);
    stack.push((0, lead));

    for child in children {
        let name = doc.name(child).to_string();
        if let Some(level) = heading_level(&name) {
            while stack.len() > 1 && stack.last().unwrap().0 >= level {
                stack.pop();
            }
            let section = doc.create_element("section");
            doc.set_attr(section, "data-mw-section-id", next_id.to_string());
            next_id += 1;
            let host = stack.last().map(|&(_, s)| s).filter(|_| stack.len() > 1);
            match host {
                Some(host) => doc.append(host, section),
                None => doc.append(doc.body, section),
            }
            doc.detach(child);
            doc.append(section, child);
            stack.push((level, section));
        } else {
            let (_, host) = *stack.last().unwrap();
            doc.detach(child);
            doc.append(host, child);
        }
    }

    // An untouched empty lead section is dropped.
    if doc.children(lead).is_empty() && next_id > 1 {
        doc.detach(lead);
        // Renumbering would invalidate edit-section offsets; the lead id is
        // simply absent.
    }

    Ok(())
}

fn heading_level(name: &str) -> Option<u8> {
    if HEADINGS.contains(&name) {
        name.as_bytes().get(1).map(|b| b - b'0')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    #[test]
    fn wraps_and_nests_by_level() {
        let mut doc = Document::new();
        let intro = doc.create_text("intro");
        doc.append(doc.body, intro);
        let h2 = doc.create_element("h2");
        doc.append(doc.body, h2);
        let p1 = doc.create_element("p");
        doc.append(doc.body, p1);
        let h3 = doc.create_element("h3");
        doc.append(doc.body, h3);
        let h2b = doc.create_element("h2");
        doc.append(doc.body, h2b);

        let mut env = Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        );
        wrap(&mut doc, &mut env, true).unwrap();

        let kids = doc.children(doc.body).to_vec();
        assert_eq!(kids.len(), 3, "lead, h2 section, second h2 section");
        assert_eq!(doc.attr(kids[0], "data-mw-section-id"), Some("0"));
        let s1 = kids[1];
        assert_eq!(doc.attr(s1, "data-mw-section-id"), Some("1"));
        // The h3 section nests inside the h2 section.
        assert!(doc
            .children(s1)
            .iter()
            .any(|&c| doc.attr(c, "data-mw-section-id") == Some("2")));
        assert_eq!(doc.attr(kids[2], "data-mw-section-id"), Some("3"));
    }
}
