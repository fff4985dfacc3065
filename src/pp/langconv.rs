//! Pass 17: language-variant conversion.
//!
//! Drives the site's replacement machine over the DOM: text runs are
//! transliterated into the requested variant, explicit `-{…}-` rules are
//! applied, link titles and text-bearing attributes are converted, and
//! non-reversible conversions keep their input for round-trip.

use crate::{
    common::{Result, looks_like_url},
    config::VariantMachine,
    dom::{Document, NodeId, NodeKind},
    env::Env,
};

/// Element names whose content is never converted.
const SKIPPED: &[&str] = &["code", "script", "pre", "cite"];

/// Runs the pass.
pub fn convert(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let Some(target) = env.options.variant_target.clone() else {
        return Ok(());
    };
    if env.props.no_content_convert {
        return Ok(());
    }
    let Some(machine) = env.site.variant_machine.as_deref() else {
        log::warn!(target: "langconv", "variant {target} requested but no machine configured");
        return Ok(());
    };
    if !machine.variants().iter().any(|v| *v == target) {
        return Ok(());
    }
    let page_language = env.page.page_language.clone();
    let body = doc.body;
    walk(doc, body, machine, &target, &page_language);
    Ok(())
}

fn walk(
    doc: &mut Document,
    node: NodeId,
    machine: &dyn VariantMachine,
    target: &str,
    page_language: &str,
) {
    if SKIPPED.contains(&doc.name(node)) {
        return;
    }
    if doc.has_type_of(node, "mw:LanguageVariant") {
        apply_explicit_rule(doc, node, target);
        return;
    }

    if matches!(doc.name(node), "p" | "body") {
        let source = machine.source_variant(&doc.text_content(node), page_language);
        doc.set_attr(node, "data-mw-variant-lang", source);
    }

    convert_attrs(doc, node, machine, target);

    for child in doc.children(node).to_vec() {
        match &doc.node(child).kind {
            NodeKind::Text(text) => {
                let text = text.clone();
                if let Some(converted) = machine.transliterate(&text, target) {
                    if machine.reversible(page_language, target) {
                        if let NodeKind::Text(t) = &mut doc.node_mut(child).kind {
                            *t = converted;
                        }
                    } else {
                        // Keep the original around; the conversion cannot
                        // be inverted.
                        let wrapper = doc.wrap_in(child, "span");
                        doc.set_attr(wrapper, "data-mw-variant-orig", text);
                        if let NodeKind::Text(t) = &mut doc.node_mut(child).kind {
                            *t = converted;
                        }
                    }
                }
            }
            NodeKind::Element => walk(doc, child, machine, target, page_language),
            _ => {}
        }
    }
}

/// Applies an explicit `-{…}-` rule span.
fn apply_explicit_rule(doc: &mut Document, node: NodeId, target: &str) {
    let Some(raw) = doc.attr(node, "data-mw-variant") else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return;
    };
    let Some(rules) = value.get("twoway").and_then(|v| v.as_array()) else {
        return;
    };
    let chosen = rules
        .iter()
        .find(|r| r.get("l").and_then(|l| l.as_str()) == Some(target))
        .and_then(|r| r.get("t"))
        .and_then(|t| t.as_str());
    if let Some(text) = chosen {
        let text = text.to_string();
        for child in doc.children(node).to_vec() {
            doc.detach(child);
        }
        let t = doc.create_text(text);
        doc.append(node, t);
    }
}

/// Converts `title` and `alt` attributes (skipping URL-shaped values) and
/// wiki-link hrefs. Interwiki and external links are left alone.
fn convert_attrs(doc: &mut Document, node: NodeId, machine: &dyn VariantMachine, target: &str) {
    for attr in ["title", "alt"] {
        if let Some(value) = doc.attr(node, attr).map(str::to_string) {
            if !looks_like_url(&value) {
                if let Some(converted) = machine.transliterate(&value, target) {
                    doc.set_attr(node, attr, converted);
                }
            }
        }
    }
    if doc.name(node) == "a" {
        let rel = doc.attr(node, "rel").unwrap_or_default();
        let plain_wikilink =
            rel.split_ascii_whitespace().any(|e| e == "mw:WikiLink") && !rel.contains("Interwiki");
        if plain_wikilink {
            if let Some(href) = doc.attr(node, "href").map(str::to_string) {
                if let Some(rest) = href.strip_prefix("./") {
                    if let Some(converted) = machine.transliterate(rest, target) {
                        doc.set_attr(node, "href", format!("./{converted}"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    struct UpperMachine {
        variants: Vec<String>,
    }

    impl VariantMachine for UpperMachine {
        fn variants(&self) -> &[String] {
            &self.variants
        }

        fn transliterate(&self, text: &str, _to: &str) -> Option<String> {
            let upper = text.to_uppercase();
            (upper != text).then_some(upper)
        }
    }

    #[test]
    fn converts_text_and_stamps_source() {
        let mut site = crate::config::SiteConfig::default();
        site.variant_machine = Some(Box::new(UpperMachine {
            variants: vec!["en-x-loud".to_string()],
        }));
        let mut env = Env::new(site, PageConfig::new("T", ""), Box::new(InMemoryDataAccess::new()));
        env.options.variant_target = Some("en-x-loud".to_string());

        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append(doc.body, p);
        let t = doc.create_text("quiet");
        doc.append(p, t);
        let code = doc.create_element("code");
        doc.append(p, code);
        let kept = doc.create_text("asis");
        doc.append(code, kept);

        convert(&mut doc, &mut env, true).unwrap();
        assert_eq!(doc.text(t), Some("QUIET"));
        assert_eq!(doc.text(kept), Some("asis"), "code content is skipped");
        assert!(doc.attr(p, "data-mw-variant-lang").is_some());
    }

    #[test]
    fn explicit_rule_picks_target_variant() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.set_attr(span, "typeof", "mw:LanguageVariant");
        doc.set_attr(
            span,
            "data-mw-variant",
            r#"{"twoway":[{"l":"aa","t":"first"},{"l":"bb","t":"second"}]}"#,
        );
        doc.append(doc.body, span);
        let t = doc.create_text("first");
        doc.append(span, t);

        apply_explicit_rule(&mut doc, span, "bb");
        assert_eq!(doc.text_content(span), "second");
    }
}
