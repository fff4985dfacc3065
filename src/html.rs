//! HTML serialization and `<head>` finalization.

use crate::{
    dom::{Document, NodeId, NodeKind},
    env::Env,
};
use core::fmt::Write as _;

/// Serializes the body subtree only. Used by dump hooks and tests.
pub fn serialize_body(doc: &Document) -> String {
    let mut out = String::new();
    for &child in doc.children(doc.body) {
        serialize_node(doc, child, &mut out);
    }
    out
}

/// Serializes the full document, building the head from page metadata.
pub fn serialize(doc: &Document, env: &Env) -> String {
    let page = &env.page;
    let dir = page.dir.as_str();
    let mut out = String::with_capacity(4096);

    out.push_str("<!DOCTYPE html>\n");
    out.push_str(
        r#"<html prefix="dc: http://purl.org/dc/terms/ mw: http://mediawiki.org/rdf/">"#,
    );
    let _ = write!(
        out,
        r#"<head prefix="mwr: {}/Special:Redirect/">"#,
        attr_escape(&env.site.base_uri)
    );
    out.push_str(r#"<meta charset="utf-8"/>"#);
    let _ = write!(
        out,
        r#"<meta property="mw:htmlVersion" content="{}"/>"#,
        attr_escape(&env.options.content_version)
    );
    if let Some(rev) = page.revision_id {
        let _ = write!(
            out,
            r#"<meta about="mwr:revision/{rev}" property="dc:modified"/>"#
        );
    }
    if let Some(target) = &env.props.redirect {
        let _ = write!(
            out,
            r#"<link rel="mw:PageProp/redirect" href="{}"/>"#,
            attr_escape(&env.site.href_for(target))
        );
    }
    let _ = write!(out, "<title>{}</title>", text_escape(&page.title));
    let _ = write!(out, r#"<base href="{}/"/>"#, attr_escape(&env.site.base_uri));
    let mut styles = env.site.module_styles.clone();
    styles.extend(env.props.module_styles.iter().cloned());
    if !styles.is_empty() {
        let _ = write!(
            out,
            r#"<link rel="stylesheet" href="/w/load.php?modules={}"/>"#,
            attr_escape(&styles.join("|"))
        );
    }
    out.push_str("</head>");

    let _ = write!(
        out,
        r#"<body lang="{}" dir="{dir}" class="mw-content-{dir} sitedir-{dir} {dir} mediawiki mw-body-content mw-parser-output">"#,
        attr_escape(&page.page_language)
    );
    for &child in doc.children(doc.body) {
        serialize_node(doc, child, &mut out);
    }
    out.push_str("</body></html>");
    out
}

fn serialize_node(doc: &Document, node: NodeId, out: &mut String) {
    match &doc.node(node).kind {
        NodeKind::Text(text) => out.push_str(&text_escape(text)),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Raw(html) => out.push_str(html),
        NodeKind::Element => {
            let name = doc.name(node);
            out.push('<');
            out.push_str(name);
            for (k, v) in &doc.node(node).attrs {
                let _ = write!(out, r#" {k}="{}""#, attr_escape(v));
            }
            if crate::config::VOID_TAGS.contains(name) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for &child in doc.children(node) {
                serialize_node(doc, child, out);
            }
            let _ = write!(out, "</{name}>");
        }
    }
}

fn text_escape(text: &str) -> String {
    // Most text runs contain nothing to escape.
    if memchr::memchr3(b'<', b'>', b'&', text.as_bytes()).is_none() {
        return text.to_string();
    }
    html_escape::encode_text(text).into_owned()
}

fn attr_escape(text: &str) -> String {
    html_escape::encode_double_quoted_attribute(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{InMemoryDataAccess, PageConfig};

    #[test]
    fn body_carries_required_classes_and_prefixes() {
        let env = Env::new(
            crate::config::SiteConfig::default(),
            PageConfig::new("Test", ""),
            Box::new(InMemoryDataAccess::new()),
        );
        let doc = Document::new();
        let html = serialize(&doc, &env);
        for class in ["mediawiki", "mw-parser-output", "mw-body-content"] {
            assert!(html.contains(class), "missing body class {class}");
        }
        assert!(html.contains("dc: http://purl.org/dc/terms/"));
        assert!(html.contains("mw: http://mediawiki.org/rdf/"));
        assert!(html.contains(r#"lang="en" dir="ltr""#));
    }

    #[test]
    fn escaping() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.set_attr(p, "title", r#"a"b<c"#);
        doc.append(doc.body, p);
        let t = doc.create_text("x<y&z");
        doc.append(p, t);
        let html = serialize_body(&doc);
        assert!(html.contains("x&lt;y&amp;z"), "{html}");
        assert!(html.contains(r#"title="a&quot;b&lt;c""#), "{html}");
    }
}
