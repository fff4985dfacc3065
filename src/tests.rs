//! End-to-end tests: wikitext in, transformed DOM and page bundle out.

use crate::{
    config::SiteConfig,
    dom::{DataMw, DataParsoid, Document, NodeId},
    env::{Env, InMemoryDataAccess, PageConfig},
    html, pipeline,
};

/// Runs the full pipeline with a data access that knows `Template:Echo`.
fn transform(wikitext: &str) -> (Document, Env) {
    let _ = env_logger::try_init();
    let mut access = InMemoryDataAccess::new();
    access.add_template("Template:Echo", "{{{1}}}");
    let mut env = Env::new(
        SiteConfig::default(),
        PageConfig::new("Test Page", wikitext),
        Box::new(access),
    );
    let doc = pipeline::parse_document(&mut env).expect("pipeline should succeed");
    (doc, env)
}

fn find_all(doc: &Document, name: &str) -> Vec<NodeId> {
    doc.descendants(doc.body)
        .into_iter()
        .filter(|&n| doc.name(n) == name)
        .collect()
}

fn wrappers(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.body)
        .into_iter()
        .filter(|&n| doc.has_type_of(n, "mw:Transclusion") || doc.has_type_of(n, "mw:Param"))
        .collect()
}

fn bundle_mw<'d>(doc: &'d Document, node: NodeId) -> Option<&'d DataMw> {
    doc.bundle.mw.get(doc.attr(node, "id")?)
}

fn bundle_dp<'d>(doc: &'d Document, node: NodeId) -> Option<&'d DataParsoid> {
    doc.bundle.parsoid.get(doc.attr(node, "id")?)
}

fn assert_no_marker_metas(doc: &Document) {
    for node in doc.descendants(doc.body) {
        if doc.name(node) == "meta" {
            let type_of = doc.attr(node, "typeof").unwrap_or_default();
            assert!(
                !crate::config::TPL_META_TYPE.is_match(type_of),
                "marker meta survived: typeof={type_of}"
            );
        }
    }
}

#[test]
fn ascii_heading() {
    let (doc, _env) = transform("=Test 1 2 3=");
    let hs = find_all(&doc, "h1");
    assert_eq!(hs.len(), 1);
    assert_eq!(doc.attr(hs[0], "id"), Some("Test_1_2_3"));
    assert!(
        doc.children(hs[0]).iter().all(|&c| !doc.is_element(c)),
        "no fallback span for an ASCII heading"
    );
}

#[test]
fn non_ascii_heading_gets_fallback_id() {
    let (doc, _env) = transform("=Références=");
    let hs = find_all(&doc, "h1");
    assert_eq!(hs.len(), 1);
    assert_eq!(doc.attr(hs[0], "id"), Some("Références"));
    let span = doc.children(hs[0])[0];
    assert!(doc.has_type_of(span, "mw:FallbackId"));
    assert_eq!(doc.attr(span, "id"), Some("R.C3.A9f.C3.A9rences"));
}

#[test]
fn duplicate_headings_get_suffixed_ids() {
    let (doc, _env) = transform("=a=\n=a=");
    let hs = find_all(&doc, "h1");
    assert_eq!(hs.len(), 2);
    let ids: Vec<_> = hs.iter().map(|&h| doc.attr(h, "id").unwrap()).collect();
    assert_eq!(ids, ["a", "a_2"]);
}

#[test]
fn simple_transclusion() {
    let (doc, _env) = transform("{{echo|foo}}");
    let ws = wrappers(&doc);
    assert_eq!(ws.len(), 1, "exactly one wrapper element");
    let w = ws[0];
    assert!(doc.has_type_of(w, "mw:Transclusion"));
    assert_eq!(doc.attr(w, "about"), Some("#mwt1"));
    assert_eq!(doc.text_content(w), "foo");
    assert_no_marker_metas(&doc);

    let parts = bundle_mw(&doc, w).unwrap().parts.clone().unwrap();
    assert_eq!(
        parts,
        vec![serde_json::json!({
            "template": {
                "target": { "wt": "echo" },
                "params": { "1": { "wt": "foo" } },
            }
        })]
    );
    let dsr = bundle_dp(&doc, w).unwrap().dsr.unwrap();
    assert_eq!((dsr.0, dsr.1), (Some(0), Some(12)), "wrapper covers the call");
}

#[test]
fn transclusion_inside_table_is_fostered_and_wrapped() {
    let src = "{|\n{{echo|foo}}\n|}";
    let (doc, _env) = transform(src);
    assert_no_marker_metas(&doc);

    let ws = wrappers(&doc);
    assert_eq!(ws.len(), 1, "exactly one wrapper");
    let w = ws[0];
    assert_eq!(doc.attr(w, "about"), Some("#mwt1"));

    // The table shares the about id with the fostered content.
    let tables = find_all(&doc, "table");
    assert_eq!(tables.len(), 1);
    assert_eq!(doc.attr(tables[0], "about"), Some("#mwt1"));

    // The wrapper's range covers the whole construct.
    let dsr = bundle_dp(&doc, w).unwrap().dsr.unwrap();
    assert_eq!((dsr.0, dsr.1), (Some(0), Some(src.len())));

    // And the parts carry the surrounding table markup as literal runs.
    let parts = bundle_mw(&doc, w).unwrap().parts.clone().unwrap();
    assert_eq!(parts.first(), Some(&serde_json::json!("{|\n")));
    assert_eq!(parts.last(), Some(&serde_json::json!("\n|}")));
}

#[test]
fn two_transclusions_one_fostering() {
    let (doc, _env) = transform("{{echo|<table>}}{{echo|<div>}}");
    assert_no_marker_metas(&doc);

    let ws = wrappers(&doc);
    assert!(
        ws.len() == 2 || ws.len() == 1,
        "two distinct wrappers, or one merged on overlap: {}",
        ws.len()
    );
    if ws.len() == 2 {
        let abouts: Vec<_> = ws.iter().filter_map(|&w| doc.attr(w, "about")).collect();
        assert_ne!(abouts[0], abouts[1]);
    }
}

#[test]
fn nested_transclusion_is_a_single_compound_wrapper() {
    let mut access = InMemoryDataAccess::new();
    access.add_template("Template:Echo", "{{{1}}}");
    let mut env = Env::new(
        SiteConfig::default(),
        PageConfig::new("T", "{{echo|{{echo|x}}}}"),
        Box::new(access),
    );
    let doc = pipeline::parse_document(&mut env).unwrap();
    assert_no_marker_metas(&doc);

    let ws = wrappers(&doc);
    assert_eq!(ws.len(), 1, "no separate wrapper for the inner call");
    let parts = bundle_mw(&doc, ws[0]).unwrap().parts.clone().unwrap();
    assert_eq!(parts.len(), 2, "outer and inner argument descriptions: {parts:?}");
    assert_eq!(doc.text_content(ws[0]), "x");
}

#[test]
fn missing_template_renders_a_link() {
    let (doc, _env) = transform("{{nosuch}}");
    let ws = wrappers(&doc);
    assert_eq!(ws.len(), 1);
    let links = find_all(&doc, "a");
    assert_eq!(links.len(), 1);
    assert_eq!(doc.attr(links[0], "title"), Some("Template:Nosuch"));
}

#[test]
fn top_level_parameter_wraps_as_param() {
    let (doc, _env) = transform("{{{1|fallback}}}");
    let ws = wrappers(&doc);
    assert_eq!(ws.len(), 1);
    assert!(doc.has_type_of(ws[0], "mw:Param"));
    assert_eq!(doc.text_content(ws[0]), "fallback");
    let parts = bundle_mw(&doc, ws[0]).unwrap().parts.clone().unwrap();
    assert!(parts[0].get("templatearg").is_some(), "{parts:?}");
}

#[test]
fn wiki_and_external_links() {
    let (doc, _env) = transform("[[Foo|bar]]s and [https://example.org label]");
    let links = find_all(&doc, "a");
    assert_eq!(links.len(), 2);

    let wiki = links[0];
    assert_eq!(doc.attr(wiki, "rel"), Some("mw:WikiLink"));
    assert_eq!(doc.attr(wiki, "href"), Some("./Foo"));
    assert_eq!(doc.text_content(wiki), "bars", "trail glued onto the link");

    let ext = links[1];
    assert!(doc.attr(ext, "rel").unwrap().contains("mw:ExtLink"));
    assert_eq!(doc.attr(ext, "class"), Some("external text"));
    assert_eq!(doc.text_content(ext), "label");
}

#[test]
fn categories_collect_instead_of_rendering() {
    let (doc, env) = transform("x [[Category:Things]] y");
    assert_eq!(env.props.categories, ["Category:Things"]);
    assert!(find_all(&doc, "a").is_empty());
}

#[test]
fn bold_italic_and_lists() {
    let (doc, _env) = transform("* plain\n* '''bold''' item\n");
    let uls = find_all(&doc, "ul");
    assert_eq!(uls.len(), 1);
    let lis = find_all(&doc, "li");
    assert_eq!(lis.len(), 2);
    let bolds = find_all(&doc, "b");
    assert_eq!(bolds.len(), 1);
    assert_eq!(doc.text_content(bolds[0]), "bold");
}

#[test]
fn nowiki_is_literal() {
    let (doc, _env) = transform("<nowiki>''not bold''</nowiki>");
    assert!(find_all(&doc, "i").is_empty());
    let spans = find_all(&doc, "span");
    let nowiki = spans
        .iter()
        .copied()
        .find(|&n| doc.has_type_of(n, "mw:Nowiki"))
        .expect("nowiki span");
    assert_eq!(doc.text_content(nowiki), "''not bold''");
    assert!(doc.has_type_of(nowiki, "mw:Extension/nowiki"));
}

#[test]
fn sections_wrap_heading_runs() {
    let (doc, _env) = transform("lead\n\n==One==\ntext\n==Two==\n");
    let sections = find_all(&doc, "section");
    assert_eq!(sections.len(), 3, "lead plus two heading sections");
    assert_eq!(doc.attr(sections[0], "data-mw-section-id"), Some("0"));
}

#[test]
fn behavior_switch_sets_page_props() {
    let (doc, env) = transform("__NOTOC__ hi");
    assert!(env.props.no_toc);
    let metas = find_all(&doc, "meta");
    assert!(
        metas
            .iter()
            .any(|&m| doc.attr(m, "property") == Some("mw:PageProp/notoc")),
        "page-prop meta emitted"
    );
}

#[test]
fn pipeline_output_is_deterministic() {
    let src = "=T=\n{{echo|foo}} and ''more''\n";
    let (doc_a, env_a) = transform(src);
    let (doc_b, env_b) = transform(src);
    assert_eq!(
        html::serialize(&doc_a, &env_a),
        html::serialize(&doc_b, &env_b)
    );
}

#[test]
fn redirect_page_gets_head_link() {
    let (doc, env) = transform("#REDIRECT [[Other Page]]");
    assert_eq!(env.props.redirect.as_deref(), Some("Other Page"));
    let out = html::serialize(&doc, &env);
    assert!(out.contains(r#"rel="mw:PageProp/redirect""#), "{out}");
    // The target also renders as an ordinary link in the body.
    assert!(!find_all(&doc, "a").is_empty());
}

#[test]
fn full_document_shell() {
    let (doc, env) = transform("hello");
    let out = html::serialize(&doc, &env);
    assert!(out.starts_with("<!DOCTYPE html>"));
    assert!(out.contains("<title>Test Page</title>"));
    assert!(out.contains("mw-parser-output"));
    assert!(out.contains("<p"));
    assert!(out.contains("hello"));
}

#[test]
fn dsr_bounds_hold_for_every_element() {
    let src = "=H=\n{|\n|a||b\n|}\n{{echo|x}} ''i'' [[L]]\n";
    let (doc, _env) = transform(src);
    for dp in doc.bundle.parsoid.values() {
        if let Some(dsr) = dp.dsr {
            if let (Some(a), Some(b)) = (dsr.0, dsr.1) {
                assert!(a <= b, "dsr start after end: {dsr:?}");
                assert!(b <= src.len(), "dsr past the source: {dsr:?}");
            }
        }
    }
}
