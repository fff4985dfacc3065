//! Stage 2: extension tag handling.
//!
//! A registered native implementation builds a DOM subtree which is
//! tunnelled through the token stream as a DOM-fragment meta and spliced in
//! by the unpack pass. A native implementation may instead defer to the
//! wikitext parser, in which case the body is expanded inline. Tags without
//! any native implementation are rendered by the wiki's own parser through
//! the data-access collaborator, best-effort.

use super::{Interest, TokenTransform, TtCtx, TtOutput, strip_tsr};
use crate::{
    common::{Result, collapse_ws, decode_entities},
    config::{ExtensionCall, ExtensionRegistry, FragmentOptions, NativeExtension},
    dom::Document,
    env::Env,
    pipeline::PipelineOpts,
    tokens::{Attr, DataAttribs, T_EXTENSION, Token},
    tokenizer::parse_attr_text,
};

/// The `typeof` of a DOM-fragment carrier meta.
pub const DOM_FRAGMENT_TYPE: &str = "mw:DOMFragment";

/// The stage 2 extension transformer.
pub struct ExtensionHandler;

impl ExtensionHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for ExtensionHandler {
    fn shortcut(&self) -> &'static str {
        "ext"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_EXTENSION])
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let name = token.attr("name").unwrap_or_default().to_string();
        let call = ExtensionCall {
            name: name.clone(),
            options: normalize_options(token.attr("options").unwrap_or_default()),
            body: token.attr("body").map(str::to_string),
            src: token
                .da()
                .and_then(|da| da.tsr)
                .and_then(|tsr| cx.source.get(tsr.0..tsr.1))
                .map(str::to_string),
        };

        if let Some(ext) = cx.env.site.extensions.get(&name) {
            let to_dom = ext.to_dom;
            let modify = ext.modify_arg_dict;
            let fragment_options = ext.fragment_options;
            match to_dom(cx.env, &call)? {
                Some(mut frag) => {
                    decorate_fragment(&mut frag, &call, modify);
                    return Ok(TtOutput::Replace(vec![fragment_token(
                        cx.env,
                        frag,
                        fragment_options,
                    )]));
                }
                None => {
                    // Native implementation deferred to the wikitext parser:
                    // the body expands inline in an extension sub-pipeline.
                    let opts = PipelineOpts {
                        ext_tag: Some(name),
                        expand_templates: true,
                        is_include: cx.opts.is_include,
                        in_template: cx.opts.in_template,
                        ..PipelineOpts::default()
                    };
                    let body = call.body.unwrap_or_default();
                    let mut pipe = cx.env.cache.checkout(&opts);
                    let expanded = pipe.tokens_for(cx.env, cx.frame, &body);
                    cx.env.cache.give_back(pipe);
                    let mut expanded = expanded?;
                    strip_tsr(&mut expanded);
                    return Ok(TtOutput::Replace(expanded));
                }
            }
        }

        // Unrecognized extension tag: best-effort rendering through the
        // wiki's own parser.
        let body = call.body.clone().unwrap_or_default();
        let parsed = cx.env.data_access.parse_wikitext(&cx.env.page, &body)?;
        cx.env.props.modules.extend(parsed.modules);
        cx.env.props.module_styles.extend(parsed.module_styles);

        let mut frag = Document::new();
        let wrapper = frag.create_element("div");
        frag.append(frag.body, wrapper);
        let raw = frag.create_raw(parsed.html);
        frag.append(wrapper, raw);
        decorate_fragment(&mut frag, &call, None);
        Ok(TtOutput::Replace(vec![fragment_token(
            cx.env,
            frag,
            FragmentOptions::default(),
        )]))
    }
}

/// Stamps the fragment's root element with the extension's `typeof` and its
/// `data-mw` invocation record.
fn decorate_fragment(
    frag: &mut Document,
    call: &ExtensionCall,
    modify_arg_dict: Option<fn(&mut serde_json::Value)>,
) {
    let Some(&root) = frag.children(frag.body).first() else {
        return;
    };
    if !frag.is_element(root) {
        return;
    }
    frag.prepend_type_of(root, &format!("mw:Extension/{}", call.name));

    let mut attrs = serde_json::Map::new();
    for (k, v) in &call.options {
        attrs.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    let mut attrs = serde_json::Value::Object(attrs);
    if let Some(modify) = modify_arg_dict {
        modify(&mut attrs);
    }

    let dmw = frag.dmw_mut(root);
    dmw.name = Some(call.name.clone());
    dmw.attrs = Some(attrs);
    if let Some(body) = &call.body {
        dmw.body = Some(serde_json::json!({ "extsrc": body }));
    }
}

/// Stores a fragment on the environment and returns its carrier meta.
fn fragment_token(env: &mut Env, frag: Document, options: FragmentOptions) -> Token {
    let id = env.store_fragment(frag);
    let mut attrs = vec![
        Attr::new("typeof", DOM_FRAGMENT_TYPE),
        Attr::new("data-mw-fragment", id),
    ];
    if options.unwrap {
        attrs.push(Attr::new("data-unwrap", "1"));
    }
    Token::SelfClosing { name: "meta".into(), attrs, da: DataAttribs::default() }
}

/// Normalizes extension tag options: whitespace collapsed, entities decoded,
/// empty options dropped.
fn normalize_options(raw: &str) -> Vec<(String, String)> {
    parse_attr_text(raw)
        .into_iter()
        .filter_map(|attr| {
            let value = collapse_ws(&decode_entities(&attr.value));
            if attr.name.is_empty() || value.is_empty() {
                None
            } else {
                Some((attr.name, value))
            }
        })
        .collect()
}

/// The default native registry: the tags every wiki carries.
pub fn default_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::default();
    registry.register(
        "nowiki",
        NativeExtension {
            to_dom: nowiki_to_dom,
            modify_arg_dict: None,
            fragment_options: FragmentOptions::default(),
            dom_post_processor: None,
            config: serde_json::Value::Null,
        },
    );
    registry.register(
        "pre",
        NativeExtension {
            to_dom: pre_to_dom,
            modify_arg_dict: None,
            fragment_options: FragmentOptions::default(),
            dom_post_processor: None,
            config: serde_json::Value::Null,
        },
    );
    registry
}

/// `<nowiki>`: the body renders literally, with entities decoded.
fn nowiki_to_dom(_env: &mut Env, call: &ExtensionCall) -> Result<Option<Document>> {
    let mut frag = Document::new();
    let span = frag.create_element("span");
    frag.set_attr(span, "typeof", "mw:Nowiki");
    frag.append(frag.body, span);
    if let Some(body) = &call.body {
        let text = frag.create_text(decode_entities(body).into_owned());
        frag.append(span, text);
    }
    Ok(Some(frag))
}

/// `<pre>`: a literal preformatted block. A leading newline is an artifact
/// of the tag syntax, not content.
fn pre_to_dom(_env: &mut Env, call: &ExtensionCall) -> Result<Option<Document>> {
    let mut frag = Document::new();
    let pre = frag.create_element("pre");
    frag.append(frag.body, pre);
    if let Some(body) = &call.body {
        let body = body.strip_prefix('\n').unwrap_or(body);
        let text = frag.create_text(body);
        frag.append(pre, text);
    }
    Ok(Some(frag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_normalization() {
        let opts = normalize_options(r#"group="a  b" follow='' name=x&amp;y"#);
        assert_eq!(
            opts,
            vec![
                ("group".to_string(), "a b".to_string()),
                ("name".to_string(), "x&y".to_string()),
            ],
            "whitespace collapses, empties drop, entities decode"
        );
    }
}
