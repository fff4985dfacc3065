//! Stage 2: template and template-parameter expansion.
//!
//! A transclusion token is resolved against the data-access collaborator and
//! its source is fed through a sub-pipeline checked out of the pipeline
//! cache. The expanded stream is bracketed with start/end marker metas
//! sharing a fresh about id; the start marker carries the serialized argument
//! description that the encapsulation pass later turns into `data-mw`.

use super::{Interest, TokenTransform, TtCtx, TtOutput, strip_tsr};
use crate::{
    common::Result,
    pipeline::PipelineOpts,
    tokens::{
        Attr, DataAttribs, T_TEMPLATE, T_TEMPLATE_ARG, T_WIKILINK, TemplateArgInfo, TemplateParam,
        TemplateTarget, Token, Tsr,
    },
    tokenizer::Tokenizer,
};
use std::collections::HashMap;

/// The stage 2 template transformer.
pub struct TemplateHandler;

impl TemplateHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for TemplateHandler {
    fn shortcut(&self) -> &'static str {
        "template"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_TEMPLATE, T_TEMPLATE_ARG])
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        if !cx.opts.expand_templates {
            // Expansion disabled: the construct renders as its literal
            // source.
            return Ok(TtOutput::Replace(vec![literal_of(&token, cx)]));
        }
        match token.name() {
            Some(T_TEMPLATE) => expand_template(token, cx),
            Some(T_TEMPLATE_ARG) => expand_parameter(token, cx),
            _ => Ok(TtOutput::Keep(token)),
        }
    }
}

/// Reconstructs the literal source text of a construct token.
fn literal_of(token: &Token, cx: &TtCtx<'_>) -> Token {
    let text = token
        .da()
        .and_then(|da| da.tsr)
        .and_then(|tsr| cx.source.get(tsr.0..tsr.1))
        .map(str::to_string)
        .unwrap_or_default();
    Token::Text { text }
}

fn expand_template(token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
    let tsr = token.da().and_then(|da| da.tsr).unwrap_or(Tsr(0, 0));
    let target_raw = token.attr("target").unwrap_or_default().to_string();
    let target = target_raw.trim().to_string();

    // Parser functions ({{#if:…}}, {{lc:…}}, …) are the wiki's own
    // evaluation surface; without it the call renders as literal text.
    if target.starts_with('#') {
        log::warn!(target: "template", "unhandled parser function {target}");
        return Ok(TtOutput::Replace(vec![literal_of(&token, cx)]));
    }

    let (params, args) = collect_args(&token);

    let title = cx.env.site.template_title(&target);
    let about = cx.env.new_about_id();
    let arg_info = TemplateArgInfo {
        target: TemplateTarget { wt: target.clone(), href: None },
        params,
        span: tsr,
    };

    let mut start_da = DataAttribs { tsr: Some(tsr), ..DataAttribs::default() };
    start_da.tpl_arg_info = Some(arg_info);
    let start = Token::marker_meta("mw:Transclusion", &about, start_da);
    let end = Token::marker_meta(
        "mw:Transclusion/End",
        &about,
        DataAttribs { tsr: Some(tsr.end_point()), ..DataAttribs::default() },
    );

    let Some(source) = cx.env.data_access.template_source(&title) else {
        // Missing templates expand to a link to the template page.
        log::warn!(target: "template", "missing template {title}");
        let link = Token::SelfClosing {
            name: T_WIKILINK.into(),
            attrs: vec![Attr::new("href", title.clone())],
            da: DataAttribs::default(),
        };
        return Ok(TtOutput::Replace(vec![start, link, end]));
    };

    let frame = match cx.frame.push(title.clone(), args) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!(target: "template", "{err}");
            return Ok(TtOutput::Replace(vec![literal_of(&token, cx)]));
        }
    };

    let opts = PipelineOpts::for_template();
    let mut pipe = cx.env.cache.checkout(&opts);
    let expanded = pipe.tokens_for(cx.env, &frame, &source);
    cx.env.cache.give_back(pipe);
    let mut expanded = expanded?;

    // Offsets inside the expansion point at the template's source, not at
    // this document; they must not leak into DSR computation.
    strip_tsr(&mut expanded);

    let mut out = Vec::with_capacity(expanded.len() + 2);
    out.push(start);
    out.extend(expanded);
    out.push(end);
    Ok(TtOutput::Replace(out))
}

fn expand_parameter(token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
    let name = token.attr("name").unwrap_or_default().trim().to_string();
    let default = token.attr("default").map(str::to_string);
    let tsr = token.da().and_then(|da| da.tsr);

    if cx.frame.in_template() {
        // Substitute from the frame; nested constructs in the value are
        // re-enqueued so this handler expands them too.
        let value = cx.frame.arg(&name).map(str::to_string).or(default);
        return match value {
            Some(value) => {
                let mut tokens = retokenize(cx, &value)?;
                strip_tsr(&mut tokens);
                Ok(TtOutput::Reenqueue(tokens))
            }
            None => Ok(TtOutput::Replace(vec![literal_of(&token, cx)])),
        };
    }

    // Top-level parameter use: encapsulated as mw:Param so editing clients
    // can round-trip it.
    let about = cx.env.new_about_id();
    let arg_info = TemplateArgInfo {
        target: TemplateTarget { wt: name.clone(), href: None },
        params: default
            .as_ref()
            .map(|d| {
                vec![TemplateParam {
                    k: "1".into(),
                    v: d.clone(),
                    named: false,
                    k_span: None,
                    v_span: None,
                }]
            })
            .unwrap_or_default(),
        span: tsr.unwrap_or(Tsr(0, 0)),
    };
    let mut start_da = DataAttribs { tsr, ..DataAttribs::default() };
    start_da.tpl_arg_info = Some(arg_info);
    let start = Token::marker_meta("mw:Param", &about, start_da);
    let end = Token::marker_meta(
        "mw:Param/End",
        &about,
        DataAttribs { tsr: tsr.map(Tsr::end_point), ..DataAttribs::default() },
    );

    let content = match default {
        Some(d) => {
            let mut tokens = retokenize(cx, &d)?;
            strip_tsr(&mut tokens);
            tokens
        }
        None => vec![literal_of(&token, cx)],
    };

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(start);
    out.extend(content);
    out.push(end);
    Ok(TtOutput::Replace(out))
}

/// Tokenizes a captured wikitext fragment with the host site config.
fn retokenize(cx: &mut TtCtx<'_>, source: &str) -> Result<Vec<Token>> {
    let mut tokens = Tokenizer::new(&cx.env.site).tokenize(source)?;
    tokens.pop_if(|t| matches!(t, Token::Eof));
    Ok(tokens)
}

/// Splits the raw arguments of a transclusion token into the ordered
/// description recorded for round-trip and the name→value map used for
/// parameter substitution. Named argument values are trimmed; positional
/// values are not.
fn collect_args(token: &Token) -> (Vec<TemplateParam>, HashMap<String, String>) {
    let mut params = Vec::new();
    let mut map = HashMap::new();
    let mut ordinal = 0u32;
    for attr in token.attrs().iter().filter(|a| a.name == "arg") {
        match split_named(&attr.value) {
            Some((key, value)) => {
                let key = key.trim().to_string();
                let value_trimmed = value.trim().to_string();
                let (k_span, v_span) = named_spans(attr.span, key.len(), &attr.value);
                params.push(TemplateParam {
                    k: key.clone(),
                    v: value_trimmed.clone(),
                    named: true,
                    k_span,
                    v_span,
                });
                map.insert(key, value_trimmed);
            }
            None => {
                ordinal += 1;
                let key = ordinal.to_string();
                params.push(TemplateParam {
                    k: key.clone(),
                    v: attr.value.clone(),
                    named: false,
                    k_span: None,
                    v_span: attr.span,
                });
                map.insert(key, attr.value.clone());
            }
        }
    }
    (params, map)
}

/// Finds a top-level `=` in an argument, honoring nested braces and
/// brackets.
fn split_named(value: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (i, b) in value.bytes().enumerate() {
        match b {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth -= 1,
            b'=' if depth == 0 => return Some((&value[..i], &value[i + 1..])),
            _ => {}
        }
    }
    None
}

fn named_spans(span: Option<Tsr>, raw_key_len: usize, raw: &str) -> (Option<Tsr>, Option<Tsr>) {
    let Some(span) = span else { return (None, None) };
    // The raw key length is measured before trimming; recover it from the
    // untrimmed argument text.
    let eq = raw.find('=').unwrap_or(raw_key_len);
    (
        Some(Tsr(span.0, span.0 + eq)),
        Some(Tsr(span.0 + eq + 1, span.1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::DataAttribs;

    fn tpl_token(args: &[&str]) -> Token {
        let mut attrs = vec![Attr::new("target", "echo")];
        for a in args {
            attrs.push(Attr::new("arg", *a));
        }
        Token::SelfClosing { name: T_TEMPLATE.into(), attrs, da: DataAttribs::default() }
    }

    #[test]
    fn positional_and_named_args() {
        let (params, map) = collect_args(&tpl_token(&["foo", "k = v ", "bar"]));
        assert_eq!(params.len(), 3);
        assert_eq!(map.get("1").map(String::as_str), Some("foo"));
        assert_eq!(map.get("k").map(String::as_str), Some("v"), "named values are trimmed");
        assert_eq!(map.get("2").map(String::as_str), Some("bar"));
        assert!(params[1].named);
        assert!(!params[2].named);
    }

    #[test]
    fn nested_braces_do_not_split() {
        let (params, map) = collect_args(&tpl_token(&["{{x|a=b}}"]));
        assert!(!params[0].named, "= inside a nested call is not a delimiter");
        assert_eq!(map.get("1").map(String::as_str), Some("{{x|a=b}}"));
    }
}
