//! Stage 2: wiki-link and external-link handling.
//!
//! Link tokens become `<a>` (or media/category structures) here; trail and
//! prefix text is glued on later by the DOM link-neighbour pass, which needs
//! adjacency information the token stream does not have yet.

use super::{Interest, TokenTransform, TtCtx, TtOutput, shift_tsr};
use crate::{
    common::Result,
    config::Namespace,
    tokens::{Attr, DataAttribs, T_EXTLINK, T_WIKILINK, Token},
    tokenizer::Tokenizer,
};

/// The stage 2 wiki-link transformer.
pub struct WikiLinkHandler;

impl WikiLinkHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for WikiLinkHandler {
    fn shortcut(&self) -> &'static str {
        "wikilink"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_WIKILINK])
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let raw_target = token.attr("href").unwrap_or_default().to_string();
        let target = raw_target.trim();
        let (escaped, target) = match target.strip_prefix(':') {
            Some(rest) => (true, rest.trim()),
            None => (false, target),
        };
        if target.is_empty() {
            return Ok(TtOutput::Replace(vec![Token::Text {
                text: format!("[[{raw_target}]]"),
            }]));
        }

        let da = token.da().cloned().unwrap_or_default();
        let ns = cx.env.site.split_namespace(target).map(|(ns, rest)| (ns.id, rest.to_string()));

        match ns {
            Some((Namespace::CATEGORY, _)) if !escaped => {
                // Category links render nothing; they accumulate on the page
                // metadata.
                let title = cx.env.site.normalize_title(target);
                cx.env.props.categories.push(title);
                Ok(TtOutput::Replace(Vec::new()))
            }
            Some((Namespace::FILE, _)) if !escaped => Ok(TtOutput::Replace(media_tokens(
                cx, &token, target, da,
            ))),
            _ => Ok(TtOutput::Replace(page_link_tokens(cx, &token, target, da)?)),
        }
    }
}

/// Builds the `<a rel="mw:WikiLink">` structure for an ordinary page link.
fn page_link_tokens(
    cx: &mut TtCtx<'_>,
    token: &Token,
    target: &str,
    da: DataAttribs,
) -> Result<Vec<Token>> {
    let title = cx.env.site.normalize_title(target);
    let href = cx.env.site.href_for(&title);
    let interwiki = target
        .split_once(':')
        .is_some_and(|(prefix, _)| cx.env.site.interwiki.iter().any(|iw| iw.eq_ignore_ascii_case(prefix)));

    let rel = if interwiki { "mw:WikiLink/Interwiki" } else { "mw:WikiLink" };
    let start = Token::StartTag {
        name: "a".into(),
        attrs: vec![
            Attr::new("rel", rel),
            Attr::new("href", href),
            Attr::new("title", title),
        ],
        da,
    };

    // The last pipe segment is the display content; earlier segments are
    // meaningless on page links and are ignored.
    let content = token.attrs().iter().filter(|a| a.name == "arg").last();
    let mut out = vec![start];
    match content {
        Some(attr) if !attr.value.is_empty() => {
            let mut tokens = Tokenizer::new(&cx.env.site).tokenize(&attr.value)?;
            tokens.pop_if(|t| matches!(t, Token::Eof));
            match attr.span {
                // Content captured from this document keeps its offsets.
                Some(span) => shift_tsr(&mut tokens, span.0),
                None => super::strip_tsr(&mut tokens),
            }
            out.extend(tokens);
        }
        _ => out.push(Token::Text { text: target.to_string() }),
    }
    out.push(Token::EndTag { name: "a".into(), da: DataAttribs::default() });
    Ok(out)
}

/// Builds the media structure for a `[[File:…]]` link. Dimensions and the
/// resolved URL are filled in by the media-info pass.
fn media_tokens(cx: &mut TtCtx<'_>, token: &Token, target: &str, da: DataAttribs) -> Vec<Token> {
    let title = cx.env.site.normalize_title(target);
    let caption = token
        .attrs()
        .iter()
        .filter(|a| a.name == "arg")
        .last()
        .map(|a| a.value.clone())
        .unwrap_or_default();

    let mut span_attrs = vec![Attr::new("typeof", "mw:Image")];
    if !caption.is_empty() {
        span_attrs.push(Attr::new("data-mw-caption", caption.clone()));
    }
    vec![
        Token::StartTag { name: "span".into(), attrs: span_attrs, da },
        Token::SelfClosing {
            name: "img".into(),
            attrs: vec![
                Attr::new("resource", cx.env.site.href_for(&title)),
                Attr::new("alt", caption),
            ],
            da: DataAttribs::default(),
        },
        Token::EndTag { name: "span".into(), da: DataAttribs::default() },
    ]
}

/// The stage 2 external-link transformer.
pub struct ExternalLinkHandler;

impl ExternalLinkHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for ExternalLinkHandler {
    fn shortcut(&self) -> &'static str {
        "extlink"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_EXTLINK])
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let href = token.attr("href").unwrap_or_default().to_string();
        let content = token.attr("content").unwrap_or_default().to_string();
        let da = token.da().cloned().unwrap_or_default();

        let start = Token::StartTag {
            name: "a".into(),
            attrs: vec![Attr::new("rel", "mw:ExtLink"), Attr::new("href", href)],
            da,
        };
        let mut out = vec![start];
        if !content.is_empty() {
            let mut tokens = Tokenizer::new(&cx.env.site).tokenize(&content)?;
            tokens.pop_if(|t| matches!(t, Token::Eof));
            super::strip_tsr(&mut tokens);
            out.extend(tokens);
        }
        out.push(Token::EndTag { name: "a".into(), da: DataAttribs::default() });
        Ok(TtOutput::Replace(out))
    }
}
