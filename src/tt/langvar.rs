//! Stage 2: language-variant markup.
//!
//! `-{ … }-` constructs become `mw:LanguageVariant` spans carrying their
//! conversion rules in `data-mw-variant`. The DOM converter pass applies the
//! replacement machine to them.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::{
    common::Result,
    tokens::{Attr, DataAttribs, T_LANG_VARIANT, Token},
};

/// The stage 2 language-variant transformer.
pub struct LanguageVariantHandler;

impl LanguageVariantHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for LanguageVariantHandler {
    fn shortcut(&self) -> &'static str {
        "langvar"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_LANG_VARIANT])
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let body = token.attr("text").unwrap_or_default().to_string();
        let da = token.da().cloned().unwrap_or_default();

        let (variant_json, display) = parse_variant(&body);
        let start = Token::StartTag {
            name: "span".into(),
            attrs: vec![
                Attr::new("typeof", "mw:LanguageVariant"),
                Attr::new("data-mw-variant", variant_json.to_string()),
            ],
            da,
        };
        Ok(TtOutput::Replace(vec![
            start,
            Token::Text { text: display },
            Token::EndTag { name: "span".into(), da: DataAttribs::default() },
        ]))
    }
}

/// Parses the interior of `-{…}-` into its rule description and the default
/// display text.
fn parse_variant(body: &str) -> (serde_json::Value, String) {
    // A flag section is separated from the variant list by the first `|`.
    let (flags, rest) = match body.split_once('|') {
        Some((flags, rest)) => (Some(flags.trim()), rest),
        None => (None, body),
    };

    let mut rules = Vec::new();
    for entry in rest.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some((lang, text)) = entry.split_once(':') {
            rules.push(serde_json::json!({ "l": lang.trim(), "t": text.trim() }));
        }
    }

    if rules.is_empty() {
        // No per-variant rules: conversion is disabled for this run.
        let text = rest.trim().to_string();
        return (
            serde_json::json!({ "disabled": { "t": text } }),
            text,
        );
    }

    let display = rules
        .first()
        .and_then(|r| r.get("t"))
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();
    let mut value = serde_json::json!({ "twoway": rules });
    if let Some(flags) = flags {
        value["fl"] = serde_json::json!(
            flags.split(';').map(str::trim).filter(|f| !f.is_empty()).collect::<Vec<_>>()
        );
    }
    (value, display)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_form() {
        let (json, display) = parse_variant("plain text");
        assert_eq!(display, "plain text");
        assert_eq!(json["disabled"]["t"], "plain text");
    }

    #[test]
    fn twoway_form() {
        let (json, display) = parse_variant("zh-hans:简;zh-hant:繁");
        assert_eq!(display, "简");
        assert_eq!(json["twoway"][0]["l"], "zh-hans");
        assert_eq!(json["twoway"][1]["t"], "繁");
    }
}
