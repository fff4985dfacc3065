//! Stage 2: attribute expansion.
//!
//! Element attributes may contain transclusions (`<div class="{{…}}">`,
//! table cell attributes built by templates). Values are expanded through a
//! sub-pipeline and flattened back to plain text. This runs after template
//! expansion so branches that never reach an attribute are not expanded
//! twice.

use super::{Interest, TokenTransform, TtCtx, TtOutput, tokens_to_text};
use crate::{
    common::Result,
    pipeline::PipelineOpts,
    tokens::{
        T_BEHAVIOR_SWITCH, T_EXTENSION, T_EXTLINK, T_LANG_VARIANT, T_LIST_ITEM, T_QUOTE,
        T_TEMPLATE, T_TEMPLATE_ARG, T_WIKILINK, Token,
    },
};

/// Token names whose attributes are construct state, not HTML attributes.
const INTERNAL: &[&str] = &[
    T_TEMPLATE,
    T_TEMPLATE_ARG,
    T_EXTENSION,
    T_WIKILINK,
    T_EXTLINK,
    T_LANG_VARIANT,
    T_QUOTE,
    T_LIST_ITEM,
    T_BEHAVIOR_SWITCH,
    "meta",
];

/// The stage 2 attribute expander.
pub struct AttributeExpander;

impl AttributeExpander {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for AttributeExpander {
    fn shortcut(&self) -> &'static str {
        "attr-expand"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, mut token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let expandable = matches!(&token, Token::StartTag { name, attrs, .. } | Token::SelfClosing { name, attrs, .. }
            if !INTERNAL.contains(&name.as_str())
                && attrs.iter().any(|a| a.value.contains("{{") || a.value.contains("[[")));
        if !expandable {
            return Ok(TtOutput::Keep(token));
        }

        if let Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } = &mut token {
            let raw: Vec<(usize, String)> = attrs
                .iter()
                .enumerate()
                .filter(|(_, a)| a.value.contains("{{") || a.value.contains("[["))
                .map(|(i, a)| (i, a.value.clone()))
                .collect();
            let mut expanded = Vec::with_capacity(raw.len());
            for (i, value) in raw {
                let opts = PipelineOpts {
                    attr_expansion: true,
                    expand_templates: true,
                    is_include: cx.opts.is_include,
                    in_template: cx.opts.in_template,
                    ..PipelineOpts::default()
                };
                let mut pipe = cx.env.cache.checkout(&opts);
                let tokens = pipe.tokens_for(cx.env, cx.frame, &value);
                cx.env.cache.give_back(pipe);
                expanded.push((i, tokens_to_text(&tokens?)));
            }
            for (i, value) in expanded {
                attrs[i].value = value;
                attrs[i].span = None;
            }
        }
        Ok(TtOutput::Keep(token))
    }
}
