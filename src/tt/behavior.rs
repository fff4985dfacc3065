//! Stage 3: behavior switches.
//!
//! `__WORD__` switches are consumed into page properties and leave a
//! property meta behind for round-trip.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::Result;
use crate::tokens::{Attr, T_BEHAVIOR_SWITCH, Token};

/// The stage 3 behavior-switch transformer.
pub struct BehaviorSwitchHandler;

impl BehaviorSwitchHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for BehaviorSwitchHandler {
    fn shortcut(&self) -> &'static str {
        "behavior"
    }

    fn interest(&self) -> Interest {
        Interest::Tags(&[T_BEHAVIOR_SWITCH])
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        let word = token.attr("word").unwrap_or_default().to_string();
        match word.as_str() {
            "notoc" => cx.env.props.no_toc = true,
            "forcetoc" => cx.env.props.force_toc = true,
            "noeditsection" => cx.env.props.no_edit_section = true,
            "nocontentconvert" => cx.env.props.no_content_convert = true,
            "notitleconvert" => cx.env.props.no_title_convert = true,
            _ => {}
        }

        let da = token.da().cloned().unwrap_or_default();
        Ok(TtOutput::Replace(vec![Token::SelfClosing {
            name: "meta".into(),
            attrs: vec![Attr::new("property", format!("mw:PageProp/{word}"))],
            da,
        }]))
    }
}
