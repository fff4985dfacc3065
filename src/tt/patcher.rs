//! Stage 3: token-stream patching.
//!
//! Coalesces adjacent text runs (the tokenizer emits single-character
//! fallbacks for failed construct starts) and drops empty text so the later
//! stage 3 transforms see a clean stream.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::{common::Result, tokens::Token};

/// The stage 3 stream patcher.
pub struct TokenStreamPatcher {
    held: Option<String>,
}

impl TokenStreamPatcher {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { held: None }
    }
}

impl TokenTransform for TokenStreamPatcher {
    fn shortcut(&self) -> &'static str {
        "patcher"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        match token {
            Token::Text { text } => {
                if text.is_empty() && self.held.is_none() {
                    return Ok(TtOutput::Replace(Vec::new()));
                }
                match &mut self.held {
                    Some(held) => held.push_str(&text),
                    None => self.held = Some(text),
                }
                Ok(TtOutput::Replace(Vec::new()))
            }
            other => match self.held.take() {
                Some(held) => Ok(TtOutput::Replace(vec![Token::Text { text: held }, other])),
                None => Ok(TtOutput::Keep(other)),
            },
        }
    }

    fn flush(&mut self, _cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        Ok(self
            .held
            .take()
            .map(|text| vec![Token::Text { text }])
            .unwrap_or_default())
    }

    fn reset(&mut self) {
        self.held = None;
    }
}
