//! Stage 3: paragraph wrapping.
//!
//! Top-level inline runs are wrapped in `<p>`; a blank line separates
//! paragraphs and a block tag interrupts one. Content inside block
//! structure (tables, lists, headings) is left to the tree builder.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::Result;
use crate::config::BLOCK_TAGS;
use crate::tokens::{DataAttribs, Token};

/// The stage 3 paragraph wrapper.
pub struct ParagraphWrapper {
    /// Inside an open synthetic paragraph.
    in_p: bool,
    /// Nesting depth of block constructs; wrapping happens only at depth 0.
    depth: usize,
    /// A newline held while deciding whether the paragraph ends.
    pending_nl: Option<Token>,
}

impl ParagraphWrapper {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { in_p: false, depth: 0, pending_nl: None }
    }

    fn open_p(&mut self) -> Token {
        self.in_p = true;
        Token::StartTag { name: "p".into(), attrs: vec![], da: DataAttribs::default() }
    }

    fn close_p(&mut self) -> Token {
        self.in_p = false;
        Token::EndTag { name: "p".into(), da: DataAttribs::default() }
    }

    /// Tags whose start/end tokens arrive balanced in the stage 3 stream and
    /// therefore can carry the depth counter.
    fn counted(name: &str) -> bool {
        BLOCK_TAGS.contains(name) && !matches!(name, "tr" | "td" | "th" | "caption" | "li" | "dt" | "dd")
    }

    /// Whether a token would open a paragraph.
    fn starts_content(token: &Token) -> bool {
        match token {
            Token::Text { text } => !text.trim().is_empty(),
            Token::StartTag { name, .. } | Token::SelfClosing { name, .. } => {
                !BLOCK_TAGS.contains(name.as_str()) && name != "meta"
            }
            _ => false,
        }
    }
}

impl TokenTransform for ParagraphWrapper {
    fn shortcut(&self) -> &'static str {
        "p-wrap"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        if cx.opts.inline_context {
            return Ok(TtOutput::Keep(token));
        }

        // Track block nesting.
        let mut out = Vec::new();
        match &token {
            Token::StartTag { name, .. } if BLOCK_TAGS.contains(name.as_str()) => {
                if self.in_p {
                    out.push(self.close_p());
                }
                if let Some(nl) = self.pending_nl.take() {
                    out.push(nl);
                }
                if Self::counted(name) {
                    self.depth += 1;
                }
                out.push(token);
                return Ok(TtOutput::Replace(out));
            }
            Token::EndTag { name, .. } if BLOCK_TAGS.contains(name.as_str()) => {
                if self.in_p {
                    out.push(self.close_p());
                }
                if Self::counted(name) {
                    self.depth = self.depth.saturating_sub(1);
                }
                out.push(token);
                return Ok(TtOutput::Replace(out));
            }
            _ => {}
        }

        if self.depth > 0 {
            return Ok(TtOutput::Keep(token));
        }

        match &token {
            Token::Newline { .. } => {
                if !self.in_p {
                    if let Some(nl) = self.pending_nl.take() {
                        out.push(nl);
                    }
                    out.push(token);
                    return Ok(TtOutput::Replace(out));
                }
                if let Some(prev) = self.pending_nl.take() {
                    // A blank line: the paragraph ends before it.
                    out.push(self.close_p());
                    out.push(prev);
                    out.push(token);
                    Ok(TtOutput::Replace(out))
                } else {
                    self.pending_nl = Some(token);
                    Ok(TtOutput::Replace(Vec::new()))
                }
            }
            _ => {
                if let Some(nl) = self.pending_nl.take() {
                    // A single newline stays inside the paragraph.
                    out.push(nl);
                }
                if !self.in_p && Self::starts_content(&token) {
                    out.push(self.open_p());
                }
                out.push(token);
                Ok(TtOutput::Replace(out))
            }
        }
    }

    fn flush(&mut self, _cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        if self.in_p {
            out.push(self.close_p());
        }
        if let Some(nl) = self.pending_nl.take() {
            out.push(nl);
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.in_p = false;
        self.depth = 0;
        self.pending_nl = None;
    }
}
