//! Stage 3: indent-pre formation.
//!
//! A line starting with a single space opens a preformatted block; the block
//! continues across consecutive space-indented lines and closes at the first
//! line that is not.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::Result;
use crate::tokens::{DataAttribs, Syntax, Token};

/// The stage 3 indent-pre transformer.
pub struct PreHandler {
    /// At the start of a line.
    sol: bool,
    /// Inside an open indent-pre block.
    in_pre: bool,
    /// A newline seen inside the block, not yet committed to either side of
    /// the close tag.
    pending_nl: Option<Token>,
}

impl PreHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { sol: true, in_pre: false, pending_nl: None }
    }

    /// Closes the open block. The held newline lands after the close tag.
    fn close(&mut self, next: Vec<Token>) -> Vec<Token> {
        self.in_pre = false;
        let mut out = vec![Token::EndTag { name: "pre".into(), da: DataAttribs::default() }];
        if let Some(nl) = self.pending_nl.take() {
            out.push(nl);
        }
        out.extend(next);
        out
    }
}

impl TokenTransform for PreHandler {
    fn shortcut(&self) -> &'static str {
        "pre"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        if self.in_pre {
            return Ok(match token {
                Token::Newline { .. } => {
                    self.sol = true;
                    if let Some(prev) = self.pending_nl.take() {
                        // An empty line: the block ended at the previous
                        // newline.
                        let mut out = self.close(Vec::new());
                        out.push(prev);
                        out.push(token);
                        TtOutput::Replace(out)
                    } else {
                        self.pending_nl = Some(token);
                        TtOutput::Replace(Vec::new())
                    }
                }
                Token::Text { ref text } if self.sol && text.starts_with(' ') => {
                    self.sol = false;
                    let mut out = Vec::new();
                    if self.pending_nl.take().is_some() {
                        out.push(Token::Text { text: "\n".into() });
                    }
                    out.push(Token::Text { text: text[1..].to_string() });
                    TtOutput::Replace(out)
                }
                other => {
                    self.sol = false;
                    TtOutput::Replace(self.close(vec![other]))
                }
            });
        }

        Ok(match token {
            Token::Newline { .. } => {
                self.sol = true;
                TtOutput::Keep(token)
            }
            Token::Text { ref text }
                if self.sol && text.starts_with(' ') && !text[1..].trim().is_empty() =>
            {
                self.in_pre = true;
                self.sol = false;
                let da = DataAttribs { stx: Some(Syntax::Wikitext), ..DataAttribs::default() };
                TtOutput::Replace(vec![
                    Token::StartTag { name: "pre".into(), attrs: vec![], da },
                    Token::Text { text: text[1..].to_string() },
                ])
            }
            other => {
                if !matches!(other, Token::Comment { .. }) {
                    self.sol = false;
                }
                TtOutput::Keep(other)
            }
        })
    }

    fn flush(&mut self, _cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        if self.in_pre {
            Ok(self.close(Vec::new()))
        } else {
            Ok(Vec::new())
        }
    }

    fn reset(&mut self) {
        self.sol = true;
        self.in_pre = false;
        self.pending_nl = None;
    }
}
