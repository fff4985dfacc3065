//! Stage 3: bold/italic quote balancing.
//!
//! Quote runs toggle `<i>`/`<b>` state; anything still open at the end of a
//! line is closed there, matching the line-scoped semantics of the markup.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::Result;
use crate::tokens::{DataAttribs, Syntax, T_QUOTE, Token};

/// The stage 3 quote transformer.
pub struct QuoteTransformer {
    /// Open inline style tags, outermost first.
    open: Vec<&'static str>,
}

impl QuoteTransformer {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { open: Vec::new() }
    }

    fn start(&mut self, name: &'static str) -> Token {
        self.open.push(name);
        let da = DataAttribs { stx: Some(Syntax::Wikitext), ..DataAttribs::default() };
        Token::StartTag { name: name.into(), attrs: vec![], da }
    }

    /// Toggles a style, reopening any styles that had to close over it.
    fn toggle(&mut self, name: &'static str, out: &mut Vec<Token>) {
        if let Some(pos) = self.open.iter().position(|&n| n == name) {
            // Close everything above it, close it, reopen the rest.
            let reopen: Vec<&'static str> = self.open.drain(pos + 1..).collect();
            for &n in reopen.iter().rev() {
                out.push(Token::EndTag { name: n.into(), da: DataAttribs::default() });
            }
            self.open.pop();
            out.push(Token::EndTag { name: name.into(), da: DataAttribs::default() });
            for &n in &reopen {
                out.push(self.start(n));
            }
        } else {
            out.push(self.start(name));
        }
    }

    fn close_all(&mut self) -> Vec<Token> {
        self.open
            .drain(..)
            .rev()
            .map(|n| Token::EndTag { name: n.into(), da: DataAttribs::default() })
            .collect()
    }
}

impl TokenTransform for QuoteTransformer {
    fn shortcut(&self) -> &'static str {
        "quotes"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        match &token {
            Token::SelfClosing { name, .. } if name == T_QUOTE => {
                let run = token.attr("value").unwrap_or("''").len();
                let mut out = Vec::new();
                match run {
                    2 => self.toggle("i", &mut out),
                    3 => self.toggle("b", &mut out),
                    4 => {
                        // Three quotes of bold plus a literal apostrophe.
                        out.push(Token::Text { text: "'".into() });
                        self.toggle("b", &mut out);
                    }
                    _ => {
                        // Five or more: bold italic, extras are literal.
                        if run > 5 {
                            out.push(Token::Text { text: "'".repeat(run - 5) });
                        }
                        if self.open.contains(&"b") || self.open.contains(&"i") {
                            self.toggle("b", &mut out);
                            self.toggle("i", &mut out);
                        } else {
                            self.toggle("i", &mut out);
                            self.toggle("b", &mut out);
                        }
                    }
                }
                Ok(TtOutput::Replace(out))
            }
            Token::Newline { .. } => {
                let mut out = self.close_all();
                out.push(token);
                Ok(TtOutput::Replace(out))
            }
            _ => Ok(TtOutput::Keep(token)),
        }
    }

    fn flush(&mut self, _cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        Ok(self.close_all())
    }

    fn reset(&mut self) {
        self.open.clear();
    }
}
