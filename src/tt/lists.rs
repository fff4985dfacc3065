//! Stage 3: list building.
//!
//! Bullet-run tokens become properly nested list structure. A single newline
//! between items is structural and is dropped; a line that is not a list
//! item closes every open list.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::Result;
use crate::tokens::{DataAttribs, Syntax, T_LIST_ITEM, Token};

fn list_tag(bullet: char) -> &'static str {
    match bullet {
        '*' => "ul",
        '#' => "ol",
        _ => "dl",
    }
}

fn item_tag(bullet: char) -> &'static str {
    match bullet {
        '*' | '#' => "li",
        ';' => "dt",
        _ => "dd",
    }
}

/// The stage 3 list transformer.
pub struct ListHandler {
    /// The bullet run of the currently open item, outermost first.
    stack: Vec<char>,
    /// A newline held while deciding whether the list continues.
    pending_nl: Option<Token>,
}

impl ListHandler {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { stack: Vec::new(), pending_nl: None }
    }

    fn wt_tag(name: &'static str, start: bool) -> Token {
        let da = DataAttribs { stx: Some(Syntax::Wikitext), ..DataAttribs::default() };
        if start {
            Token::StartTag { name: name.into(), attrs: vec![], da }
        } else {
            Token::EndTag { name: name.into(), da }
        }
    }

    fn close_all(&mut self) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(bullet) = self.stack.pop() {
            out.push(Self::wt_tag(item_tag(bullet), false));
            out.push(Self::wt_tag(list_tag(bullet), false));
        }
        out
    }

    /// Emits the transition from the current bullet run to `bullets`.
    fn transition(&mut self, bullets: &str) -> Vec<Token> {
        let new: Vec<char> = bullets.chars().collect();
        let common = self
            .stack
            .iter()
            .zip(&new)
            .take_while(|(a, b)| a == b)
            .count();

        let mut out = Vec::new();
        // Close deeper levels.
        while self.stack.len() > common {
            let bullet = self.stack.pop().unwrap();
            out.push(Self::wt_tag(item_tag(bullet), false));
            out.push(Self::wt_tag(list_tag(bullet), false));
        }
        if new.len() == common {
            // Same run: a sibling item.
            if let Some(&bullet) = self.stack.last() {
                out.push(Self::wt_tag(item_tag(bullet), false));
                out.push(Self::wt_tag(item_tag(bullet), true));
            }
        } else {
            // Open the deeper levels inside the current item.
            for &bullet in &new[common..] {
                out.push(Self::wt_tag(list_tag(bullet), true));
                out.push(Self::wt_tag(item_tag(bullet), true));
                self.stack.push(bullet);
            }
        }
        out
    }
}

impl TokenTransform for ListHandler {
    fn shortcut(&self) -> &'static str {
        "lists"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        match &token {
            Token::SelfClosing { name, .. } if name == T_LIST_ITEM => {
                let bullets = token.attr("bullets").unwrap_or("*").to_string();
                // The newline between items is structural, not content.
                self.pending_nl = None;
                Ok(TtOutput::Replace(self.transition(&bullets)))
            }
            Token::Newline { .. } if !self.stack.is_empty() => {
                if let Some(prev) = self.pending_nl.take() {
                    // A blank line: the list is over.
                    let mut out = self.close_all();
                    out.push(prev);
                    out.push(token);
                    Ok(TtOutput::Replace(out))
                } else {
                    self.pending_nl = Some(token);
                    Ok(TtOutput::Replace(Vec::new()))
                }
            }
            _ if !self.stack.is_empty() && self.pending_nl.is_some() => {
                // The next line is not a list item: close up.
                let mut out = self.close_all();
                out.push(self.pending_nl.take().unwrap());
                out.push(token);
                Ok(TtOutput::Replace(out))
            }
            _ => Ok(TtOutput::Keep(token)),
        }
    }

    fn flush(&mut self, _cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        let mut out = self.close_all();
        if let Some(nl) = self.pending_nl.take() {
            out.push(nl);
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.pending_nl = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Token::StartTag { name, .. } => format!("<{name}>"),
                Token::EndTag { name, .. } => format!("</{name}>"),
                _ => "?".to_string(),
            })
            .collect()
    }

    #[test]
    fn nesting_transitions() {
        let mut h = ListHandler::new();
        assert_eq!(names(&h.transition("*")), ["<ul>", "<li>"]);
        assert_eq!(names(&h.transition("**")), ["<ul>", "<li>"]);
        assert_eq!(names(&h.transition("*")), ["</li>", "</ul>", "</li>", "<li>"]);
        assert_eq!(names(&h.transition("#")), ["</li>", "</ul>", "<ol>", "<li>"]);
        assert_eq!(names(&h.close_all()), ["</li>", "</ol>"]);
    }
}
