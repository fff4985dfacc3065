//! Stage 3: sanitization.
//!
//! Strips event handlers and script URLs from attributes and deduplicates
//! repeated attributes (last occurrence wins, matching browser behaviour for
//! the markup this pipeline emits).

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::common::{Result, decode_entities};
use crate::tokens::{Attr, Token};

/// Attributes that carry URLs and therefore accept only safe schemes.
const URL_ATTRS: &[&str] = &["href", "src", "resource", "poster"];

/// The stage 3 sanitizer.
pub struct Sanitizer;

impl Sanitizer {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenTransform for Sanitizer {
    fn shortcut(&self) -> &'static str {
        "sanitizer"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, mut token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        if let Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } = &mut token {
            sanitize_attrs(attrs);
        }
        Ok(TtOutput::Keep(token))
    }
}

fn sanitize_attrs(attrs: &mut Vec<Attr>) {
    // Last occurrence of a name wins.
    let mut deduped: Vec<Attr> = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        if let Some(existing) = deduped.iter_mut().find(|a| a.name == attr.name) {
            *existing = attr;
        } else {
            deduped.push(attr);
        }
    }
    deduped.retain(|attr| {
        if attr.name.starts_with("on") {
            return false;
        }
        if URL_ATTRS.contains(&attr.name.as_str()) && !safe_url(&attr.value) {
            return false;
        }
        true
    });
    *attrs = deduped;
}

/// Rejects script-scheme URLs, including entity-obfuscated ones.
fn safe_url(value: &str) -> bool {
    let decoded = decode_entities(value);
    let cleaned: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !cleaned.starts_with("javascript:") && !cleaned.starts_with("vbscript:") && !cleaned.starts_with("data:text/html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_handlers_and_script_urls() {
        let mut attrs = vec![
            Attr::new("onclick", "evil()"),
            Attr::new("href", "java\nscript:alert(1)"),
            Attr::new("class", "a"),
            Attr::new("class", "b"),
        ];
        sanitize_attrs(&mut attrs);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "class");
        assert_eq!(attrs[0].value, "b", "last duplicate wins");
    }

    #[test]
    fn keeps_ordinary_urls() {
        assert!(safe_url("https://example.org/x"));
        assert!(safe_url("./Page"));
        assert!(!safe_url("JavaScript:x"));
        assert!(!safe_url("&#106;avascript:x"));
    }
}
