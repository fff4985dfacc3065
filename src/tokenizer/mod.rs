//! The tokenizer adapter.
//!
//! The grammar itself is a black box that produces the flat token stream;
//! this module owns the boundary: configuration threading and error mapping.

use crate::{
    common::{Error, Result},
    config::SiteConfig,
    tokens::Token,
};

mod grammar;

pub(crate) use grammar::parse_attr_text;

/// Streams tokens for a wikitext source.
pub struct Tokenizer<'c> {
    cfg: &'c SiteConfig,
}

impl<'c> Tokenizer<'c> {
    /// Creates a tokenizer bound to a site configuration.
    pub fn new(cfg: &'c SiteConfig) -> Self {
        Self { cfg }
    }

    /// Tokenizes a full source string. The stream always ends with
    /// [`Token::Eof`].
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>> {
        grammar::wikitext::document(source, self.cfg)
            .map_err(|err| Error::Client(format!("tokenize failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{T_LIST_ITEM, T_QUOTE, T_TEMPLATE, T_WIKILINK};

    fn toks(src: &str) -> Vec<Token> {
        Tokenizer::new(&SiteConfig::default()).tokenize(src).unwrap()
    }

    fn names(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Token::StartTag { name, .. } => format!("<{name}>"),
                Token::EndTag { name, .. } => format!("</{name}>"),
                Token::SelfClosing { name, .. } => format!("<{name}/>"),
                Token::Comment { .. } => "<!--".to_string(),
                Token::Newline { .. } => "\\n".to_string(),
                Token::Text { text } => format!("'{text}'"),
                Token::Eof => "EOF".to_string(),
            })
            .collect()
    }

    #[test]
    fn plain_text() {
        let t = toks("hello world");
        assert_eq!(names(&t), ["'hello world'", "EOF"]);
    }

    #[test]
    fn heading_line() {
        let t = toks("==Test==\n");
        assert_eq!(names(&t), ["<h2>", "'Test'", "</h2>", "\\n", "EOF"]);
        let Token::StartTag { da, .. } = &t[0] else { panic!() };
        assert_eq!(da.tsr.map(|t| (t.0, t.1)), Some((0, 8)));
        assert_eq!(da.tag_widths, Some((2, 2)));
    }

    #[test]
    fn unbalanced_heading_keeps_extra_markers() {
        let t = toks("===a=");
        assert_eq!(names(&t), ["<h1>", "'=='", "'a'", "</h1>", "EOF"]);
    }

    #[test]
    fn heading_needs_sol() {
        let t = toks("x ==a==");
        assert!(
            t.iter().all(|t| t.name() != Some("h2")),
            "mid-line = runs are text: {:?}",
            names(&t)
        );
    }

    #[test]
    fn template_with_args() {
        let t = toks("{{echo|foo|k=v}}");
        let Token::SelfClosing { name, attrs, da } = &t[0] else {
            panic!("expected template token: {:?}", names(&t))
        };
        assert_eq!(name, T_TEMPLATE);
        assert_eq!(attrs[0].value, "echo");
        assert_eq!(attrs[1].value, "foo");
        assert_eq!(attrs[1].span.map(|s| (s.0, s.1)), Some((7, 10)));
        assert_eq!(attrs[2].value, "k=v");
        assert_eq!(da.tsr.map(|t| (t.0, t.1)), Some((0, 16)));
    }

    #[test]
    fn nested_template_stays_raw() {
        let t = toks("{{a|{{b|c}}}}");
        let Token::SelfClosing { attrs, .. } = &t[0] else { panic!() };
        assert_eq!(attrs[1].value, "{{b|c}}", "nested call is captured raw");
    }

    #[test]
    fn wikilink_and_table() {
        let t = toks("[[Foo|bar]]");
        assert_eq!(t[0].name(), Some(T_WIKILINK));

        let t = toks("{|\n|-\n|a||b\n|}");
        let names = names(&t);
        assert_eq!(
            names,
            [
                "<table>", "\\n", "<tr>", "\\n", "<td>", "'a'", "<td>", "'b'", "\\n",
                "</table>", "EOF"
            ]
        );
    }

    #[test]
    fn quotes_and_lists() {
        let t = toks("'''x''");
        assert_eq!(t[0].name(), Some(T_QUOTE));
        assert_eq!(t[0].attr("value"), Some("'''"));

        let t = toks("* item");
        assert_eq!(t[0].name(), Some(T_LIST_ITEM));
        assert_eq!(t[0].attr("bullets"), Some("*"));
    }

    #[test]
    fn unknown_tag_is_text() {
        let t = toks("<bogus>x</bogus>");
        assert!(t.iter().all(|t| t.name().is_none()), "{:?}", names(&t));
    }

    #[test]
    fn extension_tag_captures_body() {
        let t = toks("<nowiki>''raw''</nowiki>");
        assert_eq!(t[0].name(), Some("extension"));
        assert_eq!(t[0].attr("name"), Some("nowiki"));
        assert_eq!(t[0].attr("body"), Some("''raw''"));
    }

    #[test]
    fn entity_decodes() {
        let t = toks("a&amp;b");
        assert_eq!(names(&t), ["'a'", "'&'", "'b'", "EOF"]);
    }
}
