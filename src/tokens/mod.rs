//! The token data model shared by the tokenizer and the transform stages.
//!
//! Tokens are a flat stream, not a tree: nesting is reconstructed later by the
//! tree builder. Wikitext-specific constructs (templates, links, extension
//! tags, …) travel through the stream as tag tokens with well-known names so
//! that the transform stages can subscribe to them by name; by the time the
//! stream reaches the tree builder only plain HTML-shaped tokens remain.

use serde::{Deserialize, Serialize};

/// Token name used for an unexpanded transclusion (`{{…}}`).
pub const T_TEMPLATE: &str = "template";
/// Token name used for an unexpanded template parameter (`{{{…}}}`).
pub const T_TEMPLATE_ARG: &str = "templatearg";
/// Token name used for an unprocessed extension tag.
pub const T_EXTENSION: &str = "extension";
/// Token name used for an unprocessed wikilink (`[[…]]`).
pub const T_WIKILINK: &str = "wikilink";
/// Token name used for an unprocessed external link (`[…]`).
pub const T_EXTLINK: &str = "extlink";
/// Token name used for a run of `''`/`'''` quotes.
pub const T_QUOTE: &str = "mw-quote";
/// Token name used for a wikitext list item bullet run.
pub const T_LIST_ITEM: &str = "listItem";
/// Token name used for a `__WORD__` behavior switch.
pub const T_BEHAVIOR_SWITCH: &str = "behavior-switch";
/// Token name used for unprocessed language-variant markup (`-{…}-`).
pub const T_LANG_VARIANT: &str = "lang-variant";

/// A token source range: half-open byte offsets into the original wikitext.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tsr(pub usize, pub usize);

impl Tsr {
    /// The width of the range, in bytes.
    #[inline]
    pub fn len(self) -> usize {
        self.1.saturating_sub(self.0)
    }

    /// A zero-width range anchored at the end of this one.
    #[inline]
    pub fn end_point(self) -> Tsr {
        Tsr(self.1, self.1)
    }
}

/// The syntax variant a tag token was written in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Syntax {
    /// A literal HTML tag in the source text.
    Html,
    /// A wikitext construct that maps onto an HTML tag.
    Wikitext,
}

impl Syntax {
    /// The `data-parsoid` string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Syntax::Html => "html",
            Syntax::Wikitext => "wikitext",
        }
    }
}

/// Source-offset and provenance side data carried by tag tokens.
///
/// This is deliberately small; everything that survives into the DOM is
/// copied into the `data-parsoid` side-table by the tree builder.
#[derive(Clone, Debug, Default)]
pub struct DataAttribs {
    /// The source range of the token.
    pub tsr: Option<Tsr>,
    /// The syntax variant the token was written in.
    pub stx: Option<Syntax>,
    /// Open/close widths for wikitext constructs whose widths cannot be
    /// recovered from the tag name alone (e.g. headings).
    pub tag_widths: Option<(usize, usize)>,
    /// The token was re-emitted from foster-parented content.
    pub from_foster: bool,
    /// The token was produced by unwrapping wikitext that failed to parse
    /// as the construct it appeared to be.
    pub unwrapped_wt: bool,
    /// Serialized transclusion argument description. Only present on the
    /// start marker meta emitted by template expansion.
    pub tpl_arg_info: Option<TemplateArgInfo>,
    /// The raw source of the construct, when offsets alone cannot recover it
    /// (extension tags inside expanded templates).
    pub src: Option<String>,
}

impl DataAttribs {
    /// Convenience constructor for a token spanning `start..end`.
    pub fn spanning(start: usize, end: usize) -> Self {
        Self {
            tsr: Some(Tsr(start, end)),
            ..Self::default()
        }
    }
}

/// A tag attribute. Values are fully evaluated strings by the time the tree
/// builder sees them; in stage 2 they may still contain raw wikitext.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attr {
    /// The attribute name.
    pub name: String,
    /// The attribute value.
    pub value: String,
    /// The source offsets of the value, when it was present in the source.
    pub span: Option<Tsr>,
}

impl Attr {
    /// Creates a new attribute with no source offsets.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            span: None,
        }
    }
}

/// A description of one template argument, recorded for round-tripping.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TemplateParam {
    /// The parameter key (positional parameters use their ordinal).
    pub k: String,
    /// The raw wikitext of the value.
    pub v: String,
    /// Whether the parameter was written with an explicit `name=` part.
    pub named: bool,
    /// Source offsets of the key, when written explicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k_span: Option<Tsr>,
    /// Source offsets of the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_span: Option<Tsr>,
}

/// The target of a transclusion.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TemplateTarget {
    /// The raw wikitext of the target.
    pub wt: String,
    /// The resolved title link, when the target resolved to a known page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// The serialized argument description attached to a transclusion's start
/// marker meta, consumed by the encapsulation pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TemplateArgInfo {
    /// The transclusion target.
    pub target: TemplateTarget,
    /// The ordered argument list.
    pub params: Vec<TemplateParam>,
    /// The source span of the whole `{{…}}` call.
    pub span: Tsr,
}

/// A lexed wikitext item.
#[derive(Clone, Debug)]
pub enum Token {
    /// An opening tag.
    StartTag {
        /// The lowercase tag name.
        name: String,
        /// The tag attributes.
        attrs: Vec<Attr>,
        /// Source side data.
        da: DataAttribs,
    },
    /// A closing tag.
    EndTag {
        /// The lowercase tag name.
        name: String,
        /// Source side data.
        da: DataAttribs,
    },
    /// A self-closing (or void, or marker) tag.
    SelfClosing {
        /// The lowercase tag name.
        name: String,
        /// The tag attributes.
        attrs: Vec<Attr>,
        /// Source side data.
        da: DataAttribs,
    },
    /// An HTML comment.
    Comment {
        /// The comment interior, excluding the `<!--`/`-->` delimiters.
        text: String,
        /// Source side data.
        da: DataAttribs,
    },
    /// A context-sensitive newline.
    Newline {
        /// The source range of the newline.
        tsr: Option<Tsr>,
    },
    /// A run of plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// End of input. Exactly one per stream, always last.
    Eof,
}

impl Token {
    /// The tag name, for tag tokens.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::StartTag { name, .. }
            | Token::EndTag { name, .. }
            | Token::SelfClosing { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The side data, for tokens that carry it.
    pub fn da(&self) -> Option<&DataAttribs> {
        match self {
            Token::StartTag { da, .. }
            | Token::EndTag { da, .. }
            | Token::SelfClosing { da, .. }
            | Token::Comment { da, .. } => Some(da),
            _ => None,
        }
    }

    /// Mutable access to the side data, for tokens that carry it.
    pub fn da_mut(&mut self) -> Option<&mut DataAttribs> {
        match self {
            Token::StartTag { da, .. }
            | Token::EndTag { da, .. }
            | Token::SelfClosing { da, .. }
            | Token::Comment { da, .. } => Some(da),
            _ => None,
        }
    }

    /// The attribute list, for tokens that carry one.
    pub fn attrs(&self) -> &[Attr] {
        match self {
            Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } => attrs,
            _ => &[],
        }
    }

    /// Looks up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets an attribute, replacing an existing one of the same name.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        if let Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } = self {
            if let Some(attr) = attrs.iter_mut().find(|a| a.name == name) {
                attr.value = value.into();
            } else {
                attrs.push(Attr::new(name, value));
            }
        }
    }

    /// Creates a marker `<meta>` token with the given `typeof` and `about`.
    pub fn marker_meta(type_of: &str, about: &str, da: DataAttribs) -> Token {
        Token::SelfClosing {
            name: "meta".into(),
            attrs: vec![Attr::new("typeof", type_of), Attr::new("about", about)],
            da,
        }
    }

    /// True for text tokens that contain only inter-element whitespace.
    pub fn is_inter_element_ws(&self) -> bool {
        match self {
            Token::Text { text } => text.chars().all(|c| c.is_ascii_whitespace()),
            Token::Newline { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_roundtrip() {
        let mut t = Token::SelfClosing {
            name: "meta".into(),
            attrs: vec![Attr::new("typeof", "mw:Transclusion")],
            da: DataAttribs::default(),
        };
        assert_eq!(t.attr("typeof"), Some("mw:Transclusion"));
        t.set_attr("about", "#mwt1");
        t.set_attr("typeof", "mw:Param");
        assert_eq!(t.attr("about"), Some("#mwt1"));
        assert_eq!(t.attr("typeof"), Some("mw:Param"), "set should replace");
    }

    #[test]
    fn tsr_width() {
        assert_eq!(Tsr(2, 10).len(), 8);
        assert_eq!(Tsr(10, 10).len(), 0);
        assert_eq!(Tsr(3, 9).end_point(), Tsr(9, 9));
    }
}
