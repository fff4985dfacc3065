//! Site and wiki configuration.
//!
//! Wikitext documents are not self-encapsulated and cannot be parsed without
//! knowing the hosting wiki's registered extension tags, namespaces, link
//! trail rules, and language-variant setup. [`SiteConfig`] carries the
//! runtime-configurable parts; tables that never vary between wikis (the HTML
//! allowlist, void tags, …) are static.

use crate::{
    common::Result,
    dom::{Document, NodeId},
    env::Env,
};
use regex::Regex;
use std::{collections::BTreeMap, sync::LazyLock};

/// HTML5 tags that are allowed to appear literally in wikitext.
pub static HTML5_TAGS: phf::Set<&str> = phf::phf_set! {
    "a", "abbr", "b", "bdi", "bdo", "big", "blockquote", "br", "caption",
    "center", "cite", "code", "data", "dd", "del", "dfn", "div", "dl", "dt",
    "em", "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "ins", "kbd",
    "li", "link", "mark", "meta", "ol", "p", "pre", "q", "rb", "rp", "rt",
    "rtc", "ruby", "s", "samp", "small", "span", "strike", "strong", "sub",
    "sup", "table", "td", "th", "time", "tr", "tt", "u", "ul", "var", "wbr",
};

/// Void HTML5 tags.
pub static VOID_TAGS: phf::Set<&str> = phf::phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img",
    "input", "link", "meta", "param", "source",
    "track", "wbr",
};

/// Tags that terminate an open paragraph.
pub static BLOCK_TAGS: phf::Set<&str> = phf::phf_set! {
    "blockquote", "caption", "center", "dd", "div", "dl", "dt", "figure",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "ol", "p", "pre",
    "section", "table", "tbody", "td", "th", "tr", "ul",
};

/// Tags with restricted allowable children. Anything else trying to nest
/// under these is implicitly closed or foster-parented.
pub static PARENTS: phf::Map<&str, &[&str]> = phf::phf_map! {
    "table" => &["caption", "colgroup", "tbody", "tr"],
    "tbody" => &["tr"],
    "tr" => &["td", "th"],
    "dl" => &["dd", "dt"],
    "ol" => &["li"],
    "ul" => &["li"],
};

/// Words that can appear between `__` and `__`.
pub static BEHAVIOR_SWITCHES: phf::Set<&str> = phf::phf_set! {
    "toc", "notoc", "forcetoc", "noeditsection", "newsectionlink",
    "nonewsectionlink", "nogallery", "hiddencat", "index", "noindex",
    "staticredirect", "notitleconvert", "nocontentconvert",
};

/// Protocols that can start an external link.
pub static PROTOCOLS: phf::Set<&str> = phf::phf_set! {
    "http://", "https://", "ftp://", "ftps://", "mailto:", "news:",
    "irc://", "ircs://", "gopher://", "ssh://", "telnet://", "//",
};

/// The fixed pattern matching transclusion marker meta types.
pub static TPL_META_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^mw:(Transclusion|Param)(/\S+)?$").unwrap());

/// A title namespace.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Namespace {
    /// The numeric namespace id.
    pub id: i32,
    /// The canonical (English) namespace name.
    pub name: &'static str,
}

impl Namespace {
    /// The template namespace id.
    pub const TEMPLATE: i32 = 10;
    /// The category namespace id.
    pub const CATEGORY: i32 = 14;
    /// The file namespace id.
    pub const FILE: i32 = 6;
}

/// The default namespace table.
pub static NAMESPACES: &[Namespace] = &[
    Namespace { id: 0, name: "" },
    Namespace { id: 6, name: "File" },
    Namespace { id: 10, name: "Template" },
    Namespace { id: 14, name: "Category" },
    Namespace { id: 828, name: "Module" },
];

/// Options controlling how a native extension's output fragment is spliced
/// into the host document.
#[derive(Clone, Copy, Debug, Default)]
pub struct FragmentOptions {
    /// Unwrap the fragment body instead of keeping a single wrapper node.
    pub unwrap: bool,
}

/// One normalized extension tag invocation.
#[derive(Clone, Debug)]
pub struct ExtensionCall {
    /// The lowercase tag name.
    pub name: String,
    /// Normalized options: whitespace collapsed, entities decoded, empty
    /// options dropped.
    pub options: Vec<(String, String)>,
    /// The raw inner content, when the tag was not self-closing.
    pub body: Option<String>,
    /// The raw source of the whole tag, when recoverable.
    pub src: Option<String>,
}

/// A registered native extension tag implementation.
pub struct NativeExtension {
    /// Builds the extension output as a DOM subtree. Returning `None` defers
    /// to a wikitext re-parse of the inner content.
    pub to_dom: fn(&mut Env, &ExtensionCall) -> Result<Option<Document>>,
    /// Rewrites the serialized argument dict before it lands in `data-mw`.
    pub modify_arg_dict: Option<fn(&mut serde_json::Value)>,
    /// Fragment splicing options.
    pub fragment_options: FragmentOptions,
    /// A DOM post-processor run over the document after fragment unpacking.
    pub dom_post_processor: Option<fn(&mut Document, NodeId, &mut Env) -> Result<()>>,
    /// Free-form extension configuration.
    pub config: serde_json::Value,
}

/// The native extension registry.
///
/// Extension post-processors run in registration order, which for this map is
/// the lexicographic order of tag names; the order is deterministic and
/// extensions are expected to be order-independent.
#[derive(Default)]
pub struct ExtensionRegistry {
    tags: BTreeMap<String, NativeExtension>,
}

impl ExtensionRegistry {
    /// Registers a native implementation for a tag name.
    pub fn register(&mut self, name: &str, ext: NativeExtension) {
        self.tags.insert(name.to_ascii_lowercase(), ext);
    }

    /// Looks up a native implementation.
    pub fn get(&self, name: &str) -> Option<&NativeExtension> {
        self.tags.get(name)
    }

    /// True when the tag name is a registered extension tag.
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Iterates registered implementations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeExtension)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A language-variant replacement machine. Supplied by the site config; the
/// converter pass only drives it.
pub trait VariantMachine {
    /// The variant codes this machine can produce.
    fn variants(&self) -> &[String];

    /// Transliterates a text run into the target variant. `None` means the
    /// run is already in the target variant.
    fn transliterate(&self, text: &str, to: &str) -> Option<String>;

    /// Whether a conversion between the given variants can be inverted
    /// without information loss. Non-reversible conversions preserve their
    /// input for round-trip.
    fn reversible(&self, _from: &str, _to: &str) -> bool {
        true
    }

    /// Guesses the variant a text run was written in.
    fn source_variant(&self, _text: &str, page_language: &str) -> String {
        page_language.to_string()
    }
}

/// Site specific configuration of a wiki.
pub struct SiteConfig {
    /// The server's base URI, used for building hrefs.
    pub base_uri: String,
    /// The wiki's main page title.
    pub main_page: String,
    /// A compiled pattern matching link trails (text after `]]` that is
    /// pulled into the link).
    pub link_trail: Regex,
    /// A compiled pattern matching link prefixes, for languages that use
    /// them.
    pub link_prefix: Option<Regex>,
    /// Registered title namespaces.
    pub namespaces: &'static [Namespace],
    /// Registered interwiki prefixes.
    pub interwiki: Vec<String>,
    /// The native extension registry.
    pub extensions: ExtensionRegistry,
    /// Site-wide modules loaded by every page.
    pub modules: Vec<String>,
    /// Site-wide style modules loaded by every page.
    pub module_styles: Vec<String>,
    /// The language-variant replacement machine, when conversion is enabled.
    pub variant_machine: Option<Box<dyn VariantMachine>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_uri: "https://localhost/wiki".to_string(),
            main_page: "Main Page".to_string(),
            link_trail: Regex::new(r"^[a-z]+").unwrap(),
            link_prefix: None,
            namespaces: NAMESPACES,
            interwiki: Vec::new(),
            extensions: crate::tt::exttags::default_registry(),
            modules: vec!["site".to_string()],
            module_styles: vec!["site.styles".to_string()],
            variant_machine: None,
        }
    }
}

impl SiteConfig {
    /// Splits a title into its namespace and remainder, when the prefix
    /// matches a registered namespace.
    pub fn split_namespace<'t>(&self, title: &'t str) -> Option<(&Namespace, &'t str)> {
        let (prefix, rest) = title.split_once(':')?;
        let prefix = prefix.trim();
        self.namespaces
            .iter()
            .find(|ns| !ns.name.is_empty() && ns.name.eq_ignore_ascii_case(prefix))
            .map(|ns| (ns, rest.trim_start()))
    }

    /// Normalizes a page title: underscores become spaces, surrounding
    /// whitespace is trimmed, and the first letter is capitalized.
    pub fn normalize_title(&self, title: &str) -> String {
        let cleaned = title.replace('_', " ");
        let cleaned = cleaned.trim();
        let mut chars = cleaned.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    /// Resolves a transclusion target to a full title. Bare names land in
    /// the template namespace; a leading `:` escapes to the main namespace.
    pub fn template_title(&self, target: &str) -> String {
        let target = target.trim();
        if let Some(rest) = target.strip_prefix(':') {
            self.normalize_title(rest)
        } else if self.split_namespace(target).is_some() {
            self.normalize_title(target)
        } else {
            format!("Template:{}", self.normalize_title(target))
        }
    }

    /// Builds a local href for a title.
    pub fn href_for(&self, title: &str) -> String {
        format!("./{}", crate::common::url_encode(&title.replace(' ', "_")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_title_resolution() {
        let cfg = SiteConfig::default();
        assert_eq!(cfg.template_title("echo"), "Template:Echo");
        assert_eq!(cfg.template_title(" echo "), "Template:Echo");
        assert_eq!(cfg.template_title(":echo"), "Echo", "leading colon escapes");
        assert_eq!(cfg.template_title("Template:Echo"), "Template:Echo");
        assert_eq!(cfg.template_title("Category:Foo"), "Category:Foo");
    }

    #[test]
    fn meta_type_pattern() {
        assert!(TPL_META_TYPE.is_match("mw:Transclusion"));
        assert!(TPL_META_TYPE.is_match("mw:Transclusion/End"));
        assert!(TPL_META_TYPE.is_match("mw:Param"));
        assert!(!TPL_META_TYPE.is_match("mw:Image"));
        assert!(!TPL_META_TYPE.is_match("xmw:Transclusion"));
    }
}
