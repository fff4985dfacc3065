//! The per-document environment.
//!
//! One [`Env`] owns everything a single document's pipeline run needs: the
//! page being parsed, the site configuration, the data-access collaborator,
//! the pipeline cache, and the per-document counters. Independent documents
//! get independent environments; nothing here is shared across documents.

use crate::{
    common::Result,
    config::SiteConfig,
    dom::Document,
    pipeline::PipelineCache,
};
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

/// Maximum template call depth before expansion is refused.
const MAX_FRAME_DEPTH: u32 = 40;

/// Page text direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Dir {
    /// Left to right.
    #[default]
    Ltr,
    /// Right to left.
    Rtl,
}

impl Dir {
    /// The HTML attribute value.
    pub fn as_str(self) -> &'static str {
        match self {
            Dir::Ltr => "ltr",
            Dir::Rtl => "rtl",
        }
    }
}

/// The page under transformation.
#[derive(Clone, Debug)]
pub struct PageConfig {
    /// The page title.
    pub title: String,
    /// The revision id, when parsing a stored revision.
    pub revision_id: Option<u64>,
    /// The page content language.
    pub page_language: String,
    /// The page text direction.
    pub dir: Dir,
    /// The wikitext source.
    pub source: String,
}

impl PageConfig {
    /// Creates a page config with default language settings.
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            revision_id: None,
            page_language: "en".to_string(),
            dir: Dir::Ltr,
            source: source.into(),
        }
    }
}

/// The output of parsing wikitext through the wiki's own parser. Used for
/// extension tags with no native implementation.
#[derive(Clone, Debug, Default)]
pub struct ParsedExtensionOutput {
    /// The rendered HTML.
    pub html: String,
    /// Modules the rendering depends on.
    pub modules: Vec<String>,
    /// Style modules the rendering depends on.
    pub module_styles: Vec<String>,
    /// Script modules the rendering depends on.
    pub module_scripts: Vec<String>,
    /// Categories the rendering added.
    pub categories: Vec<String>,
}

/// Metadata for one media file.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    /// Intrinsic width in pixels.
    pub width: u32,
    /// Intrinsic height in pixels.
    pub height: u32,
    /// The media MIME type.
    pub mime: String,
    /// The resolved file URL.
    pub url: String,
}

/// The data-access collaborator: everything the pipeline fetches from the
/// hosting wiki. Calls are synchronous; the pipeline runs a document
/// end-to-end on one thread.
pub trait DataAccess {
    /// Fetches the wikitext source of a template page.
    fn template_source(&self, title: &str) -> Option<String>;

    /// Parses wikitext through the wiki's parser. Used as the fallback for
    /// extension tags without a native implementation.
    fn parse_wikitext(&self, page: &PageConfig, source: &str) -> Result<ParsedExtensionOutput>;

    /// Batch-fetches media metadata.
    fn media_info(&self, titles: &[String]) -> HashMap<String, MediaInfo>;

    /// Batch-checks page existence. Used by red-link annotation.
    fn pages_exist(&self, titles: &[String]) -> HashMap<String, bool>;
}

/// A self-contained data access backed by in-memory maps. The CLI and the
/// test suite use this.
#[derive(Default)]
pub struct InMemoryDataAccess {
    templates: HashMap<String, String>,
    media: HashMap<String, MediaInfo>,
    pages: HashSet<String>,
}

impl InMemoryDataAccess {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template's source text.
    pub fn add_template(&mut self, title: impl Into<String>, source: impl Into<String>) {
        let title = title.into();
        self.pages.insert(title.clone());
        self.templates.insert(title, source.into());
    }

    /// Registers media metadata for a file title.
    pub fn add_media(&mut self, title: impl Into<String>, info: MediaInfo) {
        let title = title.into();
        self.pages.insert(title.clone());
        self.media.insert(title, info);
    }

    /// Registers a page as existing.
    pub fn add_page(&mut self, title: impl Into<String>) {
        self.pages.insert(title.into());
    }
}

impl DataAccess for InMemoryDataAccess {
    fn template_source(&self, title: &str) -> Option<String> {
        self.templates.get(title).cloned()
    }

    fn parse_wikitext(&self, _page: &PageConfig, source: &str) -> Result<ParsedExtensionOutput> {
        // Best-effort rendering for unknown extension tags: the content is
        // shown verbatim.
        Ok(ParsedExtensionOutput {
            html: html_escape::encode_text(source).into_owned(),
            ..ParsedExtensionOutput::default()
        })
    }

    fn media_info(&self, titles: &[String]) -> HashMap<String, MediaInfo> {
        titles
            .iter()
            .filter_map(|t| self.media.get(t).map(|i| (t.clone(), i.clone())))
            .collect()
    }

    fn pages_exist(&self, titles: &[String]) -> HashMap<String, bool> {
        titles
            .iter()
            .map(|t| (t.clone(), self.pages.contains(t)))
            .collect()
    }
}

/// Behaviour options for one document run.
#[derive(Clone, Debug)]
pub struct EnvOptions {
    /// Wrap heading-delimited sections in `<section>` elements.
    pub wrap_sections: bool,
    /// Normalize wikitext while serializing (affects round-trip tolerance).
    pub scrub_wikitext: bool,
    /// Annotate links to missing pages.
    pub red_links: bool,
    /// The target language variant, when conversion was requested.
    pub variant_target: Option<String>,
    /// Post-process pass shortcuts whose pre/post DOM should be dumped.
    pub dump: HashSet<String>,
    /// The output content version advertised in the head.
    pub content_version: String,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            wrap_sections: true,
            scrub_wikitext: false,
            red_links: false,
            variant_target: None,
            dump: HashSet::new(),
            content_version: "2.8.0".to_string(),
        }
    }
}

/// Page properties accumulated while parsing.
#[derive(Debug, Default)]
pub struct PageProps {
    /// `__NOTOC__` was seen.
    pub no_toc: bool,
    /// `__FORCETOC__` was seen.
    pub force_toc: bool,
    /// `__NOEDITSECTION__` was seen.
    pub no_edit_section: bool,
    /// `__NOCONTENTCONVERT__` was seen.
    pub no_content_convert: bool,
    /// `__NOTITLECONVERT__` was seen.
    pub no_title_convert: bool,
    /// Categories collected from category links.
    pub categories: Vec<String>,
    /// The redirect target, when the page is a redirect.
    pub redirect: Option<String>,
    /// Modules requested by extension output.
    pub modules: Vec<String>,
    /// Style modules requested by extension output.
    pub module_styles: Vec<String>,
}

/// The per-document environment.
pub struct Env {
    /// The site configuration.
    pub site: SiteConfig,
    /// The page under transformation.
    pub page: PageConfig,
    /// The data-access collaborator.
    pub data_access: Box<dyn DataAccess>,
    /// Run options.
    pub options: EnvOptions,
    /// Accumulated page properties.
    pub props: PageProps,
    /// The pipeline pool.
    pub cache: PipelineCache,
    /// DOM fragments built by extension handlers, waiting to be spliced in
    /// by the unpack pass. Keyed by fragment id.
    pub fragments: HashMap<String, Document>,
    about_counter: u32,
    fragment_counter: u32,
}

impl Env {
    /// Creates an environment for one document.
    pub fn new(site: SiteConfig, page: PageConfig, data_access: Box<dyn DataAccess>) -> Self {
        Self {
            site,
            page,
            data_access,
            options: EnvOptions::default(),
            props: PageProps::default(),
            cache: PipelineCache::new(),
            fragments: HashMap::new(),
            about_counter: 0,
            fragment_counter: 0,
        }
    }

    /// Hands out the next document-unique about id (`#mwt<n>`).
    pub fn new_about_id(&mut self) -> String {
        self.about_counter += 1;
        format!("#mwt{}", self.about_counter)
    }

    /// Stores a built DOM fragment, returning its id.
    pub fn store_fragment(&mut self, frag: Document) -> String {
        self.fragment_counter += 1;
        let id = format!("mwf{}", self.fragment_counter);
        self.fragments.insert(id.clone(), frag);
        id
    }

    /// Removes and returns a stored fragment.
    pub fn take_fragment(&mut self, id: &str) -> Option<Document> {
        self.fragments.remove(id)
    }
}

/// One transclusion context: the title being expanded and the arguments it
/// was called with. Frames chain to their caller for loop detection.
#[derive(Clone)]
pub struct Frame {
    inner: Rc<FrameInner>,
}

struct FrameInner {
    title: String,
    args: HashMap<String, String>,
    depth: u32,
    parent: Option<Frame>,
}

impl Frame {
    /// The root frame for the page itself.
    pub fn root(title: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(FrameInner {
                title: title.into(),
                args: HashMap::new(),
                depth: 0,
                parent: None,
            }),
        }
    }

    /// Chains a child frame for a template call. Fails on recursion into a
    /// title already on the stack and on stack overflow.
    ///
    /// Recursion back to the root page is deliberately allowed: documentation
    /// templates demonstrate their own output from their own page.
    pub fn push(&self, title: impl Into<String>, args: HashMap<String, String>) -> Result<Self, FrameError> {
        let title = title.into();
        if self.inner.depth + 1 > MAX_FRAME_DEPTH {
            return Err(FrameError::Overflow(title));
        }
        let mut cur = Some(self);
        while let Some(frame) = cur {
            if frame.inner.depth > 0 && frame.inner.title == title {
                return Err(FrameError::Loop(title));
            }
            cur = frame.inner.parent.as_ref();
        }
        Ok(Self {
            inner: Rc::new(FrameInner {
                title,
                args,
                depth: self.inner.depth + 1,
                parent: Some(self.clone()),
            }),
        })
    }

    /// The title this frame is expanding.
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    /// Looks up an argument by name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.inner.args.get(name).map(String::as_str)
    }

    /// True inside a template expansion.
    pub fn in_template(&self) -> bool {
        self.inner.depth > 0
    }
}

/// A template call stack violation.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A template called back into itself.
    #[error("template loop detected: {0}")]
    Loop(String),

    /// Too many nested template calls.
    #[error("template stack overflow: {0}")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_loop_detection() {
        let root = Frame::root("Page");
        let a = root.push("Template:A", HashMap::new()).unwrap();
        let b = a.push("Template:B", HashMap::new()).unwrap();
        assert!(matches!(
            b.push("Template:A", HashMap::new()),
            Err(FrameError::Loop(_))
        ));
        // Back to the root page is allowed.
        assert!(b.push("Page", HashMap::new()).is_ok());
    }

    #[test]
    fn about_ids_are_sequential() {
        let mut env = Env::new(
            SiteConfig::default(),
            PageConfig::new("T", ""),
            Box::new(InMemoryDataAccess::new()),
        );
        assert_eq!(env.new_about_id(), "#mwt1");
        assert_eq!(env.new_about_id(), "#mwt2");
    }
}
