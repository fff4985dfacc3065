//! Pipeline assembly and the per-document pipeline pool.
//!
//! A pipeline is the tokenizer plus the three transform stages. Template and
//! extension expansion create nested pipelines constantly, so instances are
//! pooled per option vector: checked out, reset, and returned. Every checkout
//! gets a fresh monotonically increasing pipeline id for tracing.

use crate::{
    common::Result,
    dom::Document,
    env::{Env, Frame},
    tokens::Token,
    tokenizer::Tokenizer,
    tt::{self, TransformManager, TtCtx},
};
use schnellru::{ByLength, LruMap};
use serde::Serialize;

/// The ceiling on pooled pipelines per option vector.
const POOL_CAP: usize = 100;

/// The option vector a pipeline is specialized (and cached) on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PipelineOpts {
    /// Parse in transclusion (include) mode.
    pub is_include: bool,
    /// Expand transclusions. Disabled for raw-text contexts.
    pub expand_templates: bool,
    /// Inline context: paragraph wrapping is suppressed.
    pub inline_context: bool,
    /// Inside a PHP-emulated block context.
    pub in_php_block: bool,
    /// Inside a template expansion.
    pub in_template: bool,
    /// An attribute-expansion pipeline.
    pub attr_expansion: bool,
    /// The extension tag whose body this pipeline expands.
    pub ext_tag: Option<String>,
    /// Free-form extension pipeline options, part of the cache key.
    pub ext_tag_opts: Option<serde_json::Value>,
}

impl PipelineOpts {
    /// Options for the top-level document pipeline.
    pub fn top_level() -> Self {
        Self { expand_templates: true, ..Self::default() }
    }

    /// Options for a template-body pipeline.
    pub fn for_template() -> Self {
        Self {
            is_include: true,
            expand_templates: true,
            in_template: true,
            ..Self::default()
        }
    }

    /// The cache key: the serialized option vector.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).expect("options are always serializable")
    }
}

/// One assembled pipeline.
pub struct Pipeline {
    /// The tracing id, refreshed on every checkout.
    pub id: u32,
    /// The option vector this pipeline was built for.
    pub opts: PipelineOpts,
    stage1: TransformManager,
    stage2: TransformManager,
    stage3: TransformManager,
}

impl Pipeline {
    fn build(opts: PipelineOpts, id: u32) -> Self {
        let mut stage1 = TransformManager::new(1);
        stage1.add(Box::new(tt::includes::IncludeDirectives::new()));

        let mut stage2 = TransformManager::new(2);
        stage2.add(Box::new(tt::templates::TemplateHandler::new()));
        stage2.add(Box::new(tt::exttags::ExtensionHandler::new()));
        stage2.add(Box::new(tt::attrs::AttributeExpander::new()));
        stage2.add(Box::new(tt::links::WikiLinkHandler::new()));
        stage2.add(Box::new(tt::links::ExternalLinkHandler::new()));
        stage2.add(Box::new(tt::langvar::LanguageVariantHandler::new()));

        let mut stage3 = TransformManager::new(3);
        stage3.add(Box::new(tt::patcher::TokenStreamPatcher::new()));
        stage3.add(Box::new(tt::pre::PreHandler::new()));
        stage3.add(Box::new(tt::quotes::QuoteTransformer::new()));
        stage3.add(Box::new(tt::behavior::BehaviorSwitchHandler::new()));
        stage3.add(Box::new(tt::lists::ListHandler::new()));
        stage3.add(Box::new(tt::sanitizer::Sanitizer::new()));
        stage3.add(Box::new(tt::paragraphs::ParagraphWrapper::new()));

        Self { id, opts, stage1, stage2, stage3 }
    }

    /// Clears all transformer state for reuse.
    pub fn reset(&mut self) {
        self.stage1.reset();
        self.stage2.reset();
        self.stage3.reset();
    }

    /// Runs tokenization and stages 1–2. This is the expansion surface used
    /// by nested pipelines: the caller re-integrates the returned tokens
    /// into its own stream.
    pub fn tokens_for(&mut self, env: &mut Env, frame: &Frame, source: &str) -> Result<Vec<Token>> {
        log::trace!(target: "pipeline", "pipeline {} expanding {} bytes", self.id, source.len());
        let tokens = Tokenizer::new(&env.site).tokenize(source)?;
        let opts = self.opts.clone();
        let mut cx = TtCtx { env, frame, opts: &opts, source };
        let tokens = self.stage1.process(tokens, &mut cx)?;
        let mut tokens = self.stage2.process(tokens, &mut cx)?;
        tokens.pop_if(|t| matches!(t, Token::Eof));
        Ok(tokens)
    }

    /// Runs tokenization and all three stages, keeping the trailing `Eof`.
    pub fn tokens_full(&mut self, env: &mut Env, frame: &Frame, source: &str) -> Result<Vec<Token>> {
        let tokens = Tokenizer::new(&env.site).tokenize(source)?;
        let opts = self.opts.clone();
        let mut cx = TtCtx { env, frame, opts: &opts, source };
        let tokens = self.stage1.process(tokens, &mut cx)?;
        let tokens = self.stage2.process(tokens, &mut cx)?;
        self.stage3.process(tokens, &mut cx)
    }
}

/// The per-document pipeline pool, keyed by option vector.
pub struct PipelineCache {
    pools: LruMap<String, Vec<Pipeline>, ByLength>,
    next_id: u32,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineCache {
    /// Creates an empty pool set.
    pub fn new() -> Self {
        Self { pools: LruMap::new(ByLength::new(64)), next_id: 0 }
    }

    /// Checks a pipeline out of the pool, building one if none is cached.
    pub fn checkout(&mut self, opts: &PipelineOpts) -> Pipeline {
        self.next_id += 1;
        let id = self.next_id;
        if let Some(pool) = self.pools.get(&opts.cache_key()) {
            if let Some(mut pipe) = pool.pop() {
                pipe.reset();
                pipe.id = id;
                return pipe;
            }
        }
        Pipeline::build(opts.clone(), id)
    }

    /// Returns a pipeline to its pool. Full pools drop the instance.
    pub fn give_back(&mut self, pipeline: Pipeline) {
        let key = pipeline.opts.cache_key();
        if let Some(pool) = self.pools.get(&key) {
            if pool.len() < POOL_CAP {
                pool.push(pipeline);
            }
            return;
        }
        self.pools.insert(key, vec![pipeline]);
    }
}

/// A leading redirect directive.
static REDIRECT: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"(?i)^[ \t]*#redirect[ \t]*:?[ \t\r\n]*\[\[([^\]|]+)").unwrap()
});

/// Runs the whole wikitext→DOM transformation for the environment's page.
pub fn parse_document(env: &mut Env) -> Result<Document> {
    if let Some(captures) = REDIRECT.captures(&env.page.source) {
        let target = env.site.normalize_title(&captures[1]);
        env.props.redirect = Some(target);
    }

    let opts = PipelineOpts::top_level();
    let mut pipe = env.cache.checkout(&opts);
    let frame = Frame::root(env.page.title.clone());
    let source = env.page.source.clone();
    let tokens = pipe.tokens_full(env, &frame, &source);
    env.cache.give_back(pipe);

    let mut doc = crate::treebuilder::build(tokens?)?;
    crate::pp::run(&mut doc, env, true)?;
    Ok(doc)
}

/// Parses a wikitext fragment into its own document, running the nested
/// subset of post-processing. Used for extension bodies that want a fully
/// built sub-DOM.
pub fn parse_fragment(env: &mut Env, frame: &Frame, source: &str, opts: &PipelineOpts) -> Result<Document> {
    let mut pipe = env.cache.checkout(opts);
    let tokens = pipe.tokens_full(env, frame, source);
    env.cache.give_back(pipe);

    let mut doc = crate::treebuilder::build(tokens?)?;
    crate::pp::run(&mut doc, env, false)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_distinguishes_options() {
        assert_ne!(
            PipelineOpts::top_level().cache_key(),
            PipelineOpts::for_template().cache_key()
        );
        assert_eq!(
            PipelineOpts::for_template().cache_key(),
            PipelineOpts::for_template().cache_key()
        );
    }

    #[test]
    fn checkout_ids_increase() {
        let mut cache = PipelineCache::new();
        let a = cache.checkout(&PipelineOpts::top_level());
        let first = a.id;
        cache.give_back(a);
        let b = cache.checkout(&PipelineOpts::top_level());
        assert!(b.id > first, "reused pipelines get fresh ids");
    }
}
