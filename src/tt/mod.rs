//! The token transform manager.
//!
//! Each pipeline runs three transform stages over the token stream. A stage
//! holds an ordered list of transformers; for every inbound token the manager
//! invokes the interested transformers in registration order. A transformer
//! may pass the token along (possibly modified), replace it with a list of
//! tokens that continue from the next transformer, or re-enqueue replacement
//! tokens through itself again (template expansion uses this to expand
//! transclusions surfaced by parameter substitution).
//!
//! Intra-stage ordering is authoritative; reordering transformers changes
//! output.

use crate::{
    common::Result,
    env::{Env, Frame},
    pipeline::PipelineOpts,
    tokens::Token,
};
use std::collections::VecDeque;

pub mod attrs;
pub mod behavior;
pub mod exttags;
pub mod includes;
pub mod langvar;
pub mod links;
pub mod lists;
pub mod paragraphs;
pub mod patcher;
pub mod pre;
pub mod quotes;
pub mod sanitizer;
pub mod templates;

/// What a transformer wants to see.
pub enum Interest {
    /// Every token.
    Any,
    /// Tag tokens with one of the given names.
    Tags(&'static [&'static str]),
    /// Only end-of-input (the [`TokenTransform::flush`] call).
    End,
}

/// The result of one transformer invocation.
pub enum TtOutput {
    /// Pass the token (possibly modified) to the next transformer.
    Keep(Token),
    /// Replace the token; the replacements continue from the next
    /// transformer. An empty list drops the token.
    Replace(Vec<Token>),
    /// Replace the token and feed the replacements back through this
    /// transformer as well.
    Reenqueue(Vec<Token>),
}

/// Shared context threaded through a stage.
pub struct TtCtx<'a> {
    /// The document environment.
    pub env: &'a mut Env,
    /// The transclusion frame this pipeline is expanding.
    pub frame: &'a Frame,
    /// The pipeline's option vector.
    pub opts: &'a PipelineOpts,
    /// The source text the stream's offsets refer to.
    pub source: &'a str,
}

/// A single token transformer.
pub trait TokenTransform {
    /// The tracing name.
    fn shortcut(&self) -> &'static str;

    /// The tokens this transformer wants to see.
    fn interest(&self) -> Interest;

    /// Transforms one token.
    fn transform(&mut self, token: Token, cx: &mut TtCtx<'_>) -> Result<TtOutput>;

    /// Flushes buffered state at end of input. The returned tokens are fed
    /// through the remaining transformers of the stage, ahead of `Eof`.
    fn flush(&mut self, cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        let _ = cx;
        Ok(Vec::new())
    }

    /// Clears state for pipeline reuse.
    fn reset(&mut self) {}
}

/// An ordered list of transformers making up one stage.
pub struct TransformManager {
    stage: u8,
    transforms: Vec<Box<dyn TokenTransform>>,
}

impl TransformManager {
    /// Creates an empty stage.
    pub fn new(stage: u8) -> Self {
        Self {
            stage,
            transforms: Vec::new(),
        }
    }

    /// Appends a transformer. Order of addition is execution order.
    pub fn add(&mut self, transform: Box<dyn TokenTransform>) {
        self.transforms.push(transform);
    }

    /// Resets all transformers for pipeline reuse.
    pub fn reset(&mut self) {
        for t in &mut self.transforms {
            t.reset();
        }
    }

    fn interested(&self, index: usize, token: &Token) -> bool {
        match self.transforms[index].interest() {
            Interest::Any => true,
            Interest::Tags(names) => token.name().is_some_and(|n| names.contains(&n)),
            Interest::End => false,
        }
    }

    /// Runs the stage over a token stream.
    pub fn process(&mut self, input: Vec<Token>, cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        log::trace!(target: "tt", "stage {} processing {} tokens", self.stage, input.len());

        let mut queue: VecDeque<(Token, usize)> = input.into_iter().map(|t| (t, 0)).collect();
        let mut out = Vec::new();

        'queue: while let Some((mut token, rank)) = queue.pop_front() {
            let mut index = rank;
            while index < self.transforms.len() {
                if matches!(token, Token::Eof) {
                    // End of input: give the transformer a chance to flush
                    // buffered state. Flushed tokens run through the rest of
                    // the stage ahead of the Eof itself.
                    let flushed = self.transforms[index].flush(cx)?;
                    if flushed.is_empty() {
                        index += 1;
                        continue;
                    }
                    queue.push_front((token, index + 1));
                    for t in flushed.into_iter().rev() {
                        queue.push_front((t, index + 1));
                    }
                    continue 'queue;
                }

                if !self.interested(index, &token) {
                    index += 1;
                    continue;
                }

                match self.transforms[index].transform(token, cx)? {
                    TtOutput::Keep(t) => {
                        token = t;
                        index += 1;
                    }
                    TtOutput::Replace(ts) => {
                        for t in ts.into_iter().rev() {
                            queue.push_front((t, index + 1));
                        }
                        continue 'queue;
                    }
                    TtOutput::Reenqueue(ts) => {
                        for t in ts.into_iter().rev() {
                            queue.push_front((t, index));
                        }
                        continue 'queue;
                    }
                }
            }
            out.push(token);
        }

        Ok(out)
    }
}

/// Flattens a token list to its plain text content. Used by attribute
/// expansion, heading anchors, and extension option normalization.
pub fn tokens_to_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        match t {
            Token::Text { text } => out.push_str(text),
            Token::Newline { .. } => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Clears source offsets from a token list. Tokens produced by expanding a
/// template body carry offsets into the template's own source; those must not
/// leak into the host document's DSR computation.
pub fn strip_tsr(tokens: &mut [Token]) {
    for t in tokens {
        match t {
            Token::Newline { tsr } => *tsr = None,
            _ => {
                if let Some(da) = t.da_mut() {
                    da.tsr = None;
                }
                if let Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } = t {
                    for a in attrs {
                        a.span = None;
                    }
                }
            }
        }
    }
}

/// Shifts source offsets by a constant. Used when a captured argument is
/// re-tokenized: the sub-tokenizer's offsets are relative to the argument,
/// which itself sits at a known offset of the host source.
pub fn shift_tsr(tokens: &mut [Token], delta: usize) {
    for t in tokens {
        match t {
            Token::Newline { tsr: Some(tsr) } => {
                tsr.0 += delta;
                tsr.1 += delta;
            }
            _ => {
                if let Some(da) = t.da_mut() {
                    if let Some(tsr) = &mut da.tsr {
                        tsr.0 += delta;
                        tsr.1 += delta;
                    }
                }
                if let Token::StartTag { attrs, .. } | Token::SelfClosing { attrs, .. } = t {
                    for a in attrs {
                        if let Some(span) = &mut a.span {
                            span.0 += delta;
                            span.1 += delta;
                        }
                    }
                }
            }
        }
    }
}
