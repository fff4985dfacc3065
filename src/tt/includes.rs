//! Stage 1: inclusion-control directives.
//!
//! `<onlyinclude>` changes the meaning of the entire stream (everything
//! outside it behaves as if wrapped in `<noinclude>`), so this transformer
//! buffers the stage and resolves visibility at end of input rather than
//! trying to stream.

use super::{Interest, TokenTransform, TtCtx, TtOutput};
use crate::{
    common::Result,
    tokens::{DataAttribs, Token},
};

/// Which inclusion-control tag a region belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    IncludeOnly,
    NoInclude,
    OnlyInclude,
}

impl Mode {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "includeonly" => Some(Mode::IncludeOnly),
            "noinclude" => Some(Mode::NoInclude),
            "onlyinclude" => Some(Mode::OnlyInclude),
            _ => None,
        }
    }

    fn meta_type(self) -> &'static str {
        match self {
            Mode::IncludeOnly => "mw:Includes/IncludeOnly",
            Mode::NoInclude => "mw:Includes/NoInclude",
            Mode::OnlyInclude => "mw:Includes/OnlyInclude",
        }
    }
}

/// The stage 1 transformer.
pub struct IncludeDirectives {
    buf: Vec<Token>,
}

impl IncludeDirectives {
    /// Creates the transformer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl TokenTransform for IncludeDirectives {
    fn shortcut(&self) -> &'static str {
        "includes"
    }

    fn interest(&self) -> Interest {
        Interest::Any
    }

    fn transform(&mut self, token: Token, _cx: &mut TtCtx<'_>) -> Result<TtOutput> {
        self.buf.push(token);
        Ok(TtOutput::Replace(Vec::new()))
    }

    fn flush(&mut self, cx: &mut TtCtx<'_>) -> Result<Vec<Token>> {
        let buf = std::mem::take(&mut self.buf);
        let including = cx.opts.is_include;
        let has_onlyinclude = including
            && buf.iter().any(|t| {
                matches!(t, Token::StartTag { name, .. } if name == "onlyinclude")
            });

        let mut stack: Vec<Mode> = Vec::new();
        let mut out = Vec::with_capacity(buf.len());
        for token in buf {
            if let Some(mode) = token.name().and_then(Mode::from_name) {
                let is_end = matches!(token, Token::EndTag { .. });
                let visible = region_visible(&stack, including, has_onlyinclude);
                if is_end {
                    if stack.last() == Some(&mode) {
                        stack.pop();
                    }
                } else {
                    stack.push(mode);
                }
                // The tag itself renders as a placeholder meta wherever the
                // surrounding content is visible.
                if visible || region_visible(&stack, including, has_onlyinclude) {
                    let tsr = token.da().and_then(|da| da.tsr);
                    let type_of = if is_end {
                        format!("{}/End", mode.meta_type())
                    } else {
                        mode.meta_type().to_string()
                    };
                    out.push(Token::SelfClosing {
                        name: "meta".into(),
                        attrs: vec![crate::tokens::Attr::new("typeof", type_of)],
                        da: DataAttribs { tsr, ..DataAttribs::default() },
                    });
                }
                continue;
            }

            if region_visible(&stack, including, has_onlyinclude) {
                out.push(token);
            }
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

/// Whether content inside the given region stack is visible for the current
/// processing mode.
fn region_visible(stack: &[Mode], including: bool, has_onlyinclude: bool) -> bool {
    let in_onlyinclude = stack.contains(&Mode::OnlyInclude);
    if has_onlyinclude && !in_onlyinclude {
        return false;
    }
    stack.iter().all(|mode| match mode {
        Mode::IncludeOnly => including,
        Mode::NoInclude => !including,
        Mode::OnlyInclude => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_rules() {
        // Top-level page view.
        assert!(region_visible(&[], false, false));
        assert!(!region_visible(&[Mode::IncludeOnly], false, false));
        assert!(region_visible(&[Mode::NoInclude], false, false));
        // Transcluded view.
        assert!(region_visible(&[Mode::IncludeOnly], true, false));
        assert!(!region_visible(&[Mode::NoInclude], true, false));
        // Transcluded view with an <onlyinclude> present anywhere.
        assert!(!region_visible(&[], true, true));
        assert!(region_visible(&[Mode::OnlyInclude], true, true));
    }
}
