//! The DOM post-processing pipeline.
//!
//! An ordered sequence of passes run over the built DOM. Pass order is
//! authoritative: fostered-content marking must precede any DSR reasoning,
//! DSR must precede encapsulation, fragment unpacking must precede
//! per-extension processors, and cleanup must come last. Passes marked
//! `skip_nested` run only on the top-level document; nested documents built
//! for extension bodies inherit their host's results.

use crate::{
    common::{Error, Result},
    dom::Document,
    env::Env,
};
use std::time::Instant;

pub mod cleanup;
pub mod dsr;
pub mod fixups;
pub mod fostered;
pub mod headings;
pub mod langconv;
pub mod media;
pub mod pwrap;
pub mod sections;
pub mod tplwrap;
pub mod unpack;

/// One post-process pass.
struct Pass {
    /// The tracing and dump shortcut.
    shortcut: &'static str,
    /// Run only on the top-level document.
    skip_nested: bool,
    /// Disabled in this build.
    omit: bool,
    /// Implemented as a set of per-tag traverser handlers.
    is_traverser: bool,
    run: fn(&mut Document, &mut Env, bool) -> Result,
}

const fn pass(
    shortcut: &'static str,
    skip_nested: bool,
    run: fn(&mut Document, &mut Env, bool) -> Result,
) -> Pass {
    Pass { shortcut, skip_nested, omit: false, is_traverser: false, run }
}

fn passes() -> Vec<Pass> {
    vec![
        pass("fostered", false, fostered::mark),
        pass("tb-fixups", false, fixups::tree_builder_fixups),
        pass("normalize", false, fixups::normalize),
        pass("pwrap", true, pwrap::wrap_stray_inline),
        pass("migrate-metas", false, fixups::migrate_template_markers),
        pass("pre-fix", false, fixups::fix_pres),
        pass("migrate-nls", false, fixups::migrate_trailing_newlines),
        pass("dsr", true, dsr::compute),
        pass("tplwrap", true, tplwrap::wrap),
        pass("unpack", false, unpack::run),
        pass("ext-pp", false, run_extension_processors),
        Pass {
            shortcut: "fixups2",
            skip_nested: true,
            omit: false,
            is_traverser: true,
            run: fixups::cell_and_list_fixups,
        },
        pass("media", false, media::add_info),
        pass("headings", false, headings::gen_anchors),
        pass("sections", true, sections::wrap),
        pass("heading-ids", false, headings::dedupe_ids),
        pass("langconv", true, langconv::convert),
        Pass {
            // The linter is an external collaborator; its slot is kept so
            // pass numbering stays stable in traces.
            shortcut: "linter",
            skip_nested: true,
            omit: true,
            is_traverser: false,
            run: |_, _, _| Ok(()),
        },
        pass("strip-metas", false, cleanup::strip_marker_metas),
        pass("linkclasses", true, cleanup::add_ext_link_classes),
        pass("cleanup", false, cleanup::final_cleanup),
        pass("redlinks", true, cleanup::annotate_red_links),
    ]
}

/// Runs the pipeline over a document.
pub fn run(doc: &mut Document, env: &mut Env, at_top: bool) -> Result {
    for pass in passes() {
        if pass.omit || (pass.skip_nested && !at_top) {
            continue;
        }
        let dumping = env.options.dump.contains(pass.shortcut);
        if dumping {
            dump(doc, pass.shortcut, "pre");
        }
        let started = Instant::now();
        (pass.run)(doc, env, at_top).map_err(|err| Error::Pass {
            pass: pass.shortcut,
            source: Box::new(err),
        })?;
        log::trace!(
            target: "pp",
            "{}{}: {:.2?}",
            pass.shortcut,
            if pass.is_traverser { " (traverser)" } else { "" },
            started.elapsed()
        );
        if dumping {
            dump(doc, pass.shortcut, "post");
        }
    }
    Ok(())
}

fn dump(doc: &Document, shortcut: &str, phase: &str) {
    let path = format!("{shortcut}-{phase}.dump.html");
    if let Err(err) = std::fs::write(&path, crate::html::serialize_body(doc)) {
        log::warn!(target: "pp", "could not write {path}: {err}");
    }
}

/// Pass 11: per-extension DOM post-processors, in registration order.
fn run_extension_processors(doc: &mut Document, env: &mut Env, _at_top: bool) -> Result {
    let processors: Vec<_> = env
        .site
        .extensions
        .iter()
        .filter_map(|(_, ext)| ext.dom_post_processor)
        .collect();
    let body = doc.body;
    for processor in processors {
        processor(doc, body, env)?;
    }
    Ok(())
}
