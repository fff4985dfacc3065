use crate::{
    common::Error,
    env::{Env, InMemoryDataAccess, PageConfig},
};
use std::io::Read as _;

mod common;
mod config;
mod dom;
mod env;
mod html;
mod pipeline;
mod pp;
#[cfg(test)]
mod tests;
mod tokenizer;
mod tokens;
mod treebuilder;
mod tt;

fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [options] [input-file]\n");
    eprintln!("Reads wikitext from the input file (or stdin) and writes HTML to stdout.\n");
    eprintln!("Modes:");
    eprintln!("    --wt2html (default), --html2wt, --wt2wt, --html2html\n");
    eprintln!("Options:");
    eprintln!("    --pageName <title>          Page title (default: Main Page)");
    eprintln!("    --domain <domain>           Wiki domain");
    eprintln!("    --apiURL <url>              Wiki API endpoint");
    eprintln!("    --wrapSections[=bool]       Wrap sections (default: true)");
    eprintln!("    --scrubWikitext             Normalize wikitext while serializing");
    eprintln!("    --linting                   Enable the linter pass");
    eprintln!("    --selser                    Selective serialization");
    eprintln!("    --oldtext <text>            Previous revision text");
    eprintln!("    --oldtextfile <path>        Previous revision text file");
    eprintln!("    --oldhtmlfile <path>        Previous revision HTML file");
    eprintln!("    --dump <shortcuts>          Dump pass output (comma separated)");
    eprintln!("    --trace <channels>          Trace channels (comma separated)");
    eprintln!("    --outputContentVersion <v>  Output content version");
    eprintln!("    --offsetType byte|ucs2|char Offset type for source ranges");
    eprintln!("    --pagebundle                Also print the page bundle JSON");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Wt2Html,
    Html2Wt,
    Wt2Wt,
    Html2Html,
}

struct Args {
    mode: Mode,
    page_name: String,
    wrap_sections: bool,
    scrub_wikitext: bool,
    dump: Vec<String>,
    trace: Vec<String>,
    content_version: Option<String>,
    pagebundle: bool,
    input: Option<String>,
}

impl Args {
    fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        let mode = if args.contains("--html2wt") {
            Mode::Html2Wt
        } else if args.contains("--wt2wt") {
            Mode::Wt2Wt
        } else if args.contains("--html2html") {
            Mode::Html2Html
        } else {
            let _ = args.contains("--wt2html");
            Mode::Wt2Html
        };

        let page_name = args
            .opt_value_from_str("--pageName")?
            .unwrap_or_else(|| "Main Page".to_string());
        let _domain: Option<String> = args.opt_value_from_str("--domain")?;
        let _api_url: Option<String> = args.opt_value_from_str("--apiURL")?;
        let wrap_sections = args
            .opt_value_from_str("--wrapSections")?
            .unwrap_or(true);
        let scrub_wikitext = args.contains("--scrubWikitext");
        if args.contains("--linting") {
            log::warn!("--linting requested but the linter pass is not built in");
        }
        if args.contains("--selser") {
            return Err("--selser requires --html2wt".into());
        }
        let _oldtext: Option<String> = args.opt_value_from_str("--oldtext")?;
        let _oldtext_file: Option<String> = args.opt_value_from_str("--oldtextfile")?;
        let _oldhtml_file: Option<String> = args.opt_value_from_str("--oldhtmlfile")?;
        let dump = list_arg(&mut args, "--dump")?;
        let trace = list_arg(&mut args, "--trace")?;
        let content_version = args.opt_value_from_str("--outputContentVersion")?;
        let offset_type: Option<String> = args.opt_value_from_str("--offsetType")?;
        match offset_type.as_deref() {
            None | Some("byte") => {}
            Some(other) => {
                return Err(format!("unsupported --offsetType {other}: only byte offsets are produced").into());
            }
        }
        let pagebundle = args.contains("--pagebundle");

        let input = args.opt_free_from_str::<String>()?;
        let rest = args.finish();
        if !rest.is_empty() {
            return Err(format!("unknown arguments: {rest:?}").into());
        }

        Ok(Self {
            mode,
            page_name,
            wrap_sections,
            scrub_wikitext,
            dump,
            trace,
            content_version,
            pagebundle,
            input,
        })
    }
}

fn list_arg(
    args: &mut pico_args::Arguments,
    key: &'static str,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    Ok(args
        .opt_value_from_str::<_, String>(key)?
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default())
}

fn init_logging(trace: &[String]) {
    let mut builder = env_logger::Builder::from_default_env();
    for channel in trace {
        builder.filter(Some(channel.as_str()), log::LevelFilter::Trace);
    }
    let _ = builder.try_init();
}

fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(err) => {
            usage();
            eprintln!("\nerror: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&args.trace);

    if args.mode != Mode::Wt2Html {
        eprintln!("error: mode {:?} is handled by the serializer, which is not built in", args.mode);
        std::process::exit(1);
    }

    let source = match &args.input {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let source = match source {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: could not read input: {err}");
            std::process::exit(1);
        }
    };

    let mut env = Env::new(
        config::SiteConfig::default(),
        PageConfig::new(args.page_name.clone(), source),
        Box::new(InMemoryDataAccess::new()),
    );
    env.options.wrap_sections = args.wrap_sections;
    env.options.scrub_wikitext = args.scrub_wikitext;
    env.options.dump = args.dump.iter().cloned().collect();
    if let Some(version) = args.content_version {
        env.options.content_version = version;
    }

    match pipeline::parse_document(&mut env) {
        Ok(doc) => {
            println!("{}", html::serialize(&doc, &env));
            if args.pagebundle {
                match serde_json::to_string_pretty(&doc.bundle) {
                    Ok(bundle) => println!("{bundle}"),
                    Err(err) => eprintln!("error: could not serialize page bundle: {err}"),
                }
            }
        }
        Err(err @ Error::Client(_)) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    }
}
