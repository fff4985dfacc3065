//! A parsing expression grammar producing the flat token stream.
//!
//! The grammar is deliberately shallow: it recognizes construct boundaries
//! and emits tag tokens with source ranges, leaving expansion, linking, and
//! structure recovery to the transform stages and the tree builder. Balanced
//! sub-constructs (`{{…}}` inside an argument, `[[…]]` inside a caption) are
//! captured as raw text and re-tokenized by whichever handler expands them.

use crate::{
    config::{BEHAVIOR_SWITCHES, HTML5_TAGS, PROTOCOLS, SiteConfig, VOID_TAGS},
    tokens::{Attr, DataAttribs, Syntax, Token, Tsr},
    tokens::{T_BEHAVIOR_SWITCH, T_EXTENSION, T_EXTLINK, T_LANG_VARIANT, T_LIST_ITEM, T_QUOTE,
             T_TEMPLATE, T_TEMPLATE_ARG, T_WIKILINK},
};
use peg::RuleResult;

/// Inline stop context. Set when inline content is being parsed inside a
/// construct whose terminator would otherwise be consumed as text.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stops {
    /// Stop at a `=`-run that closes a heading.
    pub heading: bool,
    /// Stop at `||` (table data cell separators).
    pub cell: bool,
    /// Stop at `!!` (table heading cell separators).
    pub th: bool,
}

const NO_STOPS: Stops = Stops { heading: false, cell: false, th: false };
const HEADING_STOPS: Stops = Stops { heading: true, cell: false, th: false };
const TD_STOPS: Stops = Stops { heading: false, cell: true, th: false };
const TH_STOPS: Stops = Stops { heading: false, cell: true, th: true };

peg::parser! { pub(super) grammar wikitext(cfg: &SiteConfig) for str {
    /// The top-level rule: a flat token stream terminated by `Eof`.
    pub rule document() -> Vec<Token>
    = ts:any_token()*
    {
        let mut out: Vec<Token> = ts.into_iter().flatten().collect();
        out.push(Token::Eof);
        out
    }

    rule any_token() -> Vec<Token>
    = sol_construct()
    / inline_token(&NO_STOPS)

    /// Matches only at the start of the input or immediately after a newline.
    rule sol()
    = #{|input, pos| if pos == 0 || input.as_bytes().get(pos - 1) == Some(&b'\n') {
          RuleResult::Matched(pos, ())
      } else {
          RuleResult::Failed
      }}

    /// A precondition on a rule argument.
    rule check(condition: bool)
    = position!() {? if condition { Ok(()) } else { Err("precondition") } }

    rule eolf()
    = ['\r' | '\n'] / ![_]

    rule ws()
    = [' ' | '\t']

    ////////////////////////////
    // Line-anchored blocks   //
    ////////////////////////////

    rule sol_construct() -> Vec<Token>
    = sol() t:(heading() / hr() / list_line() / table_line()) { t }

    /// A `=`-delimited heading line.
    rule heading() -> Vec<Token>
    = s:position!()
      open:$("="+)
      content:(!eolf() t:inline_token(&HEADING_STOPS) { t })*
      close:$("="+)
      ws()*
      &eolf()
      e:position!()
    { build_heading(s, e, open, close, content.into_iter().flatten().collect()) }

    /// A horizontal rule line.
    rule hr() -> Vec<Token>
    = s:position!() "----" "-"* e:position!()
    {
        vec![Token::SelfClosing {
            name: "hr".into(),
            attrs: vec![],
            da: with_wt_syntax(DataAttribs::spanning(s, e)),
        }]
    }

    /// A list item bullet run. The content after it flows as ordinary inline
    /// tokens; the list handler in stage 3 builds the list structure.
    rule list_line() -> Vec<Token>
    = s:position!() bullets:$(['*' | '#' | ';' | ':']+) e:position!()
    {
        vec![Token::SelfClosing {
            name: T_LIST_ITEM.into(),
            attrs: vec![Attr::new("bullets", bullets)],
            da: DataAttribs::spanning(s, e),
        }]
    }

    rule table_line() -> Vec<Token>
    = table_start() / table_end() / table_row() / table_caption()
    / table_heading_cells() / table_cells()

    rule rest_of_line() -> &'input str
    = t:$([^ '\r' | '\n']*) { t }

    rule table_start() -> Vec<Token>
    = s:position!() "{|" attrs:rest_of_line() e:position!()
    {
        vec![Token::StartTag {
            name: "table".into(),
            attrs: parse_attr_text(attrs),
            da: with_wt_syntax(DataAttribs::spanning(s, e)),
        }]
    }

    rule table_end() -> Vec<Token>
    = s:position!() "|}" e:position!()
    {
        vec![Token::EndTag {
            name: "table".into(),
            da: with_wt_syntax(DataAttribs::spanning(s, e)),
        }]
    }

    rule table_row() -> Vec<Token>
    = s:position!() "|-" "-"* attrs:rest_of_line() e:position!()
    {
        vec![Token::StartTag {
            name: "tr".into(),
            attrs: parse_attr_text(attrs),
            da: with_wt_syntax(DataAttribs::spanning(s, e)),
        }]
    }

    rule table_caption() -> Vec<Token>
    = s:position!() "|+" e:position!()
    {
        vec![Token::StartTag {
            name: "caption".into(),
            attrs: vec![],
            da: with_wt_syntax(DataAttribs::spanning(s, e)),
        }]
    }

    /// A `|`-prefixed line of data cells, split on `||`.
    rule table_cells() -> Vec<Token>
    = s:position!() "|" !['-' | '}' | '+'] "|"?
      first:cell_body(false, s)
      rest:(p:position!() "||" c:cell_body(false, p) { c })*
    {
        let mut out = first;
        for cell in rest {
            out.extend(cell);
        }
        out
    }

    /// A `!`-prefixed line of heading cells, split on `!!` or `||`.
    rule table_heading_cells() -> Vec<Token>
    = s:position!() "!" "!"?
      first:cell_body(true, s)
      rest:(p:position!() ("!!" / "||") c:cell_body(true, p) { c })*
    {
        let mut out = first;
        for cell in rest {
            out.extend(cell);
        }
        out
    }

    rule cell_attr_text() -> &'input str
    = t:$([^ '|' | '\r' | '\n' | '[' | '{' | '<']+) { t }

    rule cell_body(th: bool, start: usize) -> Vec<Token>
    = attrs:(a:cell_attr_text() "|" !"|" { a })?
      cs:position!()
      content:(!eolf() t:inline_token(if th { &TH_STOPS } else { &TD_STOPS }) { t })*
    { build_cell(th, start, cs, attrs, content.into_iter().flatten().collect()) }

    ////////////////////////////
    // Inline items           //
    ////////////////////////////

    rule inline_token(stops: &Stops) -> Vec<Token>
    = !stop_mark(stops)
      t:(newline_tok()
      / comment()
      / ext_tag()
      / html_tag()
      / template_arg()
      / template()
      / wikilink()
      / extlink()
      / lang_variant()
      / behavior_switch()
      / quote()
      / entity()
      / text_run()
      / fallback_char())
    { t }

    rule stop_mark(stops: &Stops)
    = check(stops.heading) &("="+ ws()* eolf())
    / check(stops.cell) &"||"
    / check(stops.th) &"!!"

    rule newline_tok() -> Vec<Token>
    = s:position!() ("\r\n" / "\n" / "\r") e:position!()
    { vec![Token::Newline { tsr: Some(Tsr(s, e)) }] }

    rule comment() -> Vec<Token>
    = s:position!() "<!--" text:$((!"-->" [_])*) "-->"? e:position!()
    {
        vec![Token::Comment {
            text: text.to_string(),
            da: DataAttribs::spanning(s, e),
        }]
    }

    rule tag_name() -> &'input str
    = t:$(['a'..='z' | 'A'..='Z'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-']*) { t }

    /// A registered extension tag, captured with its raw body.
    rule ext_tag() -> Vec<Token>
    // self-closing form
    = s:position!() "<" name:tag_name() opts:$([^ '>']*) ">" e:position!()
      check(cfg.extensions.contains(&name.to_ascii_lowercase())
          && opts.trim_end().ends_with('/'))
    { build_ext(s, e, name, opts, None) }
    // body form, consumed up to the matching close tag
    / s:position!() "<" name:tag_name() opts:$([^ '>']*) ">"
      check(cfg.extensions.contains(&name.to_ascii_lowercase())
          && !opts.trim_end().ends_with('/'))
      body:$((!close_tag(name) [_])*)
      close_tag(name)
      e:position!()
    { build_ext(s, e, name, opts, Some(body)) }

    rule close_tag(name: &str)
    = "</" n:tag_name() ws()* ">"
      {? if n.eq_ignore_ascii_case(name) { Ok(()) } else { Err("closing tag") } }

    /// A literal HTML tag or an inclusion-control tag.
    rule html_tag() -> Vec<Token>
    = s:position!() "<" end:"/"? name:tag_name() opts:$([^ '>']*) ">" e:position!()
    {? build_html_tag(s, e, end.is_some(), name, opts) }

    rule tpl_text()
    = (balanced_braces() / balanced_brackets() / (!("|" / "}}") [_]))*

    rule tpl_arg_text()
    = (balanced_braces() / balanced_brackets() / (!("|" / "}}}") [_]))*

    rule balanced_braces()
    = "{{{" (balanced_braces() / balanced_brackets() / (!"}}}" [_]))* "}}}"
    / "{{" (balanced_braces() / balanced_brackets() / (!"}}" [_]))* "}}"

    rule balanced_brackets()
    = "[[" (balanced_brackets() / balanced_braces() / (!"]]" [_]))* "]]"

    /// A template parameter use: `{{{name|default}}}`.
    rule template_arg() -> Vec<Token>
    = s:position!() "{{{"
      np:position!() name:$(tpl_arg_text())
      def:("|" dp:position!() d:$(tpl_arg_text()) { (dp, d.to_string()) })?
      "}}}" e:position!()
    { build_template_arg(s, e, np, name, def) }

    /// A transclusion: `{{target|arg|…}}`.
    rule template() -> Vec<Token>
    = s:position!() "{{"
      tp:position!() target:$(tpl_text())
      args:("|" p:position!() v:$(tpl_text()) { (p, v.to_string()) })*
      "}}" e:position!()
    { build_template(s, e, tp, target, args) }

    rule link_text()
    = (balanced_brackets() / balanced_braces() / (!("]]" / "|") [_]))*

    /// An internal link: `[[target|text]]`.
    rule wikilink() -> Vec<Token>
    = s:position!() "[["
      tp:position!() target:$((!("]]" / "|" / "\n") [_])*)
      args:("|" p:position!() v:$(link_text()) { (p, v.to_string()) })*
      "]]" e:position!()
    { build_wikilink(s, e, tp, target, args) }

    rule url_char()
    = [^ ' ' | '\t' | '\r' | '\n' | ']' | '[' | '<' | '>' | '"']

    /// An external link: `[proto://host text]`.
    rule extlink() -> Vec<Token>
    = s:position!() "["
      proto:$((['a'..='z' | 'A'..='Z']+ "://") / "mailto:" / "//")
      url:$(url_char()*)
      ws()*
      content:$((![']' | '\r' | '\n'] [_])*)
      "]" e:position!()
    {?
        if PROTOCOLS.contains(proto.to_ascii_lowercase().as_str()) {
            Ok(vec![Token::SelfClosing {
                name: T_EXTLINK.into(),
                attrs: vec![
                    Attr::new("href", format!("{proto}{url}")),
                    Attr::new("content", content),
                ],
                da: DataAttribs::spanning(s, e),
            }])
        } else {
            Err("external link protocol")
        }
    }

    /// Language conversion markup: `-{ … }-`. The interior is parsed by the
    /// variant handler.
    rule lang_variant() -> Vec<Token>
    = s:position!() "-{" body:$((!"}-" [_])*) "}-" e:position!()
    {
        vec![Token::SelfClosing {
            name: T_LANG_VARIANT.into(),
            attrs: vec![Attr::new("text", body)],
            da: DataAttribs::spanning(s, e),
        }]
    }

    rule behavior_switch() -> Vec<Token>
    = s:position!() "__" w:$(['a'..='z' | 'A'..='Z']+) "__" e:position!()
    {?
        if BEHAVIOR_SWITCHES.contains(w.to_ascii_lowercase().as_str()) {
            Ok(vec![Token::SelfClosing {
                name: T_BEHAVIOR_SWITCH.into(),
                attrs: vec![Attr::new("word", w.to_ascii_lowercase())],
                da: DataAttribs::spanning(s, e),
            }])
        } else {
            Err("behavior switch")
        }
    }

    /// A bold/italic quote run. Interpreted by the stage 3 quote transform.
    rule quote() -> Vec<Token>
    = s:position!() q:$("''" "'"*) e:position!()
    {
        vec![Token::SelfClosing {
            name: T_QUOTE.into(),
            attrs: vec![Attr::new("value", q)],
            da: DataAttribs::spanning(s, e),
        }]
    }

    /// A decoded HTML entity. Invalid entities fall through to plain text.
    rule entity() -> Vec<Token>
    = e:$("&" "#"? ['a'..='z' | 'A'..='Z' | '0'..='9']+ ";")
    {?
        let decoded = crate::common::decode_entities(e);
        if decoded != e {
            Ok(vec![Token::Text { text: decoded.into_owned() }])
        } else {
            Err("entity")
        }
    }

    rule text_run() -> Vec<Token>
    = t:$([^ '\r' | '\n' | '<' | '{' | '[' | '\'' | '&' | '_' | '-' | '=' | '|' | '!' | ']' | '}']+)
    { vec![Token::Text { text: t.to_string() }] }

    /// A single character that started a construct which failed to parse.
    rule fallback_char() -> Vec<Token>
    = t:$([^ '\r' | '\n']) { vec![Token::Text { text: t.to_string() }] }
}}

fn with_wt_syntax(mut da: DataAttribs) -> DataAttribs {
    da.stx = Some(Syntax::Wikitext);
    da
}

fn build_heading(
    start: usize,
    end: usize,
    open: &str,
    close: &str,
    mut content: Vec<Token>,
) -> Vec<Token> {
    let level = open.len().min(close.len()).min(6);
    let name = format!("h{level}");
    // Unbalanced runs keep their extra markers as literal text.
    if open.len() > level {
        content.insert(0, Token::Text { text: "=".repeat(open.len() - level) });
    }
    if close.len() > level {
        content.push(Token::Text { text: "=".repeat(close.len() - level) });
    }

    let mut da = with_wt_syntax(DataAttribs::spanning(start, end));
    da.tag_widths = Some((level, level));

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(Token::StartTag { name: name.clone(), attrs: vec![], da });
    out.extend(content);
    out.push(Token::EndTag { name, da: DataAttribs::default() });
    out
}

fn build_cell(
    th: bool,
    start: usize,
    content_start: usize,
    attrs: Option<&str>,
    content: Vec<Token>,
) -> Vec<Token> {
    let mut da = with_wt_syntax(DataAttribs::spanning(start, content_start));
    da.tag_widths = Some((content_start - start, 0));
    let mut out = Vec::with_capacity(content.len() + 1);
    out.push(Token::StartTag {
        name: if th { "th".into() } else { "td".into() },
        attrs: attrs.map(parse_attr_text).unwrap_or_default(),
        da,
    });
    out.extend(content);
    out
}

fn build_template(
    start: usize,
    end: usize,
    target_pos: usize,
    target: &str,
    args: Vec<(usize, String)>,
) -> Vec<Token> {
    let mut attrs = Vec::with_capacity(args.len() + 1);
    attrs.push(Attr {
        name: "target".into(),
        value: target.to_string(),
        span: Some(Tsr(target_pos, target_pos + target.len())),
    });
    for (pos, value) in args {
        let len = value.len();
        attrs.push(Attr {
            name: "arg".into(),
            value,
            span: Some(Tsr(pos, pos + len)),
        });
    }
    vec![Token::SelfClosing {
        name: T_TEMPLATE.into(),
        attrs,
        da: DataAttribs::spanning(start, end),
    }]
}

fn build_template_arg(
    start: usize,
    end: usize,
    name_pos: usize,
    name: &str,
    default: Option<(usize, String)>,
) -> Vec<Token> {
    let mut attrs = vec![Attr {
        name: "name".into(),
        value: name.to_string(),
        span: Some(Tsr(name_pos, name_pos + name.len())),
    }];
    if let Some((pos, value)) = default {
        let len = value.len();
        attrs.push(Attr {
            name: "default".into(),
            value,
            span: Some(Tsr(pos, pos + len)),
        });
    }
    vec![Token::SelfClosing {
        name: T_TEMPLATE_ARG.into(),
        attrs,
        da: DataAttribs::spanning(start, end),
    }]
}

fn build_wikilink(
    start: usize,
    end: usize,
    target_pos: usize,
    target: &str,
    args: Vec<(usize, String)>,
) -> Vec<Token> {
    let mut attrs = Vec::with_capacity(args.len() + 1);
    attrs.push(Attr {
        name: "href".into(),
        value: target.to_string(),
        span: Some(Tsr(target_pos, target_pos + target.len())),
    });
    for (pos, value) in args {
        let len = value.len();
        attrs.push(Attr {
            name: "arg".into(),
            value,
            span: Some(Tsr(pos, pos + len)),
        });
    }
    vec![Token::SelfClosing {
        name: T_WIKILINK.into(),
        attrs,
        da: DataAttribs::spanning(start, end),
    }]
}

fn build_ext(start: usize, end: usize, name: &str, opts: &str, body: Option<&str>) -> Vec<Token> {
    let mut attrs = vec![
        Attr::new("name", name.to_ascii_lowercase()),
        Attr::new("options", opts.trim_end().trim_end_matches('/')),
    ];
    if let Some(body) = body {
        attrs.push(Attr::new("body", body));
    }
    vec![Token::SelfClosing {
        name: T_EXTENSION.into(),
        attrs,
        da: DataAttribs::spanning(start, end),
    }]
}

/// Classifies a `<…>` tag: inclusion-control tags keep their own token name,
/// allowlisted HTML5 tags become HTML-syntax tag tokens, anything else fails
/// so the `<` falls back to plain text.
fn build_html_tag(
    start: usize,
    end: usize,
    is_end: bool,
    name: &str,
    opts: &str,
) -> Result<Vec<Token>, &'static str> {
    let lower = name.to_ascii_lowercase();
    let da = DataAttribs::spanning(start, end);

    if matches!(lower.as_str(), "noinclude" | "includeonly" | "onlyinclude") {
        return Ok(vec![if is_end {
            Token::EndTag { name: lower, da }
        } else {
            Token::StartTag { name: lower, attrs: vec![], da }
        }]);
    }

    if !HTML5_TAGS.contains(lower.as_str()) {
        return Err("html tag");
    }

    let mut da = da;
    da.stx = Some(Syntax::Html);

    if is_end {
        return Ok(vec![Token::EndTag { name: lower, da }]);
    }

    let self_closing = opts.trim_end().ends_with('/') || VOID_TAGS.contains(lower.as_str());
    let attrs = parse_attr_text(opts.trim_end().trim_end_matches('/'));
    Ok(vec![if self_closing {
        Token::SelfClosing { name: lower, attrs, da }
    } else {
        Token::StartTag { name: lower, attrs, da }
    }])
}

/// Parses a raw attribute string (`a="b" c='d' e=f g`) into attributes.
pub(crate) fn parse_attr_text(text: &str) -> Vec<Attr> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        // Attribute name.
        let mut name_end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' {
                break;
            }
            name_end = i + c.len_utf8();
            chars.next();
        }
        let name = &text[start..name_end];
        // Optional value.
        let mut value = None;
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }
        if let Some(&(_, '=')) = chars.peek() {
            chars.next();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_whitespace() {
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek().copied() {
                Some((vs, quote @ ('"' | '\''))) => {
                    chars.next();
                    let mut end = vs + 1;
                    for (i, c) in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        end = i + c.len_utf8();
                    }
                    value = Some(text[vs + 1..end].to_string());
                }
                Some((vs, _)) => {
                    let mut end = vs;
                    while let Some(&(i, c)) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    value = Some(text[vs..end].to_string());
                }
                None => {}
            }
        }
        if !name.is_empty() {
            out.push(Attr::new(
                name.to_ascii_lowercase(),
                value.unwrap_or_default(),
            ));
        }
    }
    out
}
