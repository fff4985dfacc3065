//! The tree builder adapter: final token stream → DOM.
//!
//! A stack-based builder with the two behaviours the post-processor depends
//! on: implied end tags (a new `<td>` closes the open one) and HTML5 table
//! foster-parenting (content that is not legal inside table structure is
//! moved in front of the table). Fostered nodes get a scratch breadcrumb
//! that the fostered-content marker pass later promotes to a durable flag.

use crate::{
    common::Result,
    config::{PARENTS, VOID_TAGS},
    dom::{Document, NodeId},
    tokens::{DataAttribs, Token},
};

/// Builds a document from a token stream.
pub fn build(tokens: Vec<Token>) -> Result<Document> {
    let mut builder = Builder::new();
    for token in tokens {
        builder.push_token(token)?;
    }
    builder.finish()
}

struct Builder {
    doc: Document,
    /// Open elements, the body at the bottom.
    stack: Vec<NodeId>,
}

impl Builder {
    fn new() -> Self {
        let doc = Document::new();
        let body = doc.body;
        Self { doc, stack: vec![body] }
    }

    fn finish(mut self) -> Result<Document> {
        while self.stack.len() > 1 {
            let node = self.stack.pop().unwrap();
            self.doc.dp_mut(node).auto_inserted_end = true;
        }
        Ok(self.doc)
    }

    fn top_name(&self) -> &str {
        self.doc.name(*self.stack.last().unwrap())
    }

    fn push_token(&mut self, token: Token) -> Result {
        match token {
            Token::StartTag { name, attrs, da } => {
                let node = self.insert_element(&name, &attrs, &da);
                if !VOID_TAGS.contains(name.as_str()) {
                    if let Some(node) = node {
                        self.stack.push(node);
                    }
                }
            }
            Token::SelfClosing { name, attrs, da } => {
                self.insert_element(&name, &attrs, &da);
            }
            Token::EndTag { name, da } => {
                self.close_element(&name, &da);
            }
            Token::Text { text } => {
                if !text.is_empty() {
                    self.insert_text(text);
                }
            }
            Token::Newline { .. } => {
                self.insert_text("\n".to_string());
            }
            Token::Comment { text, da } => {
                let node = self.doc.create_comment(text);
                let parent = *self.stack.last().unwrap();
                self.doc.append(parent, node);
                if let Some(tsr) = da.tsr {
                    self.doc.dp_mut(node).tsr = Some(tsr);
                }
            }
            Token::Eof => {}
        }
        Ok(())
    }

    /// What the open table-structure element accepts as a direct child.
    fn allowed_in_table_ctx(ctx: &str, name: &str) -> bool {
        match ctx {
            "table" => matches!(name, "caption" | "colgroup" | "tbody" | "tr" | "td" | "th"),
            "tbody" => matches!(name, "tr" | "td" | "th"),
            "tr" => matches!(name, "td" | "th"),
            _ => true,
        }
    }

    /// Whether `parent` may directly contain `child`.
    fn can_parent(parent: &str, child: &str) -> bool {
        if let Some(children) = PARENTS.get(parent) {
            children.contains(&child)
        } else if matches!(parent, "td" | "th" | "caption") {
            !matches!(child, "tr" | "td" | "th" | "caption")
        } else if parent == "p" {
            !crate::config::BLOCK_TAGS.contains(child)
        } else {
            true
        }
    }

    fn insert_element(&mut self, name: &str, attrs: &[crate::tokens::Attr], da: &DataAttribs) -> Option<NodeId> {
        let in_table_ctx = matches!(self.top_name(), "table" | "tbody" | "tr");
        if in_table_ctx && !Self::allowed_in_table_ctx(self.top_name(), name) {
            return Some(self.foster_element(name, attrs, da));
        }

        // A bare cell right after `{|` gets its implied row.
        if matches!(name, "td" | "th") && matches!(self.top_name(), "table" | "tbody") {
            let tr = self.doc.create_element("tr");
            let parent = *self.stack.last().unwrap();
            self.doc.append(parent, tr);
            self.doc.dp_mut(tr).auto_inserted_end = true;
            self.stack.push(tr);
        }

        // Implied end tags.
        while self.stack.len() > 1 && !Self::can_parent(self.top_name(), name) {
            let closed = self.stack.pop().unwrap();
            self.doc.dp_mut(closed).auto_inserted_end = true;
        }

        let parent = *self.stack.last().unwrap();
        let node = self.create(name, attrs, da);
        self.doc.append(parent, node);
        Some(node)
    }

    fn foster_element(&mut self, name: &str, attrs: &[crate::tokens::Attr], da: &DataAttribs) -> NodeId {
        let node = self.create(name, attrs, da);
        self.foster(node);
        node
    }

    /// Moves a node in front of the innermost open table.
    fn foster(&mut self, node: NodeId) {
        let table = self
            .stack
            .iter()
            .rev()
            .copied()
            .find(|&n| self.doc.name(n) == "table");
        match table {
            Some(table) if self.doc.parent(table).is_some() => {
                self.doc.insert_before(table, node);
            }
            _ => {
                let parent = *self.stack.last().unwrap();
                self.doc.append(parent, node);
            }
        }
        self.doc.dp_mut(node).tmp.fostered_candidate = true;
    }

    fn insert_text(&mut self, text: String) {
        let in_table_ctx = matches!(self.top_name(), "table" | "tbody" | "tr");
        if in_table_ctx && !text.chars().all(|c| c.is_ascii_whitespace()) {
            let node = self.doc.create_text(text);
            self.foster(node);
            return;
        }
        let parent = *self.stack.last().unwrap();
        // Merge into a preceding text node rather than fragmenting.
        if let Some(last) = self.doc.last_child(parent) {
            if let crate::dom::NodeKind::Text(t) = &mut self.doc.node_mut(last).kind {
                t.push_str(&text);
                return;
            }
        }
        let node = self.doc.create_text(text);
        self.doc.append(parent, node);
    }

    fn close_element(&mut self, name: &str, da: &DataAttribs) {
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|&n| self.doc.name(n) == name)
        else {
            log::debug!(target: "treebuilder", "dropping unmatched </{name}>");
            return;
        };
        if pos == 0 {
            return;
        }
        // Everything above the match is implicitly closed.
        while self.stack.len() > pos + 1 {
            let closed = self.stack.pop().unwrap();
            self.doc.dp_mut(closed).auto_inserted_end = true;
        }
        let node = self.stack.pop().unwrap();
        if let Some(tsr) = da.tsr {
            self.doc.dp_mut(node).tmp.end_tsr = Some(tsr);
        }
    }

    fn create(&mut self, name: &str, attrs: &[crate::tokens::Attr], da: &DataAttribs) -> NodeId {
        let node = self.doc.create_element(name);
        for attr in attrs {
            self.doc.set_attr(node, &attr.name, attr.value.clone());
        }
        let needs_data = da.tsr.is_some()
            || da.stx.is_some()
            || da.tag_widths.is_some()
            || da.tpl_arg_info.is_some()
            || da.from_foster
            || da.unwrapped_wt
            || da.src.is_some();
        if needs_data {
            let dp = self.doc.dp_mut(node);
            dp.tsr = da.tsr;
            dp.stx = da.stx.map(|s| s.as_str().to_string());
            dp.src = da.src.clone();
            dp.tmp.tag_widths = da.tag_widths;
            dp.tmp.tpl_arg_info = da.tpl_arg_info.clone();
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{Attr, Syntax, Tsr};

    fn start(name: &str) -> Token {
        Token::StartTag { name: name.into(), attrs: vec![], da: DataAttribs::default() }
    }

    fn end(name: &str) -> Token {
        Token::EndTag { name: name.into(), da: DataAttribs::default() }
    }

    fn text(t: &str) -> Token {
        Token::Text { text: t.into() }
    }

    #[test]
    fn implied_cell_ends() {
        let doc = build(vec![
            start("table"),
            start("tr"),
            start("td"),
            text("a"),
            start("td"),
            text("b"),
            end("table"),
            Token::Eof,
        ])
        .unwrap();
        let table = doc.children(doc.body)[0];
        let tr = doc.children(table)[0];
        assert_eq!(doc.children(tr).len(), 2, "second td implies the first closed");
    }

    #[test]
    fn nontable_content_is_fostered() {
        let doc = build(vec![
            start("table"),
            text("foo"),
            start("tr"),
            start("td"),
            end("table"),
            Token::Eof,
        ])
        .unwrap();
        let kids = doc.children(doc.body).to_vec();
        assert_eq!(kids.len(), 2);
        assert_eq!(doc.text(kids[0]), Some("foo"), "text moved before the table");
        assert_eq!(doc.name(kids[1]), "table");
        assert!(doc.dp(kids[0]).unwrap().tmp.fostered_candidate);
    }

    #[test]
    fn bare_cell_gets_implied_row() {
        let doc = build(vec![start("table"), start("td"), text("x"), end("table"), Token::Eof]).unwrap();
        let table = doc.children(doc.body)[0];
        let tr = doc.children(table)[0];
        assert_eq!(doc.name(tr), "tr");
        assert_eq!(doc.name(doc.children(tr)[0]), "td");
    }

    #[test]
    fn end_tsr_is_recorded() {
        let mut da = DataAttribs::default();
        da.tsr = Some(Tsr(0, 5));
        da.stx = Some(Syntax::Html);
        let mut end_da = DataAttribs::default();
        end_da.tsr = Some(Tsr(6, 12));
        let doc = build(vec![
            Token::StartTag { name: "div".into(), attrs: vec![Attr::new("id", "x")], da },
            text("a"),
            Token::EndTag { name: "div".into(), da: end_da },
            Token::Eof,
        ])
        .unwrap();
        let div = doc.children(doc.body)[0];
        let dp = doc.dp(div).unwrap();
        assert_eq!(dp.tsr, Some(Tsr(0, 5)));
        assert_eq!(dp.tmp.end_tsr, Some(Tsr(6, 12)));
        assert_eq!(doc.attr(div, "id"), Some("x"));
    }
}
