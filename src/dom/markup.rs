use super::{Document, DomNode, Element, NodeId};
use crate::error::YummyError;
use scraper::Html;

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Per-element decision of a filtered serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// Serialize the element as it is.
    Keep,
    /// Serialize this payload in place of the element's own, children unchanged.
    Rewrite(Element),
    /// Serialize the children only.
    Unwrap,
    /// Drop the element and its subtree.
    Skip,
}

/// Wrapper elements that put markup for `tag` in a context where the parser keeps table
/// structure. Other elements parse fine in body context.
fn context_chain(tag: &str) -> Vec<&'static str> {
    match tag {
        "table" => vec!["table"],
        "thead" => vec!["table", "thead"],
        "tbody" => vec!["table", "tbody"],
        "tfoot" => vec!["table", "tfoot"],
        "tr" => vec!["table", "tbody", "tr"],
        "td" => vec!["table", "tbody", "tr", "td"],
        "th" => vec!["table", "tbody", "tr", "th"],
        _ => Vec::new(),
    }
}

impl Document {
    /// Builds a document from a markup fragment, parsed in body context.
    pub fn parse(html: &str) -> Result<Document, YummyError> {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_markup(root, html)?;
        Ok(doc)
    }

    /// Replaces the children of `parent` with the parsed `html`. Returns the new top-level nodes.
    pub fn set_inner_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, YummyError> {
        match self.node(parent) {
            None => return Err(YummyError::NotFound(format!("node {parent:?}"))),
            Some(DomNode::Text(_)) => {
                return Err(YummyError::Markup(format!(
                    "cannot set markup on text node {parent:?}"
                )))
            }
            Some(_) => {}
        }
        self.clear_children(parent);
        self.append_markup(parent, html)
    }

    /// Parses `html` and appends the result to `parent`'s children. Table parts are parsed inside
    /// their own table context, so rows and cells survive.
    pub fn append_markup(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, YummyError> {
        let chain = self.tag(parent).map(context_chain).unwrap_or_default();
        let mut wrapped = String::new();
        for tag in chain.iter() {
            wrapped.push_str(&format!("<{tag}>"));
        }
        wrapped.push_str(html);
        for tag in chain.iter().rev() {
            wrapped.push_str(&format!("</{tag}>"));
        }

        let fragment = Html::parse_fragment(&wrapped);
        if !fragment.errors.is_empty() {
            tracing::debug!(
                "[Markup] tolerated {} parse error(s): {:?}",
                fragment.errors.len(),
                fragment.errors.first()
            );
        }
        let mut context = *fragment.root_element();
        for tag in chain.iter() {
            context = context
                .children()
                .find(|c| matches!(c.value(), scraper::Node::Element(el) if el.name() == *tag))
                .ok_or_else(|| YummyError::Markup(format!("<{tag}> context lost while parsing")))?;
        }
        let mut top_level = Vec::new();
        let mut pending = vec![(parent, context)];
        while let Some((target, source)) = pending.pop() {
            for child in source.children() {
                let created = match child.value() {
                    scraper::Node::Element(el) => {
                        let mut element = Element::new(el.name());
                        for (name, value) in el.attrs() {
                            element.set_attr(name, value);
                        }
                        let id = self.create_element(element);
                        pending.push((id, child));
                        id
                    }
                    scraper::Node::Text(text) => self.create_text(text),
                    _ => continue,
                };
                self.append_child(target, created)?;
                if target == parent {
                    top_level.push(created);
                }
            }
        }
        Ok(top_level)
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        self.inner_html_filtered(id, |_, _| Emit::Keep)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out, &|_, _| Emit::Keep);
        out
    }

    /// Serializes the children of `id`, consulting `filter` for every descendant element.
    pub fn inner_html_filtered<F>(&self, id: NodeId, filter: F) -> String
    where
        F: Fn(NodeId, &Element) -> Emit,
    {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(child, &mut out, &filter);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String, filter: &dyn Fn(NodeId, &Element) -> Emit) {
        match self.node(id) {
            None => {}
            Some(DomNode::Text(text)) => escape_text(text, out),
            Some(DomNode::Document) => {
                for child in self.children(id) {
                    self.write_node(child, out, filter);
                }
            }
            Some(DomNode::Element(el)) => {
                let rewritten;
                let el = match filter(id, el) {
                    Emit::Skip => return,
                    Emit::Unwrap => {
                        for child in self.children(id) {
                            self.write_node(child, out, filter);
                        }
                        return;
                    }
                    Emit::Keep => el,
                    Emit::Rewrite(replacement) => {
                        rewritten = replacement;
                        &rewritten
                    }
                };
                write_open_tag(el, out);
                if VOID_ELEMENTS.contains(&el.tag()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(child, out, filter);
                }
                out.push_str("</");
                out.push_str(el.tag());
                out.push('>');
            }
        }
    }
}

fn write_open_tag(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(el.tag());
    if !el.classes().is_empty() {
        out.push_str(" class=\"");
        escape_attr(&el.classes().join(" "), out);
        out.push('"');
    }
    for (name, value) in el.attrs() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}
