//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use yummy_core::{
    content::{is_ui, AUTHOR_ROLE_ATTR},
    dom::{Boundary, Document, NodeId, TextRange},
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A chat page: `<main>` holding one message container per `(role, inner markup)` pair.
#[allow(dead_code)]
pub fn page(messages: &[(&str, &str)]) -> Document {
    init_logging();
    let mut html = String::from("<main>");
    for (role, inner) in messages {
        html.push_str(&format!("<div {AUTHOR_ROLE_ATTR}=\"{role}\">{inner}</div>"));
    }
    html.push_str("</main>");
    Document::parse(&html).unwrap()
}

/// The `n`-th element with `tag`, in document order.
#[allow(dead_code)]
pub fn find_tag(doc: &Document, tag: &str, n: usize) -> NodeId {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|id| doc.tag(*id) == Some(tag))
        .nth(n)
        .unwrap_or_else(|| panic!("no <{tag}> #{n} on the page"))
}

/// The boundary `offset` characters into the text of `block`, skipping injected UI. An offset on
/// the border of two text nodes resolves to the end of the first.
#[allow(dead_code)]
pub fn point(doc: &Document, block: NodeId, offset: usize) -> Boundary {
    let mut seen = 0;
    for node in doc.descendants(block) {
        let Some(text) = doc.text(node) else {
            continue;
        };
        if doc
            .ancestors(node)
            .iter()
            .take_while(|a| **a != block)
            .any(|a| doc.element(*a).map(is_ui).unwrap_or(false))
        {
            continue;
        }
        let len = text.chars().count();
        if offset <= seen + len {
            return Boundary::new(node, offset - seen);
        }
        seen += len;
    }
    panic!("offset {offset} is past the text of {block:?}")
}

/// Range over characters `start..end` of `block`'s text.
#[allow(dead_code)]
pub fn chars(doc: &Document, block: NodeId, start: usize, end: usize) -> TextRange {
    TextRange::new(point(doc, block, start), point(doc, block, end))
}
