//! Shared test utilities for page fixtures

use crate::{
    content::{is_highlight, AUTHOR_ROLE_ATTR},
    dom::{Boundary, Document, NodeId, TextRange},
    error::YummyError,
    persistence::ConversationScope,
    store::AnnotationStore,
};
use serde_json::Value;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Builds `<main>` holding one message container per `(role, inner markup)` pair.
pub fn page(messages: &[(&str, &str)]) -> Document {
    init_logging();
    let mut html = String::from("<main>");
    for (role, inner) in messages {
        html.push_str(&format!("<div {AUTHOR_ROLE_ATTR}=\"{role}\">{inner}</div>"));
    }
    html.push_str("</main>");
    Document::parse(&html).expect("fixture markup parses")
}

/// The `n`-th element with `tag`, in document order.
pub fn find_tag(doc: &Document, tag: &str, n: usize) -> NodeId {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|id| doc.tag(*id) == Some(tag))
        .nth(n)
        .unwrap_or_else(|| panic!("no <{tag}> #{n} in fixture"))
}

fn first_text(doc: &Document, node: NodeId) -> NodeId {
    doc.descendants(node)
        .into_iter()
        .find(|id| doc.is_text(*id))
        .unwrap_or_else(|| panic!("{node:?} holds no text"))
}

/// Range from an offset in the first text node of `a` to an offset in the first text node of `b`.
pub fn text_range(doc: &Document, a: NodeId, a_off: usize, b: NodeId, b_off: usize) -> TextRange {
    TextRange::new(
        Boundary::new(first_text(doc, a), a_off),
        Boundary::new(first_text(doc, b), b_off),
    )
}

/// No span nests in another, and no two spans are siblings separated only by whitespace.
pub fn assert_span_invariant(doc: &Document, block: NodeId) {
    for span in doc
        .descendants(block)
        .into_iter()
        .filter(|id| is_highlight(doc, *id))
    {
        assert!(
            !doc.ancestors(span).iter().any(|a| is_highlight(doc, *a)),
            "nested highlight in {}",
            doc.outer_html(block)
        );
        let mut next = doc.next_sibling(span);
        while let Some(n) = next {
            match doc.text(n) {
                Some(text) if text.trim().is_empty() => next = doc.next_sibling(n),
                _ => break,
            }
        }
        if let Some(n) = next {
            assert!(
                !is_highlight(doc, n),
                "adjacent highlights in {}",
                doc.outer_html(block)
            );
        }
    }
}

/// A store whose every operation fails.
pub struct FailingStore;

impl AnnotationStore for FailingStore {
    async fn get(&self, _scope: &ConversationScope) -> Result<Option<Value>, YummyError> {
        Err(YummyError::Store("store unavailable".to_string()))
    }

    async fn set(&self, _scope: &ConversationScope, _record: Value) -> Result<(), YummyError> {
        Err(YummyError::Store("store unavailable".to_string()))
    }

    async fn delete(&self, _scope: &ConversationScope) -> Result<(), YummyError> {
        Err(YummyError::Store("store unavailable".to_string()))
    }
}
