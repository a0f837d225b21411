//! Recognition of annotatable content inside the host page.
//!
//! A content node is a heading, paragraph, list item, preformatted block or table that lives
//! inside an assistant-authored message. Everything the engine injects into the page (rating
//! bars, wrapper containers, highlight spans, panels) is marked with the `yummy-` class and
//! attribute names defined here, so that it can be excluded from text extraction and stripped
//! from stored snapshots.

use crate::dom::{Document, Element, Emit, NodeId};

pub const AUTHOR_ROLE_ATTR: &str = "data-message-author-role";
pub const ASSISTANT_ROLE: &str = "assistant";

pub const PROCESSED_ATTR: &str = "data-yummy-processed";
pub const RATING_ATTR: &str = "data-yummy-rating";

pub const LIKED_CLASS: &str = "yummy-liked";
pub const DISLIKED_CLASS: &str = "yummy-disliked";
pub const FLASH_CLASS: &str = "yummy-flash";
pub const HIGHLIGHT_CLASS: &str = "yummy-selection-highlight";
pub const CONTAINER_CLASS: &str = "yummy-paragraph-container";
pub const RATING_BAR_CLASS: &str = "yummy-rating-bar";
pub const RATING_BUTTON_CLASS: &str = "yummy-rating-button";
pub const CONTROL_PANEL_CLASS: &str = "yummy-control-panel";
pub const QUICK_HIGHLIGHT_ID: &str = "yummy-quick-highlight-button";
pub const COLLECTION_PANEL_ID: &str = "yummy-collection-panel";

pub const EMOJI_LIKE: &str = "😋";
pub const EMOJI_DISLIKE: &str = "🤮";

/// Tags whose descendants mirror a block's rating classes.
const MIRRORED_TAGS: [&str; 8] = ["p", "h1", "h2", "h3", "h4", "h5", "h6", "li"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Heading(u8),
    Paragraph,
    ListItem,
    Preformatted,
    Table,
}

impl ContentKind {
    pub fn from_tag(tag: &str) -> Option<ContentKind> {
        match tag {
            "h1" => Some(ContentKind::Heading(1)),
            "h2" => Some(ContentKind::Heading(2)),
            "h3" => Some(ContentKind::Heading(3)),
            "h4" => Some(ContentKind::Heading(4)),
            "h5" => Some(ContentKind::Heading(5)),
            "h6" => Some(ContentKind::Heading(6)),
            "p" => Some(ContentKind::Paragraph),
            "li" => Some(ContentKind::ListItem),
            "pre" => Some(ContentKind::Preformatted),
            "table" => Some(ContentKind::Table),
            _ => None,
        }
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            ContentKind::Heading(level) => Some(*level),
            _ => None,
        }
    }
}

pub fn is_assistant_message(el: &Element) -> bool {
    el.attr(AUTHOR_ROLE_ATTR) == Some(ASSISTANT_ROLE)
}

/// Injected interface elements whose subtrees never count as content.
pub fn is_ui(el: &Element) -> bool {
    el.has_class(RATING_BAR_CLASS)
        || el.has_class(CONTROL_PANEL_CLASS)
        || matches!(el.attr("id"), Some(QUICK_HIGHLIGHT_ID) | Some(COLLECTION_PANEL_ID))
}

pub fn is_highlight(doc: &Document, id: NodeId) -> bool {
    doc.has_class(id, HIGHLIGHT_CLASS)
}

pub fn inside_ui(doc: &Document, id: NodeId) -> bool {
    doc.closest(id, is_ui).is_some()
}

pub fn message_of(doc: &Document, id: NodeId) -> Option<NodeId> {
    doc.closest(id, is_assistant_message)
}

/// Assistant messages in document order.
pub fn assistant_messages(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|id| doc.element(*id).map(is_assistant_message).unwrap_or(false))
        .collect()
}

pub fn latest_message(doc: &Document) -> Option<NodeId> {
    assistant_messages(doc).pop()
}

/// Classification of `id`; `None` unless it is a content-tagged element inside an assistant
/// message and outside injected UI.
pub fn kind_of(doc: &Document, id: NodeId) -> Option<ContentKind> {
    let kind = ContentKind::from_tag(doc.tag(id)?)?;
    if message_of(doc, id).is_none() || inside_ui(doc, id) {
        return None;
    }
    Some(kind)
}

/// Content nodes owned by `message`, in document order. Nested content (a paragraph inside a list
/// item) is listed after its container.
pub fn content_nodes_in(doc: &Document, message: NodeId) -> Vec<NodeId> {
    doc.descendants(message)
        .into_iter()
        .filter(|id| kind_of(doc, *id).is_some() && message_of(doc, *id) == Some(message))
        .collect()
}

/// Every content node in the page, in document order.
pub fn content_nodes(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|id| kind_of(doc, *id).is_some())
        .collect()
}

/// Drops every node that has an ancestor in the same list.
pub fn outermost_content(doc: &Document, nodes: &[NodeId]) -> Vec<NodeId> {
    nodes
        .iter()
        .copied()
        .filter(|id| !doc.ancestors(*id).iter().any(|a| nodes.contains(a)))
        .collect()
}

/// Nearest inclusive ancestor that is a content node.
pub fn containing_block(doc: &Document, id: NodeId) -> Option<NodeId> {
    std::iter::once(id)
        .chain(doc.ancestors(id))
        .find(|candidate| kind_of(doc, *candidate).is_some())
}

/// Furthest inclusive ancestor that is a content node. Highlights and their snapshots belong to
/// this block.
pub fn outermost_block(doc: &Document, id: NodeId) -> Option<NodeId> {
    std::iter::once(id)
        .chain(doc.ancestors(id))
        .filter(|candidate| kind_of(doc, *candidate).is_some())
        .last()
}

/// Content nodes following `heading` in its message, up to but excluding the next heading of the
/// same or a higher rank.
pub fn governed_section(doc: &Document, heading: NodeId) -> Vec<NodeId> {
    let Some(level) = kind_of(doc, heading).and_then(|k| k.heading_level()) else {
        return Vec::new();
    };
    let Some(message) = message_of(doc, heading) else {
        return Vec::new();
    };
    content_nodes_in(doc, message)
        .into_iter()
        .skip_while(|id| *id != heading)
        .skip(1)
        .take_while(|id| {
            kind_of(doc, *id)
                .and_then(|k| k.heading_level())
                .map(|other| other > level)
                .unwrap_or(true)
        })
        .collect()
}

/// Descendant elements that carry a copy of a block's rating classes.
pub fn mirrored_descendants(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.descendants(id)
        .into_iter()
        .filter(|d| {
            doc.tag(*d)
                .map(|tag| MIRRORED_TAGS.contains(&tag))
                .unwrap_or(false)
                && !inside_ui(doc, *d)
        })
        .collect()
}

/// Text of `id` with injected UI excluded, trimmed.
pub fn clean_text(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    collect_clean_text(doc, id, &mut out);
    out.trim().to_string()
}

fn collect_clean_text(doc: &Document, id: NodeId, out: &mut String) {
    if let Some(text) = doc.text(id) {
        out.push_str(text);
        return;
    }
    if doc.element(id).map(is_ui).unwrap_or(false) {
        return;
    }
    for child in doc.children(id) {
        collect_clean_text(doc, child, out);
    }
}

/// Inner markup of `id` without any injected affordances: rating bars are dropped, wrapper
/// containers unwrapped, and processing markers and rating classes removed. Highlight spans are
/// kept, so the result is the snapshot stored for a highlighted block.
pub fn clean_markup(doc: &Document, id: NodeId) -> String {
    doc.inner_html_filtered(id, |_, el| {
        if is_ui(el) {
            return Emit::Skip;
        }
        if el.has_class(CONTAINER_CLASS) {
            return Emit::Unwrap;
        }
        let marked = el.attr(PROCESSED_ATTR).is_some()
            || [LIKED_CLASS, DISLIKED_CLASS, FLASH_CLASS]
                .iter()
                .any(|class| el.has_class(class));
        if !marked {
            return Emit::Keep;
        }
        let mut cleaned = el.clone();
        cleaned.remove_attr(PROCESSED_ATTR);
        for class in [LIKED_CLASS, DISLIKED_CLASS, FLASH_CLASS] {
            cleaned.remove_class(class);
        }
        Emit::Rewrite(cleaned)
    })
}
