//! Live document model.
//!
//! The host page is mirrored as an arena tree of [`DomNode`]s. A node's [`NodeId`] is its live
//! identity: when the host re-renders a message, the replacement nodes get fresh ids even though
//! their logical content is unchanged. Everything that must survive re-rendering is therefore
//! addressed through [`crate::address::StableId`] instead.
//!
//! # Module Organization
//!
//! - this module: node types, structural mutation and tree queries
//! - [`markup`]: importing host markup and serializing subtrees
//! - [`range`]: boundary points, ranges and their ordering
//!
//! Structural mutations (insertions, removals, text splits, normalization) are reported to an
//! optional change sink as [`DocumentChange`]s. Class and attribute updates are not, mirroring a
//! child-list observer over the whole subtree.

mod markup;
mod range;

pub use ego_tree::NodeId;
pub use markup::Emit;
pub use range::{Boundary, TextRange};

use crate::error::YummyError;
use ego_tree::Tree;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// The document is shared between the change feed task and user interaction handlers.
pub type SharedDocument = Arc<Mutex<Document>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Element {
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Returns whether the class list changed.
    pub fn add_class(&mut self, class: &str) -> bool {
        if self.has_class(class) {
            return false;
        }
        self.classes.push(class.to_string());
        true
    }

    /// Returns whether the class list changed.
    pub fn remove_class(&mut self, class: &str) -> bool {
        let before = self.classes.len();
        self.classes.retain(|c| c != class);
        before != self.classes.len()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// `class` is routed to the class list so that markup round-trips keep a single source of
    /// truth for classes.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if name == "class" {
            self.classes.clear();
            for class in value.split_whitespace() {
                self.add_class(class);
            }
        } else {
            self.attrs.insert(name, value.to_string());
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.remove(name)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Document,
    Element(Element),
    Text(String),
}

impl DomNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            DomNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DomNode::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A structural change somewhere below `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChange {
    pub target: NodeId,
}

/// A live document arena.
///
/// Nodes are never freed: detached, replaced and unwrapped nodes stay in the arena for the
/// document's lifetime so that stale `NodeId`s keep resolving. Memory therefore grows with every
/// host re-render. Hosts that re-render for a long time should watch [`Document::arena_len`]
/// and rebuild the document from its `inner_html` when it grows too large, which also
/// invalidates every outstanding `NodeId`.
#[derive(Debug)]
pub struct Document {
    tree: Tree<DomNode>,
    changes: Option<UnboundedSender<DocumentChange>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            tree: Tree::new(DomNode::Document),
            changes: None,
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    /// Routes structural change notifications to `tx`, replacing any previous sink.
    pub fn observe(&mut self, tx: UnboundedSender<DocumentChange>) {
        self.changes = Some(tx);
    }

    /// Convenience wrapper around [`Document::observe`] that creates the channel.
    pub fn observed(&mut self) -> UnboundedReceiver<DocumentChange> {
        let (tx, rx) = unbounded_channel();
        self.observe(tx);
        rx
    }

    pub fn disconnect(&mut self) {
        self.changes = None;
    }

    fn notify(&self, target: NodeId) {
        if let Some(tx) = &self.changes {
            if tx.send(DocumentChange { target }).is_err() {
                tracing::debug!("[Document] change feed receiver dropped, notification lost");
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.tree.get(id).map(|n| n.value())
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).and_then(DomNode::as_element)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(DomNode::as_text)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::tag)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).map(|el| el.has_class(class)).unwrap_or(false)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    /// Runs `f` against the element payload of `id`; `None` if `id` is not an element.
    pub fn with_element_mut<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Element) -> R,
    ) -> Option<R> {
        let mut node = self.tree.get_mut(id)?;
        match node.value() {
            DomNode::Element(el) => Some(f(el)),
            _ => None,
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> bool {
        self.with_element_mut(id, |el| el.add_class(class))
            .unwrap_or(false)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> bool {
        self.with_element_mut(id, |el| el.remove_class(class))
            .unwrap_or(false)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.with_element_mut(id, |el| el.set_attr(name, value));
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.with_element_mut(id, |el| el.remove_attr(name));
    }

    /// Character data change; not reported as a structural change.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), YummyError> {
        let mut node = self
            .tree
            .get_mut(id)
            .ok_or_else(|| YummyError::NotFound(format!("node {id:?}")))?;
        match node.value() {
            DomNode::Text(current) => {
                current.clear();
                current.push_str(text);
                Ok(())
            }
            _ => Err(YummyError::Range(format!("node {id:?} is not a text node"))),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.parent().map(|p| p.id())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.first_child().map(|c| c.id())
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.last_child().map(|c| c.id())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.next_sibling().map(|c| c.id())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.prev_sibling().map(|c| c.id())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.ancestors().map(|a| a.id()).collect())
            .unwrap_or_default()
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.descendants().skip(1).map(|d| d.id()).collect())
            .unwrap_or_default()
    }

    /// Nearest inclusive ancestor element accepted by `pred`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let node = self.tree.get(id)?;
        std::iter::once(node)
            .chain(node.ancestors())
            .find(|n| n.value().as_element().map(&pred).unwrap_or(false))
            .map(|n| n.id())
    }

    /// Inclusive containment: a node contains itself.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).contains(&ancestor)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).last() == Some(&self.root())
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let node = self.tree.get(id)?;
        node.parent()?;
        Some(node.prev_siblings().count())
    }

    /// Child count for containers, character count for text.
    pub fn node_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Some(DomNode::Text(text)) => text.chars().count(),
            Some(_) => self.tree.get(id).map(|n| n.children().count()).unwrap_or(0),
            None => 0,
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.tree.get(id) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|d| d.value().as_text())
            .collect()
    }

    /// Nodes held by the arena, attached or not.
    pub fn arena_len(&self) -> usize {
        self.tree.nodes().count()
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.tree.orphan(DomNode::Element(element)).id()
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.orphan(DomNode::Text(text.to_string())).id()
    }

    /// Shallow copy: same payload, no children, not attached.
    pub fn shallow_clone(&mut self, id: NodeId) -> Result<NodeId, YummyError> {
        let value = self
            .node(id)
            .cloned()
            .ok_or_else(|| YummyError::NotFound(format!("node {id:?}")))?;
        if value == DomNode::Document {
            return Err(YummyError::Range("cannot clone the document node".to_string()));
        }
        Ok(self.tree.orphan(value).id())
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> Result<(), YummyError> {
        if self.tree.get(parent).is_none() || self.tree.get(child).is_none() {
            return Err(YummyError::NotFound(format!(
                "insertion of {child:?} into {parent:?} references a missing node"
            )));
        }
        if self.is_text(parent) {
            return Err(YummyError::Range(format!(
                "text node {parent:?} cannot have children"
            )));
        }
        if self.contains(child, parent) {
            return Err(YummyError::Range(format!(
                "cannot insert {child:?} into its own subtree"
            )));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), YummyError> {
        self.check_insertion(parent, child)?;
        self.detach_quiet(child);
        if let Some(mut parent_mut) = self.tree.get_mut(parent) {
            parent_mut.append_id(child);
        }
        self.notify(parent);
        Ok(())
    }

    /// Inserts `node` as the previous sibling of `reference`.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), YummyError> {
        if reference == node {
            return Ok(());
        }
        let parent = self.parent(reference).ok_or_else(|| {
            YummyError::Range(format!("reference node {reference:?} has no parent"))
        })?;
        self.check_insertion(parent, node)?;
        // ego_tree reads the reference's siblings before detaching the inserted node, so detach
        // first to keep sibling links consistent when `node` is already a neighbour.
        self.detach_quiet(node);
        if let Some(mut reference_mut) = self.tree.get_mut(reference) {
            reference_mut.insert_id_before(node);
        }
        self.notify(parent);
        Ok(())
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<(), YummyError> {
        if reference == node {
            return Ok(());
        }
        match self.next_sibling(reference) {
            Some(next) if next == node => Ok(()),
            Some(next) => self.insert_before(next, node),
            None => {
                let parent = self.parent(reference).ok_or_else(|| {
                    YummyError::Range(format!("reference node {reference:?} has no parent"))
                })?;
                self.append_child(parent, node)
            }
        }
    }

    fn detach_quiet(&mut self, id: NodeId) {
        if let Some(mut node) = self.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Removes `id` (and its subtree) from its parent. The node stays valid and can be
    /// re-inserted.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.parent(id);
        self.detach_quiet(id);
        if let Some(parent) = parent {
            self.notify(parent);
        }
    }

    /// Replaces `id` by its children, in place. Returns the moved children.
    pub fn unwrap_element(&mut self, id: NodeId) -> Result<Vec<NodeId>, YummyError> {
        if self.parent(id).is_none() {
            return Err(YummyError::Range(format!(
                "cannot unwrap detached node {id:?}"
            )));
        }
        let children = self.children(id);
        for child in children.iter() {
            self.insert_before(id, *child)?;
        }
        self.detach(id);
        Ok(children)
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = self.children(id);
        for child in children.iter() {
            self.detach_quiet(*child);
        }
        if !children.is_empty() {
            self.notify(id);
        }
    }

    /// Splits the text node `id` at character `offset`. The tail becomes a new text node inserted
    /// right after `id`, and is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, YummyError> {
        let text = self
            .text(id)
            .ok_or_else(|| YummyError::Range(format!("node {id:?} is not a text node")))?;
        let byte = char_to_byte(text, offset).ok_or_else(|| {
            YummyError::Range(format!(
                "offset {offset} is past the end of text node {id:?}"
            ))
        })?;
        let head = text[..byte].to_string();
        let tail = text[byte..].to_string();
        if self.parent(id).is_none() {
            return Err(YummyError::Range(format!(
                "cannot split detached text node {id:?}"
            )));
        }
        self.set_text(id, &head)?;
        let tail_id = self.create_text(&tail);
        self.insert_after(id, tail_id)?;
        Ok(tail_id)
    }

    /// Merges adjacent text nodes and drops empty ones throughout the subtree of `id`.
    pub fn normalize(&mut self, id: NodeId) {
        let mut changed = false;
        let mut containers = vec![id];
        containers.extend(self.descendants(id));
        containers.retain(|c| !self.is_text(*c));

        for container in containers {
            let mut cursor = self.first_child(container);
            while let Some(current) = cursor {
                let Some(text) = self.text(current).map(str::to_string) else {
                    cursor = self.next_sibling(current);
                    continue;
                };
                if text.is_empty() {
                    cursor = self.next_sibling(current);
                    self.detach_quiet(current);
                    changed = true;
                    continue;
                }
                let mut merged = text;
                let mut absorbed = false;
                while let Some(next) = self.next_sibling(current) {
                    let Some(next_text) = self.text(next).map(str::to_string) else {
                        break;
                    };
                    merged.push_str(&next_text);
                    self.detach_quiet(next);
                    absorbed = true;
                }
                if absorbed {
                    // current is known to be a text node
                    let _ = self.set_text(current, &merged);
                    changed = true;
                }
                cursor = self.next_sibling(current);
            }
        }
        if changed {
            self.notify(id);
        }
    }
}

/// Byte index of the character at `offset`; `offset == char count` maps to the string length.
pub(crate) fn char_to_byte(text: &str, offset: usize) -> Option<usize> {
    if offset == 0 {
        return Some(0);
    }
    match text.char_indices().nth(offset) {
        Some((byte, _)) => Some(byte),
        None if text.chars().count() == offset => Some(text.len()),
        None => None,
    }
}
