//! Stable addressing of content nodes.
//!
//! A [`StableId`] is the pair (assistant message ordinal, content node ordinal within that
//! message). It is recomputed from the live tree rather than remembered per node, so a block the
//! host destroyed and re-rendered with the same ordinal structure resolves to the same id.
//!
//! If a message is regenerated with a different block count, ids after the change point shift and
//! stored annotations attach to whatever block now holds the ordinal. That is accepted.

use crate::{
    content::{assistant_messages, content_nodes_in, kind_of, message_of},
    dom::{Document, NodeId},
    error::YummyError,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StableId {
    pub message: usize,
    pub node: usize,
}

impl StableId {
    pub fn new(message: usize, node: usize) -> Self {
        StableId { message, node }
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.message, self.node)
    }
}

impl FromStr for StableId {
    type Err = YummyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (message, node) = s.split_once('-').ok_or_else(|| {
            YummyError::Serialization(format!("'{s}' is not a <message>-<node> id"))
        })?;
        let parse = |part: &str| {
            part.parse::<usize>().map_err(|e| {
                YummyError::Serialization(format!("invalid ordinal '{part}' in id '{s}': {e}"))
            })
        };
        Ok(StableId::new(parse(message)?, parse(node)?))
    }
}

impl From<StableId> for String {
    fn from(id: StableId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for StableId {
    type Error = YummyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Per-message cache of content-node ordinals, invalidated before every feed pass.
#[derive(Debug, Default)]
pub struct Addressing {
    messages: Option<Vec<NodeId>>,
    tables: HashMap<NodeId, Vec<NodeId>>,
}

impl Addressing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.messages = None;
        self.tables.clear();
    }

    /// The assistant message list, recomputed when absent or when a cached message has left the
    /// document.
    fn messages(&mut self, doc: &Document) -> &[NodeId] {
        let stale = self
            .messages
            .as_ref()
            .map(|messages| messages.iter().any(|m| !doc.is_attached(*m)))
            .unwrap_or(true);
        if stale {
            self.invalidate();
        }
        self.messages
            .get_or_insert_with(|| assistant_messages(doc))
            .as_slice()
    }

    fn message_ordinal(&mut self, doc: &Document, message: NodeId) -> Option<usize> {
        if let Some(ordinal) = self.messages(doc).iter().position(|m| *m == message) {
            return Some(ordinal);
        }
        // a message rendered after the list was cached
        self.invalidate();
        self.messages(doc).iter().position(|m| *m == message)
    }

    fn table(&mut self, doc: &Document, message: NodeId) -> &[NodeId] {
        self.tables
            .entry(message)
            .or_insert_with(|| content_nodes_in(doc, message))
            .as_slice()
    }

    /// The stable id of `node`, or `None` if it is not a content node of an assistant message.
    pub fn resolve(&mut self, doc: &Document, node: NodeId) -> Option<StableId> {
        kind_of(doc, node)?;
        let message = message_of(doc, node)?;
        let ordinal = self.message_ordinal(doc, message)?;
        let cached = self.table(doc, message).iter().position(|n| *n == node);
        let index = match cached {
            Some(index) => index,
            None => {
                // node created after the table was filled
                let rebuilt = content_nodes_in(doc, message);
                let index = rebuilt.iter().position(|n| *n == node);
                self.tables.insert(message, rebuilt);
                index?
            }
        };
        Some(StableId::new(ordinal, index))
    }

    /// The live node currently holding `id`.
    pub fn node_for(&mut self, doc: &Document, id: StableId) -> Option<NodeId> {
        let message = *self.messages(doc).get(id.message)?;
        self.table(doc, message).get(id.node).copied()
    }
}
