//! Per-conversation persistence of annotation state.
//!
//! The in-memory [`AnnotationMap`] of the active conversation is authoritative. Every committed
//! batch is written through to the [`AnnotationStore`] as a single record of the form
//!
//! ```json
//! { "0-3": { "rating": "liked", "highlightHTML": null } }
//! ```
//!
//! Entries with neither a rating nor a snapshot are dropped, and a record that becomes empty is
//! deleted rather than stored. Store failures are logged and otherwise ignored; the next
//! successful write carries the whole map again.

use crate::{address::StableId, error::YummyError, rating::Rating, store::AnnotationStore};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tokio::sync::Mutex;
use url::Url;

static CONVERSATION_PATH: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"/c/([A-Za-z0-9_-]+)"));

/// Identity under which a conversation's annotations are stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationScope(String);

impl ConversationScope {
    pub fn new(key: impl Into<String>) -> Self {
        ConversationScope(key.into())
    }

    /// `/c/<id>` locations are keyed by the conversation id; anything else by its path.
    pub fn from_location(location: &str) -> Result<Self, YummyError> {
        let url = Url::parse(location)?;
        let pattern = CONVERSATION_PATH.as_ref().map_err(|e| e.clone())?;
        if let Some(id) = pattern.captures(url.path()).and_then(|c| c.get(1)) {
            return Ok(ConversationScope::new(id.as_str()));
        }
        let path = url.path();
        Ok(ConversationScope::new(if path.is_empty() { "/" } else { path }))
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationState {
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(rename = "highlightHTML", default)]
    pub highlight_html: Option<String>,
}

impl AnnotationState {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.highlight_html.is_none()
    }
}

pub type AnnotationMap = BTreeMap<StableId, AnnotationState>;

/// One field update of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Rating(Option<Rating>),
    Highlight(Option<String>),
}

/// The active conversation and its map; they only ever change together.
#[derive(Debug, Default)]
struct Active {
    scope: Option<ConversationScope>,
    map: AnnotationMap,
}

pub struct Persistence<S> {
    store: S,
    active: RwLock<Active>,
    // writes reach the store in commit order, and scope switches wait for them
    writes: Mutex<()>,
}

impl<S: AnnotationStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Persistence {
            store,
            active: RwLock::new(Active::default()),
            writes: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scope(&self) -> Option<ConversationScope> {
        self.active.read().scope.clone()
    }

    /// Swaps in the record of `scope`. A missing or unreadable record yields an empty map.
    pub async fn load(&self, scope: ConversationScope) -> usize {
        let _writing = self.writes.lock().await;
        let loaded = match self.store.get(&scope).await {
            Ok(Some(record)) => match serde_json::from_value::<AnnotationMap>(record) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("[Persistence] discarding unreadable record of '{scope}': {e}");
                    AnnotationMap::new()
                }
            },
            Ok(None) => AnnotationMap::new(),
            Err(e) => {
                tracing::warn!("[Persistence] could not load '{scope}': {e}");
                AnnotationMap::new()
            }
        };
        let count = loaded.len();
        tracing::info!("[Persistence] scope '{scope}' loaded with {count} entries");
        *self.active.write() = Active {
            scope: Some(scope),
            map: loaded,
        };
        count
    }

    /// Applies changes to the in-memory map only.
    pub fn stage<I>(&self, changes: I)
    where
        I: IntoIterator<Item = (StableId, StateChange)>,
    {
        let mut active = self.active.write();
        let map = &mut active.map;
        for (id, change) in changes {
            let entry = map.entry(id).or_default();
            match change {
                StateChange::Rating(rating) => entry.rating = rating,
                StateChange::Highlight(html) => entry.highlight_html = html,
            }
            if entry.is_empty() {
                map.remove(&id);
            }
        }
    }

    /// Stages a batch and writes the record once.
    pub async fn commit<I>(&self, changes: I) -> Result<(), YummyError>
    where
        I: IntoIterator<Item = (StableId, StateChange)>,
    {
        self.stage(changes);
        self.flush().await
    }

    /// Writes the current map to the store; an empty map deletes the record. Without an active
    /// scope nothing is written.
    pub async fn flush(&self) -> Result<(), YummyError> {
        let _writing = self.writes.lock().await;
        let (scope, snapshot) = {
            let active = self.active.read();
            (active.scope.clone(), active.map.clone())
        };
        let Some(scope) = scope else {
            tracing::debug!("[Persistence] no active scope, write skipped");
            return Ok(());
        };
        let result = if snapshot.is_empty() {
            self.store.delete(&scope).await
        } else {
            match serde_json::to_value(&snapshot) {
                Ok(record) => self.store.set(&scope, record).await,
                Err(e) => Err(e.into()),
            }
        };
        if let Err(e) = &result {
            tracing::warn!("[Persistence] write of '{scope}' failed, memory stays authoritative: {e}");
        }
        result
    }

    pub fn snapshot(&self) -> AnnotationMap {
        self.active.read().map.clone()
    }

    pub fn state_of(&self, id: StableId) -> Option<AnnotationState> {
        self.active.read().map.get(&id).cloned()
    }

    pub fn rating_of(&self, id: StableId) -> Option<Rating> {
        self.active.read().map.get(&id).and_then(|s| s.rating)
    }

    pub fn highlight_markup_of(&self, id: StableId) -> Option<String> {
        self.active.read().map.get(&id).and_then(|s| s.highlight_html.clone())
    }
}
