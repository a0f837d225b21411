//! Change-feed processing.
//!
//! The host re-renders messages at will, so annotations shown on the page drift away from the
//! persisted state. A processing pass re-derives addressing from scratch, reapplies persisted
//! ratings and highlight snapshots to whatever nodes currently hold each stable id, and attaches
//! rating affordances to blocks that lack them. Running a pass on an unchanged page changes
//! nothing.
//!
//! [`ChangeFeed`] drives passes from the document's structural change notifications, coalescing
//! bursts until the configured quiet period has elapsed.

use crate::{
    address::Addressing,
    content::{
        content_nodes, kind_of, CONTAINER_CLASS, EMOJI_DISLIKE, EMOJI_LIKE, HIGHLIGHT_CLASS,
        PROCESSED_ATTR, RATING_ATTR, RATING_BAR_CLASS, RATING_BUTTON_CLASS,
    },
    dom::{Document, DocumentChange, Element, NodeId},
    engine::AnnotationEngine,
    error::YummyError,
    event::AnnotationEvent,
    highlight::spans_in,
    persistence::Persistence,
    rating::{apply_rating_classes, rating_from_classes, Rating},
    store::AnnotationStore,
};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, sync::Arc};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    /// Blocks whose rating classes were rewritten.
    pub reapplied: usize,
    /// Blocks rebuilt from a highlight snapshot.
    pub restored: usize,
    /// Blocks that received a rating bar.
    pub attached: usize,
}

impl ProcessReport {
    pub fn is_quiet(&self) -> bool {
        *self == ProcessReport::default()
    }
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reapplied, {} restored, {} attached",
            self.reapplied, self.restored, self.attached
        )
    }
}

impl<S: AnnotationStore> AnnotationEngine<S> {
    /// One processing pass. Runs under the mutation lock so it never observes a half-applied
    /// highlight.
    #[tracing::instrument(skip_all)]
    pub async fn process(&self) -> ProcessReport {
        let _guard = self.lock.acquire("process").await;
        let report = {
            let mut doc = self.document.lock();
            let mut addressing = self.addressing.lock();
            let report = reconcile(&mut doc, &mut addressing, &self.persistence);
            tracing::trace!("[Feed] arena holds {} nodes", doc.arena_len());
            report
        };
        if !report.is_quiet() {
            tracing::debug!("[Feed] pass finished: {report}");
            self.emit(AnnotationEvent::Processed(report));
        }
        report
    }
}

fn reconcile<S: AnnotationStore>(
    doc: &mut Document,
    addressing: &mut Addressing,
    persistence: &Persistence<S>,
) -> ProcessReport {
    let mut report = ProcessReport::default();
    addressing.invalidate();

    let mut queue: VecDeque<NodeId> = content_nodes(doc).into();
    while let Some(node) = queue.pop_front() {
        if !doc.is_attached(node) {
            // replaced by a snapshot restore earlier in this pass
            continue;
        }
        let Some(id) = addressing.resolve(doc, node) else {
            continue;
        };
        let state = persistence.state_of(id).unwrap_or_default();

        if rating_from_classes(doc, node) != state.rating
            && (state.rating.is_some() || !has_rated_ancestor(doc, node))
        {
            apply_rating_classes(doc, node, state.rating);
            report.reapplied += 1;
        }

        let Some(html) = state.highlight_html.as_deref() else {
            continue;
        };
        if !spans_in(doc, node).is_empty() || !html.contains(HIGHLIGHT_CLASS) {
            continue;
        }
        match doc.set_inner_html(node, html) {
            Ok(_) => {
                if let Some(rating) = state.rating {
                    apply_rating_classes(doc, node, Some(rating));
                }
                addressing.invalidate();
                report.restored += 1;
                tracing::debug!("[Feed] restored highlights of {id}");
                // nested blocks rebuilt by the restore still need their own ratings
                let rebuilt: Vec<NodeId> = doc
                    .descendants(node)
                    .into_iter()
                    .filter(|d| kind_of(doc, *d).is_some())
                    .collect();
                for nested in rebuilt.into_iter().rev() {
                    queue.push_front(nested);
                }
            }
            Err(e) => tracing::warn!("[Feed] could not restore highlights of {id}: {e}"),
        }
    }

    for node in content_nodes(doc) {
        if has_affordance(doc, node) {
            continue;
        }
        match attach_affordance(doc, node) {
            Ok(()) => report.attached += 1,
            Err(e) => tracing::warn!("[Feed] could not attach rating bar to {node:?}: {e}"),
        }
    }
    report
}

fn has_rated_ancestor(doc: &Document, node: NodeId) -> bool {
    doc.ancestors(node)
        .into_iter()
        .filter(|a| kind_of(doc, *a).is_some())
        .any(|a| rating_from_classes(doc, a).is_some())
}

fn bar_among(doc: &Document, parent: NodeId) -> bool {
    doc.children(parent)
        .into_iter()
        .any(|child| doc.has_class(child, RATING_BAR_CLASS))
}

/// List items hold their bar as last child; every other block sits in a wrapper container next
/// to its bar.
fn has_affordance(doc: &Document, node: NodeId) -> bool {
    if doc.tag(node) == Some("li") {
        return bar_among(doc, node);
    }
    doc.parent(node)
        .filter(|parent| doc.has_class(*parent, CONTAINER_CLASS))
        .map(|parent| bar_among(doc, parent))
        .unwrap_or(false)
}

fn rating_bar(doc: &mut Document) -> Result<NodeId, YummyError> {
    let bar = doc.create_element(Element::new("div").with_class(RATING_BAR_CLASS));
    for (rating, emoji) in [(Rating::Liked, EMOJI_LIKE), (Rating::Disliked, EMOJI_DISLIKE)] {
        let button = doc.create_element(
            Element::new("span")
                .with_class(RATING_BUTTON_CLASS)
                .with_attr(RATING_ATTR, rating.as_str()),
        );
        let label = doc.create_text(emoji);
        doc.append_child(button, label)?;
        doc.append_child(bar, button)?;
    }
    Ok(bar)
}

fn attach_affordance(doc: &mut Document, node: NodeId) -> Result<(), YummyError> {
    doc.set_attr(node, PROCESSED_ATTR, "true");
    let bar = rating_bar(doc)?;
    if doc.tag(node) == Some("li") {
        // a wrapper div is not a valid list child
        return doc.append_child(node, bar);
    }
    if let Some(container) = doc
        .parent(node)
        .filter(|parent| doc.has_class(*parent, CONTAINER_CLASS))
    {
        return doc.append_child(container, bar);
    }
    let container = doc.create_element(Element::new("div").with_class(CONTAINER_CLASS));
    doc.insert_before(node, container)?;
    doc.append_child(container, node)?;
    doc.append_child(container, bar)
}

/// Background task running processing passes after document changes settle.
pub struct ChangeFeed {
    handle: JoinHandle<()>,
}

impl ChangeFeed {
    pub fn spawn<S>(
        engine: Arc<AnnotationEngine<S>>,
        mut changes: UnboundedReceiver<DocumentChange>,
    ) -> ChangeFeed
    where
        S: AnnotationStore + 'static,
    {
        let quiet = engine.config().debounce();
        let handle = tokio::spawn(async move {
            tracing::debug!("[Feed] started, quiet period {quiet:?}");
            while changes.recv().await.is_some() {
                let mut batch = 1usize;
                let mut closed = false;
                loop {
                    match tokio::time::timeout(quiet, changes.recv()).await {
                        Ok(Some(_)) => batch += 1,
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }
                tracing::trace!("[Feed] {batch} change(s) settled");
                engine.process().await;
                if closed {
                    break;
                }
            }
            tracing::debug!("[Feed] change source closed, stopping");
        });
        ChangeFeed { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the feed to finish, which happens once the document stops reporting changes.
    pub async fn join(self) -> Result<(), YummyError> {
        self.handle
            .await
            .map_err(|e| YummyError::Channel(format!("change feed task failed: {e}")))
    }
}
