//! The annotation engine: user-interaction entry points and read accessors.
//!
//! Lock order inside the engine is document, then addressing, then rating machine, then the
//! persistence map. The synchronous document guard is never held across an await; range
//! mutations additionally run under the [`MutationLock`] for their whole critical section,
//! including the store write.

use crate::{
    address::{Addressing, StableId},
    config::EngineConfig,
    content::{
        governed_section, kind_of, CONTAINER_CLASS, FLASH_CLASS, RATING_ATTR, RATING_BAR_CLASS,
    },
    dom::{NodeId, SharedDocument, TextRange},
    error::YummyError,
    event::AnnotationEvent,
    highlight::{self, check_selection, highlight_markup, HighlightOutcome},
    lock::MutationLock,
    persistence::{ConversationScope, Persistence, StateChange},
    rating::{apply_rating_classes, toggle, ParentRatingState, Rating, RatingMachine},
    selection::SelectionSource,
    store::AnnotationStore,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

pub struct AnnotationEngine<S> {
    pub(crate) document: SharedDocument,
    pub(crate) config: EngineConfig,
    pub(crate) addressing: Mutex<Addressing>,
    pub(crate) ratings: Mutex<RatingMachine>,
    pub(crate) persistence: Persistence<S>,
    pub(crate) lock: MutationLock,
    pub(crate) events: Option<UnboundedSender<AnnotationEvent>>,
}

impl<S: AnnotationStore> AnnotationEngine<S> {
    pub fn new(document: SharedDocument, store: S, config: EngineConfig) -> Self {
        AnnotationEngine {
            document,
            config,
            addressing: Mutex::new(Addressing::new()),
            ratings: Mutex::new(RatingMachine::new()),
            persistence: Persistence::new(store),
            lock: MutationLock::new(),
            events: None,
        }
    }

    pub fn with_events(
        document: SharedDocument,
        store: S,
        config: EngineConfig,
        tx: UnboundedSender<AnnotationEvent>,
    ) -> Self {
        let mut engine = Self::new(document, store, config);
        engine.events = Some(tx);
        engine
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn lock(&self) -> &MutationLock {
        &self.lock
    }

    pub(crate) fn emit(&self, event: AnnotationEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event).map_err(YummyError::from) {
                tracing::debug!("[Engine] {e}");
            }
        }
    }

    /// Loads the record of `scope`, forgets heading working state and replays the record onto the
    /// page.
    pub async fn switch_scope(&self, scope: ConversationScope) -> crate::feed::ProcessReport {
        tracing::info!("[Engine] switching to conversation '{scope}'");
        self.persistence.load(scope.clone()).await;
        self.ratings.lock().clear();
        self.addressing.lock().invalidate();
        self.emit(AnnotationEvent::ScopeSwitched(scope));
        self.process().await
    }

    pub fn resolve_id(&self, node: NodeId) -> Option<StableId> {
        let doc = self.document.lock();
        let id = self.addressing.lock().resolve(&doc, node);
        id
    }

    pub fn node_for(&self, id: StableId) -> Option<NodeId> {
        let doc = self.document.lock();
        let node = self.addressing.lock().node_for(&doc, id);
        node
    }

    pub fn rating_of(&self, id: StableId) -> Option<Rating> {
        self.persistence.rating_of(id)
    }

    pub fn highlight_markup_of(&self, id: StableId) -> Option<String> {
        self.persistence.highlight_markup_of(id)
    }

    pub fn heading_state(&self, id: StableId) -> ParentRatingState {
        self.ratings.lock().state(id)
    }

    /// Handles a click on a rating button: the bar's block is rated with the button's value.
    pub async fn press(&self, button: NodeId) -> Result<Vec<(StableId, Option<Rating>)>, YummyError> {
        let (target, clicked) = {
            let doc = self.document.lock();
            let clicked = doc
                .attr(button, RATING_ATTR)
                .and_then(Rating::parse)
                .ok_or_else(|| YummyError::NotFound(format!("rating button {button:?}")))?;
            let bar = doc
                .parent(button)
                .filter(|bar| doc.has_class(*bar, RATING_BAR_CLASS))
                .ok_or_else(|| YummyError::NotFound(format!("rating bar of {button:?}")))?;
            let holder = doc
                .parent(bar)
                .ok_or_else(|| YummyError::NotFound(format!("block of {bar:?}")))?;
            let target = if doc.has_class(holder, CONTAINER_CLASS) {
                doc.children(holder)
                    .into_iter()
                    .find(|child| kind_of(&doc, *child).is_some())
                    .ok_or_else(|| YummyError::NotFound(format!("block in {holder:?}")))?
            } else {
                holder
            };
            (target, clicked)
        };
        self.rate(target, clicked).await
    }

    /// Rates a block. Headings run the escalation protocol over their governed section, other
    /// blocks toggle. All resulting changes are committed as one batch; returns them.
    pub async fn rate(
        &self,
        node: NodeId,
        clicked: Rating,
    ) -> Result<Vec<(StableId, Option<Rating>)>, YummyError> {
        let (changes, flashed) = {
            let mut doc = self.document.lock();
            let mut addressing = self.addressing.lock();
            let id = addressing
                .resolve(&doc, node)
                .ok_or_else(|| YummyError::NotFound(format!("stable id of {node:?}")))?;
            let is_heading = kind_of(&doc, node)
                .and_then(|k| k.heading_level())
                .is_some();

            let mut changes = Vec::new();
            let mut flashed = Vec::new();
            if is_heading {
                let transition = self.ratings.lock().click(id, clicked);
                tracing::debug!("[Rating] heading {id} -> {transition:?}");
                let section = governed_section(&doc, node);
                apply_rating_classes(&mut doc, node, transition.heading_rating());
                changes.push((id, transition.heading_rating()));
                for child in section {
                    apply_rating_classes(&mut doc, child, transition.section_rating());
                    if let Some(child_id) = addressing.resolve(&doc, child) {
                        changes.push((child_id, transition.section_rating()));
                    }
                    if transition.flashes_section() {
                        doc.add_class(child, FLASH_CLASS);
                        flashed.push(child);
                    }
                }
            } else {
                let next = toggle(self.persistence.rating_of(id), clicked);
                tracing::debug!("[Rating] block {id} -> {next:?}");
                apply_rating_classes(&mut doc, node, next);
                changes.push((id, next));
            }
            // staged under the document guard so a feed pass sees the whole batch or none of it
            self.persistence.stage(
                changes
                    .iter()
                    .map(|(id, rating)| (*id, StateChange::Rating(*rating))),
            );
            (changes, flashed)
        };

        if let Err(e) = self.persistence.flush().await {
            tracing::warn!("[Rating] rating kept in memory only: {e}");
        }
        for (id, rating) in changes.iter() {
            self.emit(AnnotationEvent::RatingChanged(*id, *rating));
        }
        if !flashed.is_empty() {
            self.schedule_unflash(flashed);
        }
        Ok(changes)
    }

    fn schedule_unflash(&self, nodes: Vec<NodeId>) {
        let document = self.document.clone();
        let delay = self.config.flash();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut doc = document.lock();
            for node in nodes {
                doc.remove_class(node, FLASH_CLASS);
            }
        });
    }

    /// Highlights `range`. Rejected selections leave the page untouched and are reported in the
    /// outcome.
    #[tracing::instrument(skip_all)]
    pub async fn apply_highlight(&self, range: TextRange) -> HighlightOutcome {
        let checked = {
            let doc = self.document.lock();
            check_selection(&doc, &range, &self.config.content_root)
        };
        if let Err(rejection) = checked {
            tracing::debug!("[Highlight] ignored: {rejection}");
            return HighlightOutcome {
                rejected: Some(rejection),
                ..Default::default()
            };
        }

        let _guard = self.lock.acquire("apply_highlight").await;
        let (outcome, updates) = {
            let mut doc = self.document.lock();
            let outcome = highlight::apply_highlight(&mut doc, &range);
            let mut addressing = self.addressing.lock();
            let mut updates = Vec::new();
            for block in outcome.wrapped.iter() {
                match addressing.resolve(&doc, *block) {
                    Some(id) => updates.push((id, highlight_markup(&doc, *block))),
                    None => tracing::debug!("[Highlight] block {block:?} is not addressable"),
                }
            }
            self.persistence.stage(
                updates
                    .iter()
                    .map(|(id, html)| (*id, StateChange::Highlight(html.clone()))),
            );
            (outcome, updates)
        };
        if !updates.is_empty() {
            if let Err(e) = self.persistence.flush().await {
                tracing::warn!("[Highlight] highlight kept in memory only: {e}");
            }
        }
        for (id, html) in updates {
            self.emit(AnnotationEvent::HighlightChanged(id, html.is_some()));
        }
        outcome
    }

    /// Highlights the source's current selection after the settle delay, then clears it.
    pub async fn highlight_selection<T: SelectionSource>(&self, source: &T) -> HighlightOutcome {
        tokio::time::sleep(self.config.settle_delay()).await;
        let outcome = match source.current() {
            Some(range) => self.apply_highlight(range).await,
            None => HighlightOutcome {
                rejected: Some(highlight::SelectionRejection::Collapsed),
                ..Default::default()
            },
        };
        source.clear();
        outcome
    }

    /// Removes one highlight span and records the block's new snapshot.
    pub async fn remove_highlight(&self, span: NodeId) -> Result<StableId, YummyError> {
        let _guard = self.lock.acquire("remove_highlight").await;
        let (id, html) = {
            let mut doc = self.document.lock();
            let block = highlight::remove_span(&mut doc, span)?;
            let id = self
                .addressing
                .lock()
                .resolve(&doc, block)
                .ok_or_else(|| YummyError::NotFound(format!("stable id of {block:?}")))?;
            let html = highlight_markup(&doc, block);
            self.persistence
                .stage([(id, StateChange::Highlight(html.clone()))]);
            (id, html)
        };
        if let Err(e) = self.persistence.flush().await {
            tracing::warn!("[Highlight] removal kept in memory only: {e}");
        }
        self.emit(AnnotationEvent::HighlightChanged(id, html.is_some()));
        Ok(id)
    }
}
