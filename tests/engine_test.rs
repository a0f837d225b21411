//! End-to-end engine behaviour: rating escalation, highlight merging, persistence replay across
//! page rebuilds, and the debounced change feed.

mod common;

use common::{chars, find_tag, init_logging, page, point};
use std::{sync::Arc, time::Duration};
use test_log::test;
use tokio::sync::mpsc::unbounded_channel;
use yummy_core::{
    address::StableId,
    config::EngineConfig,
    content::{clean_text, CONTAINER_CLASS, DISLIKED_CLASS, FLASH_CLASS, LIKED_CLASS},
    dom::TextRange,
    engine::AnnotationEngine,
    event::AnnotationEvent,
    feed::ChangeFeed,
    highlight::{spans_in, SelectionRejection},
    persistence::ConversationScope,
    rating::{EscalationLevel, Rating},
    selection::ManualSelection,
    store::{AnnotationStore, FileStore, MemoryStore},
};

const SECTIONED: &str = "<h2>Setup</h2><p>install</p><p>configure</p><h2>Usage</h2><p>run</p>";

fn engine_for<S: AnnotationStore>(html: &str, store: S) -> AnnotationEngine<S> {
    let doc = page(&[("user", "<p>how?</p>"), ("assistant", html)]);
    AnnotationEngine::new(doc.into_shared(), store, EngineConfig::default())
}

/// (liked, disliked) classes of the `n`-th `tag` element.
fn rating_classes<S: AnnotationStore>(
    engine: &AnnotationEngine<S>,
    tag: &str,
    n: usize,
) -> (bool, bool) {
    let doc = engine.document().lock();
    let node = find_tag(&doc, tag, n);
    (
        doc.has_class(node, LIKED_CLASS),
        doc.has_class(node, DISLIKED_CLASS),
    )
}

#[test(tokio::test)]
async fn test_heading_escalation_sequence() {
    let engine = engine_for(SECTIONED, MemoryStore::new());
    engine.switch_scope(ConversationScope::new("escalation")).await;
    let heading = {
        let doc = engine.document().lock();
        find_tag(&doc, "h2", 0)
    };
    let heading_id = StableId::new(0, 0);

    // first click rates the heading alone and flashes its section
    let changes = engine.rate(heading, Rating::Liked).await.unwrap();
    assert_eq!(
        changes,
        vec![
            (heading_id, Some(Rating::Liked)),
            (StableId::new(0, 1), None),
            (StableId::new(0, 2), None),
        ]
    );
    assert_eq!(rating_classes(&engine, "h2", 0), (true, false));
    assert_eq!(rating_classes(&engine, "p", 1), (false, false));
    {
        let doc = engine.document().lock();
        assert!(doc.has_class(find_tag(&doc, "p", 1), FLASH_CLASS));
        assert!(!doc.has_class(find_tag(&doc, "p", 3), FLASH_CLASS));
    }
    assert_eq!(
        engine.heading_state(heading_id).level,
        EscalationLevel::HeadingOnly
    );

    // same value again extends it to the section, stopping at the next h2
    engine.rate(heading, Rating::Liked).await.unwrap();
    assert_eq!(rating_classes(&engine, "p", 1), (true, false));
    assert_eq!(rating_classes(&engine, "p", 2), (true, false));
    assert_eq!(rating_classes(&engine, "p", 3), (false, false));
    assert_eq!(engine.rating_of(StableId::new(0, 2)), Some(Rating::Liked));

    // the other value flips heading and section together
    engine.rate(heading, Rating::Disliked).await.unwrap();
    assert_eq!(rating_classes(&engine, "h2", 0), (false, true));
    assert_eq!(rating_classes(&engine, "p", 2), (false, true));
    assert_eq!(
        engine.heading_state(heading_id).level,
        EscalationLevel::WholeSection
    );

    // and the same value once more clears everything
    engine.rate(heading, Rating::Disliked).await.unwrap();
    assert_eq!(rating_classes(&engine, "h2", 0), (false, false));
    assert_eq!(rating_classes(&engine, "p", 1), (false, false));
    assert_eq!(engine.rating_of(heading_id), None);
    assert_eq!(engine.heading_state(heading_id), Default::default());
    assert!(engine.persistence().snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flash_wears_off() {
    init_logging();
    let engine = engine_for(SECTIONED, MemoryStore::new());
    engine.switch_scope(ConversationScope::new("flash")).await;
    let (heading, install) = {
        let doc = engine.document().lock();
        (find_tag(&doc, "h2", 0), find_tag(&doc, "p", 1))
    };
    engine.rate(heading, Rating::Disliked).await.unwrap();
    assert!(engine.document().lock().has_class(install, FLASH_CLASS));

    tokio::time::sleep(engine.config().flash() + Duration::from_millis(50)).await;
    assert!(!engine.document().lock().has_class(install, FLASH_CLASS));
}

#[test(tokio::test)]
async fn test_simple_block_toggles_through_rating_bar() {
    let engine = engine_for("<p>one</p><ul><li>two</li></ul>", MemoryStore::new());
    let report = engine.switch_scope(ConversationScope::new("toggle")).await;
    assert_eq!(report.attached, 2);

    let (like, dislike) = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        let container = doc.parent(p).unwrap();
        assert!(doc.has_class(container, CONTAINER_CLASS));
        let bar = doc.last_child(container).unwrap();
        let buttons = doc.children(bar);
        (buttons[0], buttons[1])
    };

    engine.press(like).await.unwrap();
    assert_eq!(rating_classes(&engine, "p", 1), (true, false));
    engine.press(dislike).await.unwrap();
    assert_eq!(rating_classes(&engine, "p", 1), (false, true));
    let changes = engine.press(dislike).await.unwrap();
    assert_eq!(changes, vec![(StableId::new(0, 0), None)]);
    assert_eq!(rating_classes(&engine, "p", 1), (false, false));

    let li_like = {
        let doc = engine.document().lock();
        let li = find_tag(&doc, "li", 0);
        let bar = doc.last_child(li).unwrap();
        doc.first_child(bar).unwrap()
    };
    engine.press(li_like).await.unwrap();
    assert_eq!(rating_classes(&engine, "li", 0), (true, false));
    assert_eq!(engine.rating_of(StableId::new(0, 1)), Some(Rating::Liked));
}

#[test(tokio::test)]
async fn test_overlapping_highlights_merge() {
    let engine = engine_for("<p>say hello world typescript now</p>", MemoryStore::new());
    engine.switch_scope(ConversationScope::new("merge")).await;

    let first = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        chars(&doc, p, 4, 15)
    };
    let outcome = engine.apply_highlight(first).await;
    assert_eq!(outcome.wrapped.len(), 1);
    assert!(outcome.failed.is_empty());

    let second = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        chars(&doc, p, 10, 26)
    };
    let outcome = engine.apply_highlight(second).await;
    assert_eq!(outcome.wrapped.len(), 1);

    let doc = engine.document().lock();
    let p = find_tag(&doc, "p", 1);
    let spans = spans_in(&doc, p);
    assert_eq!(spans.len(), 1, "{}", doc.outer_html(p));
    assert_eq!(clean_text(&doc, spans[0]), "hello world typescript");
    assert_eq!(clean_text(&doc, p), "say hello world typescript now");
    let snapshot = engine.highlight_markup_of(StableId::new(0, 0)).unwrap();
    assert!(snapshot.contains("hello world typescript"));
}

#[test(tokio::test)]
async fn test_highlight_across_siblings_merges_per_block() {
    let engine = engine_for("<p>say hello world</p><p>typescript rocks</p>", MemoryStore::new());
    engine.switch_scope(ConversationScope::new("siblings")).await;

    let first = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        chars(&doc, p, 4, 15)
    };
    engine.apply_highlight(first).await;

    let across = {
        let doc = engine.document().lock();
        let p1 = find_tag(&doc, "p", 1);
        let p2 = find_tag(&doc, "p", 2);
        TextRange::new(point(&doc, p1, 10), point(&doc, p2, 10))
    };
    let outcome = engine.apply_highlight(across).await;
    assert_eq!(outcome.wrapped.len(), 2);
    assert!(outcome.failed.is_empty());

    {
        let doc = engine.document().lock();
        let p1 = find_tag(&doc, "p", 1);
        let p2 = find_tag(&doc, "p", 2);
        let first_spans = spans_in(&doc, p1);
        assert_eq!(first_spans.len(), 1, "{}", doc.outer_html(p1));
        assert_eq!(clean_text(&doc, first_spans[0]), "hello world");
        let second_spans = spans_in(&doc, p2);
        assert_eq!(second_spans.len(), 1, "{}", doc.outer_html(p2));
        assert_eq!(clean_text(&doc, second_spans[0]), "typescript");
        assert_eq!(clean_text(&doc, p1), "say hello world");
        assert_eq!(clean_text(&doc, p2), "typescript rocks");
    }
    let snapshot = engine.highlight_markup_of(StableId::new(0, 1)).unwrap();
    assert!(snapshot.contains("typescript"));
}

#[test(tokio::test)]
async fn test_rejected_selections_leave_page_alone() {
    let engine = engine_for("<p>answer</p>", MemoryStore::new());
    engine.switch_scope(ConversationScope::new("reject")).await;
    let (collapsed, before) = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        (chars(&doc, p, 2, 2), doc.inner_html(doc.root()))
    };
    let outcome = engine.apply_highlight(collapsed).await;
    assert_eq!(outcome.rejected, Some(SelectionRejection::Collapsed));
    assert!(outcome.is_empty());
    let doc = engine.document().lock();
    assert_eq!(doc.inner_html(doc.root()), before);
}

#[test(tokio::test)]
async fn test_remove_highlight_clears_snapshot() {
    let engine = engine_for("<p>alpha beta gamma</p>", MemoryStore::new());
    engine.switch_scope(ConversationScope::new("remove")).await;
    let range = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        chars(&doc, p, 6, 10)
    };
    engine.apply_highlight(range).await;
    assert!(engine.highlight_markup_of(StableId::new(0, 0)).is_some());

    let span = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        spans_in(&doc, p)[0]
    };
    let id = engine.remove_highlight(span).await.unwrap();
    assert_eq!(id, StableId::new(0, 0));
    assert_eq!(engine.highlight_markup_of(id), None);

    let doc = engine.document().lock();
    let p = find_tag(&doc, "p", 1);
    assert!(spans_in(&doc, p).is_empty());
    assert_eq!(doc.children(p).len(), 1, "text was not renormalized");
}

#[tokio::test(start_paused = true)]
async fn test_highlight_selection_consumes_selection() {
    init_logging();
    let engine = engine_for("<p>pick these words</p>", MemoryStore::new());
    engine.switch_scope(ConversationScope::new("select")).await;
    let selection = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        ManualSelection::with_range(chars(&doc, p, 5, 10))
    };

    let outcome = engine.highlight_selection(&selection).await;
    assert_eq!(outcome.wrapped.len(), 1);
    assert!(selection.is_empty());

    let outcome = engine.highlight_selection(&selection).await;
    assert_eq!(outcome.rejected, Some(SelectionRejection::Collapsed));
}

#[test(tokio::test)]
async fn test_annotations_survive_reload() {
    let store = Arc::new(MemoryStore::new());
    let scope = ConversationScope::new("reload");
    let html = "<p>first answer</p><p>second answer</p>";

    let engine = engine_for(html, store.clone());
    engine.switch_scope(scope.clone()).await;
    let (p, range) = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 2);
        (p, chars(&doc, p, 0, 6))
    };
    engine.rate(p, Rating::Liked).await.unwrap();
    engine.apply_highlight(range).await;
    assert!(store.contains(&scope));

    // a fresh page for the same conversation
    let reloaded = engine_for(html, store.clone());
    let report = reloaded.switch_scope(scope.clone()).await;
    assert_eq!(report.reapplied, 1);
    assert_eq!(report.restored, 1);
    {
        let doc = reloaded.document().lock();
        let p = find_tag(&doc, "p", 2);
        assert!(doc.has_class(p, LIKED_CLASS));
        let spans = spans_in(&doc, p);
        assert_eq!(spans.len(), 1);
        assert_eq!(clean_text(&doc, spans[0]), "second");
        assert!(!doc.has_class(find_tag(&doc, "p", 1), LIKED_CLASS));
    }

    // switching away clears the ratings shown for the old conversation
    reloaded.switch_scope(ConversationScope::new("elsewhere")).await;
    assert_eq!(rating_classes(&reloaded, "p", 2), (false, false));
    assert!(store.contains(&scope));
}

#[test(tokio::test)]
async fn test_file_store_replay() {
    let dir = tempfile::tempdir().unwrap();
    let scope = ConversationScope::from_location("https://chat.example.com/c/abc-123").unwrap();
    assert_eq!(scope.key(), "abc-123");

    let engine = engine_for("<h3>Title</h3><p>body</p>", FileStore::new(dir.path()));
    engine.switch_scope(scope.clone()).await;
    let heading = {
        let doc = engine.document().lock();
        find_tag(&doc, "h3", 0)
    };
    engine.rate(heading, Rating::Liked).await.unwrap();
    engine.rate(heading, Rating::Liked).await.unwrap();

    let store = FileStore::new(dir.path());
    assert!(store.path_for(&scope).exists());
    let replayed = engine_for("<h3>Title</h3><p>body</p>", store);
    let report = replayed.switch_scope(scope).await;
    assert_eq!(report.reapplied, 2);
    assert_eq!(rating_classes(&replayed, "h3", 0), (true, false));
    assert_eq!(rating_classes(&replayed, "p", 1), (true, false));
}

#[test(tokio::test)]
async fn test_rerendered_message_is_restored_and_pass_is_idempotent() {
    let html = "<p>streamed reply text</p><ul><li>point</li></ul>";
    let engine = engine_for(html, MemoryStore::new());
    engine.switch_scope(ConversationScope::new("rerender")).await;
    let (li, range) = {
        let doc = engine.document().lock();
        let p = find_tag(&doc, "p", 1);
        (find_tag(&doc, "li", 0), chars(&doc, p, 9, 14))
    };
    engine.rate(li, Rating::Disliked).await.unwrap();
    engine.apply_highlight(range).await;

    // the host throws away the message body and renders it again
    {
        let mut doc = engine.document().lock();
        let message = doc.parent(find_tag(&doc, "ul", 0)).unwrap();
        doc.set_inner_html(message, html).unwrap();
    }
    let report = engine.process().await;
    assert_eq!(report.reapplied, 1);
    assert_eq!(report.restored, 1);
    assert_eq!(report.attached, 2);
    {
        let doc = engine.document().lock();
        let li = find_tag(&doc, "li", 0);
        assert!(doc.has_class(li, DISLIKED_CLASS));
        let p = find_tag(&doc, "p", 1);
        let spans = spans_in(&doc, p);
        assert_eq!(spans.len(), 1);
        assert_eq!(clean_text(&doc, spans[0]), "reply");
    }

    let again = engine.process().await;
    assert!(again.is_quiet(), "second pass changed the page: {again}");
}

#[tokio::test(start_paused = true)]
async fn test_change_feed_coalesces_bursts() {
    init_logging();
    let mut doc = page(&[("assistant", "<p>first</p>")]);
    let changes = doc.observed();
    let message = find_tag(&doc, "div", 0);
    let (tx, mut events) = unbounded_channel();
    let engine = Arc::new(AnnotationEngine::with_events(
        doc.into_shared(),
        MemoryStore::new(),
        EngineConfig::default(),
        tx,
    ));
    let feed = ChangeFeed::spawn(engine.clone(), changes);

    for text in ["second", "third", "fourth"] {
        engine
            .document()
            .lock()
            .append_markup(message, &format!("<p>{text}</p>"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(engine.config().debounce() * 4).await;

    let mut passes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let AnnotationEvent::Processed(report) = event {
            passes.push(report);
        }
    }
    assert_eq!(passes.len(), 1, "{passes:?}");
    assert_eq!(passes[0].attached, 4);
    {
        let doc = engine.document().lock();
        for n in 0..4 {
            let p = find_tag(&doc, "p", n);
            assert!(doc.has_class(doc.parent(p).unwrap(), CONTAINER_CLASS));
        }
    }
    feed.abort();
}
