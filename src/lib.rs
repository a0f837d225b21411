//! # yummy-core
//!
//! An annotation engine for AI chat transcripts: mark assistant-written blocks as liked or
//! disliked, highlight arbitrary text runs, and keep those marks attached while the host page
//! re-renders its messages.
//!
//! ## Overview
//!
//! Chat front ends stream and re-render replies constantly, destroying and recreating the nodes
//! that hold a message's paragraphs. yummy-core mirrors the page as a [`dom::Document`] and keeps
//! annotations keyed by *stable ids* (message ordinal, block ordinal) instead of node identity. A
//! debounced change feed replays the persisted state onto whatever nodes currently carry each id.
//!
//! ### Key Features
//!
//! - **Stable addressing**: ids derived from ordinal structure survive node recreation
//! - **Escalating heading ratings**: a heading click rates the heading, a second click the whole
//!   section it governs, a third clears it
//! - **Highlight algebra**: overlapping and touching highlights merge into one span, spans never
//!   nest and are never adjacent
//! - **Serialized mutation**: a FIFO async lock orders all highlight changes and feed passes
//! - **Per-conversation persistence**: one JSON record per conversation, replayed on switch
//!
//! ## Architecture
//!
//! - **[`dom`]**: live document tree, markup import/export, boundary points and ranges
//! - **[`content`]**: which nodes are annotatable content, governed sections, injected UI markers
//! - **[`address`]**: [`address::StableId`] and the per-message ordinal cache
//! - **[`rating`]**: toggle and heading escalation state machine
//! - **[`highlight`]**: the range algebra over highlight spans
//! - **[`lock`]**: the mutation serializer
//! - **[`store`]** and **[`persistence`]**: record storage and the in-memory annotation map
//! - **[`feed`]**: processing passes and the debounced change feed task
//! - **[`engine`]**: [`engine::AnnotationEngine`], tying everything together
//! - **[`collect`]**: gathering marked texts for downstream use
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yummy_core::{
//!     config::EngineConfig, dom::Document, engine::AnnotationEngine, feed::ChangeFeed,
//!     persistence::ConversationScope, store::MemoryStore,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut doc = Document::parse(
//!         r#"<main><div data-message-author-role="assistant"><p>Hello!</p></div></main>"#,
//!     )?;
//!     let changes = doc.observed();
//!     let engine = Arc::new(AnnotationEngine::new(
//!         doc.into_shared(),
//!         MemoryStore::new(),
//!         EngineConfig::default(),
//!     ));
//!     let _feed = ChangeFeed::spawn(engine.clone(), changes);
//!
//!     let scope = ConversationScope::from_location("https://chat.example.com/c/abc123")?;
//!     let report = engine.switch_scope(scope).await;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod collect;
pub mod config;
pub mod content;
pub mod dom;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod highlight;
pub mod lock;
pub mod persistence;
pub mod rating;
pub mod selection;
pub mod store;
#[cfg(test)]
mod tests;

pub use error::*;
