//! Range algebra over highlight spans.
//!
//! Inside a block, the highlight state is a set of character intervals over the block's clean
//! text (the concatenated text nodes outside injected UI). Applying a highlight clips the
//! selection to each block, folds every existing span that overlaps or touches the new interval
//! into it, unwraps those spans and wraps the merged interval in a single new span. Every mutation
//! ends with [`renormalize`], which restores the invariant that spans never nest and are never
//! adjacent siblings.

use crate::{
    content::{
        clean_markup, containing_block, content_nodes, inside_ui, is_highlight, is_ui,
        outermost_block, outermost_content, HIGHLIGHT_CLASS,
    },
    dom::{Boundary, Document, Element, NodeId, TextRange},
    error::YummyError,
};
use std::{cmp::Ordering, fmt};

/// Containers a span may not be inserted into directly.
const STRUCTURAL_TAGS: [&str; 7] = ["table", "thead", "tbody", "tfoot", "tr", "ul", "ol"];

/// Half-open character interval over a block's clean text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Self {
        Interval { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Overlapping or touching.
    pub fn meets(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn hull(&self, other: &Interval) -> Interval {
        Interval::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy)]
struct TextRun {
    node: NodeId,
    start: usize,
    len: usize,
}

impl TextRun {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// A position between two children of `parent`; `before: None` is the end of `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    parent: NodeId,
    before: Option<NodeId>,
}

/// Why a selection was ignored without touching the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRejection {
    Invalid,
    Collapsed,
    OutsideContent,
    InsideInterface,
}

impl fmt::Display for SelectionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SelectionRejection::Invalid => "selection endpoints are invalid",
            SelectionRejection::Collapsed => "selection is empty",
            SelectionRejection::OutsideContent => "selection is outside the main content",
            SelectionRejection::InsideInterface => "selection is inside the annotation interface",
        };
        write!(f, "{reason}")
    }
}

/// Per-block result of one highlight application.
#[derive(Debug, Default)]
pub struct HighlightOutcome {
    /// Blocks whose highlight state changed.
    pub wrapped: Vec<NodeId>,
    /// Blocks that could not be wrapped, with the reason. Their previous spans are restored.
    pub failed: Vec<(NodeId, YummyError)>,
    /// Set when the selection was ignored as a whole.
    pub rejected: Option<SelectionRejection>,
}

impl HighlightOutcome {
    pub fn is_empty(&self) -> bool {
        self.wrapped.is_empty() && self.failed.is_empty()
    }
}

/// Accepts a selection only if it is non-empty, inside a `content_root` element and outside
/// injected UI.
pub fn check_selection(
    doc: &Document,
    range: &TextRange,
    content_root: &str,
) -> Result<(), SelectionRejection> {
    doc.validate_range(range)
        .map_err(|_| SelectionRejection::Invalid)?;
    if doc.is_collapsed(range) {
        return Err(SelectionRejection::Collapsed);
    }
    let ancestor = doc
        .common_ancestor(range)
        .ok_or(SelectionRejection::Invalid)?;
    if doc.closest(ancestor, |el| el.tag() == content_root).is_none() {
        return Err(SelectionRejection::OutsideContent);
    }
    if inside_ui(doc, ancestor) {
        return Err(SelectionRejection::InsideInterface);
    }
    Ok(())
}

fn text_runs(doc: &Document, block: NodeId) -> Vec<TextRun> {
    fn walk(doc: &Document, id: NodeId, runs: &mut Vec<TextRun>, offset: &mut usize) {
        if let Some(text) = doc.text(id) {
            let len = text.chars().count();
            runs.push(TextRun {
                node: id,
                start: *offset,
                len,
            });
            *offset += len;
            return;
        }
        if doc.element(id).map(is_ui).unwrap_or(false) {
            return;
        }
        for child in doc.children(id) {
            walk(doc, child, runs, offset);
        }
    }
    let mut runs = Vec::new();
    let mut offset = 0;
    for child in doc.children(block) {
        walk(doc, child, &mut runs, &mut offset);
    }
    runs
}

fn total_len(runs: &[TextRun]) -> usize {
    runs.last().map(TextRun::end).unwrap_or(0)
}

/// Clean-text offset of a boundary. Boundaries outside any run map to the start of the next run.
fn offset_of(doc: &Document, runs: &[TextRun], b: &Boundary) -> Option<usize> {
    if let Some(run) = runs.iter().find(|r| r.node == b.node) {
        return Some(run.start + b.offset.min(run.len));
    }
    for run in runs {
        match doc.compare_boundaries(&Boundary::new(run.node, 0), b)? {
            Ordering::Less => continue,
            _ => return Some(run.start),
        }
    }
    Some(total_len(runs))
}

/// Text boundary at `offset`. On a run border, a start prefers the following run and an end the
/// preceding one, so wraps never pick up empty neighbours.
fn boundary_at(runs: &[TextRun], offset: usize, side: Side) -> Option<Boundary> {
    let mut live = runs.iter().filter(|r| r.len > 0);
    let found = match side {
        Side::Start => live.find(|r| r.start <= offset && offset < r.end()),
        Side::End => live.find(|r| r.start < offset && offset <= r.end()),
    };
    if let Some(run) = found {
        return Some(Boundary::new(run.node, offset - run.start));
    }
    let mut live = runs.iter().filter(|r| r.len > 0);
    match side {
        Side::Start => live
            .last()
            .filter(|r| r.end() == offset)
            .map(|r| Boundary::new(r.node, r.len)),
        Side::End => live
            .next()
            .filter(|_| offset == 0)
            .map(|r| Boundary::new(r.node, 0)),
    }
}

pub fn spans_in(doc: &Document, block: NodeId) -> Vec<NodeId> {
    doc.descendants(block)
        .into_iter()
        .filter(|id| is_highlight(doc, *id))
        .collect()
}

fn span_intervals(doc: &Document, block: NodeId, runs: &[TextRun]) -> Vec<(NodeId, Interval)> {
    spans_in(doc, block)
        .into_iter()
        .filter(|span| !inside_ui(doc, *span))
        .filter_map(|span| {
            let start = offset_of(doc, runs, &Boundary::new(span, 0))?;
            let end = offset_of(doc, runs, &Boundary::new(span, doc.node_len(span)))?;
            Some((span, Interval::new(start, end)))
        })
        .collect()
}

/// Current highlight intervals of `block`, in document order.
pub fn intervals_of(doc: &Document, block: NodeId) -> Vec<Interval> {
    let runs = text_runs(doc, block);
    span_intervals(doc, block, &runs)
        .into_iter()
        .map(|(_, interval)| interval)
        .collect()
}

/// Outermost content blocks touched by `range`. A range that touches no block directly falls back
/// to the block containing its common ancestor.
pub fn blocks_for_range(doc: &Document, range: &TextRange) -> Vec<NodeId> {
    let intersecting: Vec<NodeId> = content_nodes(doc)
        .into_iter()
        .filter(|n| doc.intersects_node(range, *n))
        .collect();
    let blocks = outermost_content(doc, &intersecting);
    if !blocks.is_empty() {
        return blocks;
    }
    doc.common_ancestor(range)
        .and_then(|ancestor| containing_block(doc, ancestor))
        .and_then(|block| outermost_block(doc, block))
        .into_iter()
        .collect()
}

/// The part of `range` inside `block`, as an interval over its clean text.
pub fn block_interval(doc: &Document, block: NodeId, range: &TextRange) -> Option<Interval> {
    let clipped = doc.clip_to(range, block)?;
    let runs = text_runs(doc, block);
    let interval = Interval::new(
        offset_of(doc, &runs, &clipped.start)?,
        offset_of(doc, &runs, &clipped.end)?,
    );
    (!interval.is_empty()).then_some(interval)
}

/// Highlights `range` in every block it touches. Per-block failures are logged and collected; the
/// remaining blocks are still processed.
#[tracing::instrument(skip_all)]
pub fn apply_highlight(doc: &mut Document, range: &TextRange) -> HighlightOutcome {
    // intervals are computed up front: merging in one block may detach the range's endpoints
    let planned: Vec<(NodeId, Interval)> = blocks_for_range(doc, range)
        .into_iter()
        .filter_map(|block| block_interval(doc, block, range).map(|iv| (block, iv)))
        .collect();

    let mut outcome = HighlightOutcome::default();
    for (block, interval) in planned {
        match apply_interval(doc, block, interval) {
            Ok(()) => outcome.wrapped.push(block),
            Err(e) => {
                tracing::warn!("[Highlight] could not wrap selection in block {block:?}: {e}");
                outcome.failed.push((block, e));
            }
        }
    }
    outcome
}

/// Merges `interval` with the block's overlapping or touching spans and wraps the result.
pub fn apply_interval(
    doc: &mut Document,
    block: NodeId,
    interval: Interval,
) -> Result<(), YummyError> {
    let runs = text_runs(doc, block);
    let existing = span_intervals(doc, block, &runs);

    let mut merged = interval;
    let mut absorbed: Vec<(NodeId, Interval)> = Vec::new();
    loop {
        let mut grew = false;
        for (span, iv) in existing.iter() {
            if absorbed.iter().any(|(s, _)| s == span) || !iv.meets(&merged) {
                continue;
            }
            merged = merged.hull(iv);
            absorbed.push((*span, *iv));
            grew = true;
        }
        if !grew {
            break;
        }
    }

    for (span, _) in absorbed.iter() {
        if doc.parent(*span).is_some() {
            doc.unwrap_element(*span)?;
        }
    }
    doc.normalize(block);

    match wrap_interval(doc, block, merged) {
        Ok(_) => renormalize(doc, block),
        Err(e) => {
            for (_, iv) in absorbed {
                if let Err(restore) = wrap_interval(doc, block, iv) {
                    tracing::error!(
                        "[Highlight] could not restore span {iv:?} in block {block:?}: {restore}"
                    );
                }
            }
            renormalize(doc, block)?;
            Err(e)
        }
    }
}

fn wrap_interval(doc: &mut Document, block: NodeId, interval: Interval) -> Result<NodeId, YummyError> {
    let runs = text_runs(doc, block);
    let start = boundary_at(&runs, interval.start, Side::Start).ok_or_else(|| {
        YummyError::Range(format!("no text at offset {} of {block:?}", interval.start))
    })?;
    let end = boundary_at(&runs, interval.end, Side::End).ok_or_else(|| {
        YummyError::Range(format!("no text at offset {} of {block:?}", interval.end))
    })?;
    wrap(doc, start, end)
}

fn common_container(doc: &Document, a: NodeId, b: NodeId) -> Option<NodeId> {
    std::iter::once(a)
        .chain(doc.ancestors(a))
        .find(|candidate| doc.contains(*candidate, b))
}

fn slot_at(doc: &mut Document, b: Boundary) -> Result<Slot, YummyError> {
    let parent = doc
        .parent(b.node)
        .ok_or_else(|| YummyError::Range(format!("boundary node {:?} is detached", b.node)))?;
    if b.offset == 0 {
        return Ok(Slot {
            parent,
            before: Some(b.node),
        });
    }
    if b.offset >= doc.node_len(b.node) {
        return Ok(Slot {
            parent,
            before: doc.next_sibling(b.node),
        });
    }
    let tail = doc.split_text(b.node, b.offset)?;
    Ok(Slot {
        parent,
        before: Some(tail),
    })
}

/// Moves `slot` up to a child position of `ceiling`, splitting partially covered inline
/// ancestors with shallow clones so their formatting is kept on both sides.
fn lift(doc: &mut Document, mut slot: Slot, ceiling: NodeId) -> Result<Slot, YummyError> {
    while slot.parent != ceiling {
        let parent = slot.parent;
        let grand = doc
            .parent(parent)
            .ok_or_else(|| YummyError::Range(format!("{parent:?} is not below {ceiling:?}")))?;
        slot = match slot.before {
            None => Slot {
                parent: grand,
                before: doc.next_sibling(parent),
            },
            Some(first) if doc.first_child(parent) == Some(first) => Slot {
                parent: grand,
                before: Some(parent),
            },
            Some(split_at) => {
                let clone = doc.shallow_clone(parent)?;
                doc.insert_after(parent, clone)?;
                let mut cursor = Some(split_at);
                while let Some(node) = cursor {
                    cursor = doc.next_sibling(node);
                    doc.append_child(clone, node)?;
                }
                Slot {
                    parent: grand,
                    before: Some(clone),
                }
            }
        };
    }
    Ok(slot)
}

/// Wraps the text between two text boundaries in a new highlight span.
fn wrap(doc: &mut Document, start: Boundary, end: Boundary) -> Result<NodeId, YummyError> {
    let start_parent = doc
        .parent(start.node)
        .ok_or_else(|| YummyError::Range("start boundary is detached".to_string()))?;
    let end_parent = doc
        .parent(end.node)
        .ok_or_else(|| YummyError::Range("end boundary is detached".to_string()))?;
    let ceiling = common_container(doc, start_parent, end_parent)
        .ok_or_else(|| YummyError::Range("boundaries share no ancestor".to_string()))?;
    if inside_ui(doc, ceiling) {
        return Err(YummyError::Range(
            "selection crosses the annotation interface".to_string(),
        ));
    }
    if let Some(tag) = doc.tag(ceiling).filter(|tag| STRUCTURAL_TAGS.contains(tag)) {
        return Err(YummyError::Range(format!(
            "cannot wrap across the children of <{tag}>"
        )));
    }

    let end_slot = slot_at(doc, end)?;
    let start_slot = slot_at(doc, start)?;
    let end_slot = lift(doc, end_slot, ceiling)?;
    let start_slot = lift(doc, start_slot, ceiling)?;

    let first = start_slot
        .before
        .filter(|first| Some(*first) != end_slot.before)
        .ok_or_else(|| YummyError::Range("selection covers no nodes".to_string()))?;

    let span = doc.create_element(Element::new("span").with_class(HIGHLIGHT_CLASS));
    doc.insert_before(first, span)?;
    let mut cursor = Some(first);
    while let Some(node) = cursor {
        if Some(node) == end_slot.before {
            break;
        }
        cursor = doc.next_sibling(node);
        doc.append_child(span, node)?;
    }

    let injected: Vec<NodeId> = doc
        .descendants(span)
        .into_iter()
        .filter(|d| doc.element(*d).map(is_ui).unwrap_or(false))
        .collect();
    for ui in injected {
        if doc.contains(span, ui) {
            doc.detach(ui);
        }
    }
    Ok(span)
}

/// Restores the span invariant inside `block`: no nested spans, no empty spans, and no two spans
/// separated only by whitespace. Runs to a fixed point.
pub fn renormalize(doc: &mut Document, block: NodeId) -> Result<(), YummyError> {
    loop {
        let mut changed = false;

        for span in spans_in(doc, block) {
            if !doc.contains(block, span) {
                continue;
            }
            let nested = doc
                .ancestors(span)
                .into_iter()
                .take_while(|a| *a != block)
                .any(|a| is_highlight(doc, a));
            if nested || doc.text_content(span).is_empty() {
                doc.unwrap_element(span)?;
                changed = true;
            }
        }

        for span in spans_in(doc, block) {
            if !doc.contains(block, span) {
                continue;
            }
            loop {
                let mut between = Vec::new();
                let mut cursor = doc.next_sibling(span);
                while let Some(node) = cursor {
                    match doc.text(node) {
                        Some(text) if text.trim().is_empty() => {
                            between.push(node);
                            cursor = doc.next_sibling(node);
                        }
                        _ => break,
                    }
                }
                let Some(next) = cursor.filter(|n| is_highlight(doc, *n)) else {
                    break;
                };
                for node in between {
                    doc.append_child(span, node)?;
                }
                for child in doc.children(next) {
                    doc.append_child(span, child)?;
                }
                doc.detach(next);
                changed = true;
            }
        }

        doc.normalize(block);
        if !changed {
            return Ok(());
        }
    }
}

/// Unwraps one highlight span and renormalizes its block. Returns the block.
pub fn remove_span(doc: &mut Document, span: NodeId) -> Result<NodeId, YummyError> {
    if !is_highlight(doc, span) {
        return Err(YummyError::Range(format!("{span:?} is not a highlight")));
    }
    let block = outermost_block(doc, span)
        .ok_or_else(|| YummyError::NotFound(format!("content block of highlight {span:?}")))?;
    let parent = doc
        .parent(span)
        .ok_or_else(|| YummyError::Range(format!("highlight {span:?} is detached")))?;
    doc.unwrap_element(span)?;
    doc.normalize(parent);
    renormalize(doc, block)?;
    Ok(block)
}

/// Snapshot of a block's markup if it holds any highlight.
pub fn highlight_markup(doc: &Document, block: NodeId) -> Option<String> {
    if spans_in(doc, block).is_empty() {
        return None;
    }
    Some(clean_markup(doc, block))
}
