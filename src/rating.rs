//! Rating state machine.
//!
//! Simple blocks toggle: clicking the active rating clears it, any other click sets it. Headings
//! escalate over their governed section with a three-click protocol tracked by
//! [`ParentRatingState`]:
//!
//! | state            | click same   | click other          |
//! |------------------|--------------|----------------------|
//! | idle             | heading only | heading only         |
//! | heading only (R) | whole section| heading only (R')    |
//! | whole section (R)| clear        | flip section to R'   |
//!
//! The heading state is working state only. It is keyed by [`StableId`], never persisted, and
//! dropped when the conversation changes.

use crate::{
    address::StableId,
    content::{mirrored_descendants, DISLIKED_CLASS, LIKED_CLASS},
    dom::{Document, NodeId},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Liked,
    Disliked,
}

impl Rating {
    pub fn class(&self) -> &'static str {
        match self {
            Rating::Liked => LIKED_CLASS,
            Rating::Disliked => DISLIKED_CLASS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Liked => "liked",
            Rating::Disliked => "disliked",
        }
    }

    pub fn parse(value: &str) -> Option<Rating> {
        match value {
            "liked" => Some(Rating::Liked),
            "disliked" => Some(Rating::Disliked),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Next rating of a simple block after `clicked` is pressed.
pub fn toggle(current: Option<Rating>, clicked: Rating) -> Option<Rating> {
    if current == Some(clicked) {
        None
    } else {
        Some(clicked)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EscalationLevel {
    #[default]
    Idle,
    HeadingOnly,
    WholeSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentRatingState {
    pub rating: Option<Rating>,
    pub level: EscalationLevel,
}

/// What a heading click does to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Rate the heading, clear the section and flash it.
    HeadingOnly(Rating),
    /// Extend the heading's rating to the whole section.
    WholeSection(Rating),
    /// Re-rate heading and section with the other value.
    Flip(Rating),
    /// Clear heading and section.
    Clear,
}

impl Transition {
    pub fn heading_rating(&self) -> Option<Rating> {
        match self {
            Transition::HeadingOnly(r) | Transition::WholeSection(r) | Transition::Flip(r) => {
                Some(*r)
            }
            Transition::Clear => None,
        }
    }

    pub fn section_rating(&self) -> Option<Rating> {
        match self {
            Transition::WholeSection(r) | Transition::Flip(r) => Some(*r),
            Transition::HeadingOnly(_) | Transition::Clear => None,
        }
    }

    pub fn flashes_section(&self) -> bool {
        matches!(self, Transition::HeadingOnly(_))
    }
}

impl ParentRatingState {
    pub fn click(&mut self, clicked: Rating) -> Transition {
        if self.rating == Some(clicked) {
            if self.level == EscalationLevel::HeadingOnly {
                self.level = EscalationLevel::WholeSection;
                Transition::WholeSection(clicked)
            } else {
                *self = ParentRatingState::default();
                Transition::Clear
            }
        } else if self.level == EscalationLevel::WholeSection {
            self.rating = Some(clicked);
            Transition::Flip(clicked)
        } else {
            self.rating = Some(clicked);
            self.level = EscalationLevel::HeadingOnly;
            Transition::HeadingOnly(clicked)
        }
    }
}

/// Heading escalation state for the current conversation.
#[derive(Debug, Default)]
pub struct RatingMachine {
    headings: HashMap<StableId, ParentRatingState>,
}

impl RatingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click(&mut self, heading: StableId, clicked: Rating) -> Transition {
        let state = self.headings.entry(heading).or_default();
        let transition = state.click(clicked);
        if *state == ParentRatingState::default() {
            self.headings.remove(&heading);
        }
        transition
    }

    pub fn state(&self, heading: StableId) -> ParentRatingState {
        self.headings.get(&heading).copied().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.headings.clear();
    }
}

/// Replaces the rating classes of `node` and its mirrored descendants.
pub fn apply_rating_classes(doc: &mut Document, node: NodeId, rating: Option<Rating>) {
    let mut targets = vec![node];
    targets.extend(mirrored_descendants(doc, node));
    for target in targets {
        doc.remove_class(target, LIKED_CLASS);
        doc.remove_class(target, DISLIKED_CLASS);
        if let Some(rating) = rating {
            doc.add_class(target, rating.class());
        }
    }
}

/// The rating currently shown on `node` itself.
pub fn rating_from_classes(doc: &Document, node: NodeId) -> Option<Rating> {
    if doc.has_class(node, LIKED_CLASS) {
        Some(Rating::Liked)
    } else if doc.has_class(node, DISLIKED_CLASS) {
        Some(Rating::Disliked)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{find_tag, page};

    #[test]
    fn test_toggle() {
        assert_eq!(toggle(None, Rating::Liked), Some(Rating::Liked));
        assert_eq!(toggle(Some(Rating::Liked), Rating::Liked), None);
        assert_eq!(
            toggle(Some(Rating::Liked), Rating::Disliked),
            Some(Rating::Disliked)
        );
    }

    #[test]
    fn test_three_likes_escalate_then_clear() {
        let mut state = ParentRatingState::default();
        assert_eq!(state.click(Rating::Liked), Transition::HeadingOnly(Rating::Liked));
        assert_eq!(state.level, EscalationLevel::HeadingOnly);
        assert_eq!(state.click(Rating::Liked), Transition::WholeSection(Rating::Liked));
        assert_eq!(state.level, EscalationLevel::WholeSection);
        assert_eq!(state.click(Rating::Liked), Transition::Clear);
        assert_eq!(state, ParentRatingState::default());
    }

    #[test]
    fn test_other_rating_flips_whole_section() {
        let mut state = ParentRatingState::default();
        state.click(Rating::Liked);
        state.click(Rating::Liked);
        assert_eq!(state.click(Rating::Disliked), Transition::Flip(Rating::Disliked));
        assert_eq!(state.level, EscalationLevel::WholeSection);
        assert_eq!(state.rating, Some(Rating::Disliked));
        // same value again at whole-section level clears
        assert_eq!(state.click(Rating::Disliked), Transition::Clear);
    }

    #[test]
    fn test_other_rating_at_heading_only_restarts() {
        let mut state = ParentRatingState::default();
        state.click(Rating::Liked);
        let t = state.click(Rating::Disliked);
        assert_eq!(t, Transition::HeadingOnly(Rating::Disliked));
        assert!(t.flashes_section());
        assert_eq!(t.section_rating(), None);
        assert_eq!(state.level, EscalationLevel::HeadingOnly);
    }

    #[test]
    fn test_machine_forgets_cleared_headings() {
        let mut machine = RatingMachine::new();
        let h = StableId::new(0, 0);
        machine.click(h, Rating::Liked);
        machine.click(h, Rating::Liked);
        assert_eq!(machine.state(h).level, EscalationLevel::WholeSection);
        machine.click(h, Rating::Liked);
        assert_eq!(machine.state(h), ParentRatingState::default());
        machine.click(h, Rating::Disliked);
        machine.clear();
        assert_eq!(machine.state(h), ParentRatingState::default());
    }

    #[test]
    fn test_classes_mirror_onto_descendants() {
        let mut doc = page(&[("assistant", "<ul><li><p>a</p></li></ul>")]);
        let li = find_tag(&doc, "li", 0);
        let p = find_tag(&doc, "p", 0);
        apply_rating_classes(&mut doc, li, Some(Rating::Liked));
        assert_eq!(rating_from_classes(&doc, li), Some(Rating::Liked));
        assert_eq!(rating_from_classes(&doc, p), Some(Rating::Liked));
        apply_rating_classes(&mut doc, li, Some(Rating::Disliked));
        assert!(!doc.has_class(p, LIKED_CLASS));
        apply_rating_classes(&mut doc, li, None);
        assert_eq!(rating_from_classes(&doc, p), None);
    }
}
