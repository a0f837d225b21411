use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    address::StableId, feed::ProcessReport, persistence::ConversationScope, rating::Rating,
};

/// Notifications for display layers, sent after every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationEvent {
    /// Block id, new rating
    RatingChanged(StableId, Option<Rating>),
    /// Block id, whether the block still holds any highlight
    HighlightChanged(StableId, bool),
    /// The active conversation changed and its record was loaded
    ScopeSwitched(ConversationScope),
    /// A change-feed pass finished
    Processed(ProcessReport),
}

impl AnnotationEvent {
    /// The block an event is about, if any.
    pub fn target(&self) -> Option<StableId> {
        match self {
            AnnotationEvent::RatingChanged(id, _) => Some(*id),
            AnnotationEvent::HighlightChanged(id, _) => Some(*id),
            AnnotationEvent::ScopeSwitched(_) => None,
            AnnotationEvent::Processed(_) => None,
        }
    }
}

impl Display for AnnotationEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AnnotationEvent::RatingChanged(id, Some(rating)) => {
                write!(f, "RatingChanged({id}: {rating})")
            }
            AnnotationEvent::RatingChanged(id, None) => write!(f, "RatingChanged({id}: none)"),
            AnnotationEvent::HighlightChanged(id, live) => {
                write!(f, "HighlightChanged({id}: {live})")
            }
            AnnotationEvent::ScopeSwitched(scope) => write!(f, "ScopeSwitched({scope})"),
            AnnotationEvent::Processed(report) => write!(f, "Processed({report})"),
        }
    }
}
