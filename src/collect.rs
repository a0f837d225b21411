use crate::{
    content::{clean_text, kind_of, latest_message, DISLIKED_CLASS, HIGHLIGHT_CLASS, LIKED_CLASS},
    dom::{Document, NodeId},
    engine::AnnotationEngine,
    store::AnnotationStore,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum CollectScope {
    /// The last assistant message only.
    #[default]
    LatestReply,
    /// Every message on the page.
    Page,
}

/// Clean texts of everything the user marked, in document order and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedCollection {
    pub liked: Vec<String>,
    pub highlighted_sentences: Vec<String>,
    pub highlighted_keywords: Vec<String>,
    pub disliked: Vec<String>,
}

impl MarkedCollection {
    pub fn is_empty(&self) -> bool {
        self.liked.is_empty()
            && self.highlighted_sentences.is_empty()
            && self.highlighted_keywords.is_empty()
            && self.disliked.is_empty()
    }

    /// Whether there is anything worth building on; dislikes alone are not.
    pub fn has_positive_marks(&self) -> bool {
        !self.liked.is_empty()
            || !self.highlighted_sentences.is_empty()
            || !self.highlighted_keywords.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, text: String) {
    if !text.is_empty() && !list.contains(&text) {
        list.push(text);
    }
}

/// Rated elements under `root`, skipping copies mirrored from a rated ancestor block.
fn rated_blocks(doc: &Document, root: NodeId, class: &str) -> Vec<NodeId> {
    doc.descendants(root)
        .into_iter()
        .filter(|id| doc.has_class(*id, class))
        .filter(|id| {
            !doc.ancestors(*id)
                .into_iter()
                .any(|a| kind_of(doc, a).is_some() && doc.has_class(a, class))
        })
        .collect()
}

pub fn collect_marked(
    doc: &Document,
    scope: CollectScope,
    keyword_max_chars: usize,
) -> MarkedCollection {
    let mut collection = MarkedCollection::default();
    let root = match scope {
        CollectScope::Page => doc.root(),
        CollectScope::LatestReply => match latest_message(doc) {
            Some(message) => message,
            None => {
                tracing::info!("[Collect] no assistant reply on the page");
                return collection;
            }
        },
    };

    for block in rated_blocks(doc, root, LIKED_CLASS) {
        push_unique(&mut collection.liked, clean_text(doc, block));
    }
    for block in rated_blocks(doc, root, DISLIKED_CLASS) {
        push_unique(&mut collection.disliked, clean_text(doc, block));
    }
    for span in doc
        .descendants(root)
        .into_iter()
        .filter(|id| doc.has_class(*id, HIGHLIGHT_CLASS))
    {
        let text = clean_text(doc, span);
        if text.chars().count() > keyword_max_chars {
            push_unique(&mut collection.highlighted_sentences, text);
        } else {
            push_unique(&mut collection.highlighted_keywords, text);
        }
    }
    tracing::info!(
        "[Collect] {} liked, {} sentences, {} keywords, {} disliked",
        collection.liked.len(),
        collection.highlighted_sentences.len(),
        collection.highlighted_keywords.len(),
        collection.disliked.len()
    );
    collection
}

impl<S: AnnotationStore> AnnotationEngine<S> {
    pub fn collect(&self, scope: CollectScope) -> MarkedCollection {
        let doc = self.document.lock();
        collect_marked(&doc, scope, self.config.keyword_max_chars)
    }
}
