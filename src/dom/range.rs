use super::{Document, NodeId};
use crate::error::YummyError;
use std::cmp::Ordering;

/// A boundary point. `offset` counts children for containers and characters for text nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Boundary { node, offset }
    }
}

/// A pair of boundary points with `start` not after `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        TextRange { start, end }
    }

    pub fn collapsed(at: Boundary) -> Self {
        TextRange { start: at, end: at }
    }
}

impl Document {
    /// Child-index path from the tree root, followed by the offset. Lexicographic order over these
    /// keys is document order over boundary points.
    fn boundary_key(&self, node: NodeId, offset: usize) -> Option<(NodeId, Vec<usize>)> {
        self.node(node)?;
        let mut path = vec![offset];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            path.push(self.index_in_parent(current)?);
            current = parent;
        }
        path.reverse();
        Some((current, path))
    }

    /// Document order of two boundary points; `None` if they are not in the same tree.
    pub fn compare_boundaries(&self, a: &Boundary, b: &Boundary) -> Option<Ordering> {
        let (root_a, key_a) = self.boundary_key(a.node, a.offset)?;
        let (root_b, key_b) = self.boundary_key(b.node, b.offset)?;
        if root_a != root_b {
            return None;
        }
        Some(key_a.cmp(&key_b))
    }

    pub fn validate_boundary(&self, b: &Boundary) -> Result<(), YummyError> {
        if self.node(b.node).is_none() {
            return Err(YummyError::NotFound(format!("boundary node {:?}", b.node)));
        }
        let len = self.node_len(b.node);
        if b.offset > len {
            return Err(YummyError::Range(format!(
                "offset {} exceeds length {} of {:?}",
                b.offset, len, b.node
            )));
        }
        Ok(())
    }

    /// Checks both endpoints and their order.
    pub fn validate_range(&self, range: &TextRange) -> Result<(), YummyError> {
        self.validate_boundary(&range.start)?;
        self.validate_boundary(&range.end)?;
        match self.compare_boundaries(&range.start, &range.end) {
            Some(Ordering::Greater) => Err(YummyError::Range(
                "range start is after its end".to_string(),
            )),
            Some(_) => Ok(()),
            None => Err(YummyError::Range(
                "range endpoints are in different trees".to_string(),
            )),
        }
    }

    /// The range spanning everything inside `node`.
    pub fn contents_of(&self, node: NodeId) -> TextRange {
        TextRange::new(
            Boundary::new(node, 0),
            Boundary::new(node, self.node_len(node)),
        )
    }

    pub fn is_collapsed(&self, range: &TextRange) -> bool {
        range.start == range.end
            || self.compare_boundaries(&range.start, &range.end) == Some(Ordering::Equal)
    }

    /// Whether any part of `node` lies inside `range`.
    pub fn intersects_node(&self, range: &TextRange, node: NodeId) -> bool {
        let Some(parent) = self.parent(node) else {
            return self.node(node).is_some();
        };
        let Some(index) = self.index_in_parent(node) else {
            return false;
        };
        let before = Boundary::new(parent, index);
        let after = Boundary::new(parent, index + 1);
        self.compare_boundaries(&before, &range.end) == Some(Ordering::Less)
            && self.compare_boundaries(&after, &range.start) == Some(Ordering::Greater)
    }

    /// The part of `range` inside `node`, or `None` when nothing non-empty remains.
    pub fn clip_to(&self, range: &TextRange, node: NodeId) -> Option<TextRange> {
        let bounds = self.contents_of(node);
        let start = match self.compare_boundaries(&range.start, &bounds.start)? {
            Ordering::Less => bounds.start,
            _ => range.start,
        };
        let end = match self.compare_boundaries(&range.end, &bounds.end)? {
            Ordering::Greater => bounds.end,
            _ => range.end,
        };
        match self.compare_boundaries(&start, &end)? {
            Ordering::Less => Some(TextRange::new(start, end)),
            _ => None,
        }
    }

    /// Deepest node containing both endpoints.
    pub fn common_ancestor(&self, range: &TextRange) -> Option<NodeId> {
        self.node(range.start.node)?;
        std::iter::once(range.start.node)
            .chain(self.ancestors(range.start.node))
            .find(|candidate| self.contains(*candidate, range.end.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_order_follows_document_order() {
        let doc = Document::parse("<p>ab<b>cd</b>ef</p>").unwrap();
        let p = doc.children(doc.root())[0];
        let kids = doc.children(p);
        let (ab, b, ef) = (kids[0], kids[1], kids[2]);
        let cd = doc.children(b)[0];

        let ord = |x: Boundary, y: Boundary| doc.compare_boundaries(&x, &y).unwrap();
        assert_eq!(ord(Boundary::new(ab, 2), Boundary::new(cd, 0)), Ordering::Less);
        assert_eq!(ord(Boundary::new(p, 1), Boundary::new(cd, 0)), Ordering::Less);
        assert_eq!(ord(Boundary::new(p, 2), Boundary::new(cd, 2)), Ordering::Greater);
        assert_eq!(ord(Boundary::new(ef, 0), Boundary::new(p, 2)), Ordering::Greater);
        assert_eq!(ord(Boundary::new(p, 1), Boundary::new(p, 1)), Ordering::Equal);
    }

    #[test]
    fn test_clip_and_intersection() {
        let doc = Document::parse("<p>one</p><p>two</p><p>three</p>").unwrap();
        let ps = doc.children(doc.root());
        let one = doc.children(ps[0])[0];
        let two = doc.children(ps[1])[0];
        let range = TextRange::new(Boundary::new(one, 1), Boundary::new(two, 2));

        assert!(doc.intersects_node(&range, ps[0]));
        assert!(doc.intersects_node(&range, ps[1]));
        assert!(!doc.intersects_node(&range, ps[2]));

        let clipped = doc.clip_to(&range, ps[1]).unwrap();
        assert_eq!(clipped.start, Boundary::new(ps[1], 0));
        assert_eq!(clipped.end, Boundary::new(two, 2));
        assert!(doc.clip_to(&range, ps[2]).is_none());
        assert_eq!(doc.common_ancestor(&range), Some(doc.root()));
    }

    #[test]
    fn test_validation() {
        let doc = Document::parse("<p>abc</p>").unwrap();
        let p = doc.children(doc.root())[0];
        let t = doc.children(p)[0];
        assert!(doc.validate_boundary(&Boundary::new(t, 3)).is_ok());
        assert!(doc.validate_boundary(&Boundary::new(t, 4)).is_err());
        let backwards = TextRange::new(Boundary::new(t, 2), Boundary::new(t, 1));
        assert!(doc.validate_range(&backwards).is_err());
        assert!(doc.is_collapsed(&TextRange::collapsed(Boundary::new(t, 1))));
    }
}
