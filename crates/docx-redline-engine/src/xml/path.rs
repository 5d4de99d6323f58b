use std::cmp::Ordering;

/// Child-index path from a part's root element to a descendant element.
///
/// Paths are positional: any insertion or removal among the ancestors'
/// earlier siblings invalidates them.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.to_vec()))
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Where this path points after one node is inserted at `at`.
    pub fn shifted_by_insert(&self, at: &InsertionPoint) -> NodePath {
        let depth = at.parent.0.len();
        let mut indices = self.0.clone();
        if self.starts_with(&at.parent)
            && let Some(index) = indices.get_mut(depth)
            && *index >= at.index
        {
            *index += 1;
        }
        Self(indices)
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

/// A gap between children: "before child `index` of `parent`", or the end of
/// `parent` when `index` equals its child count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub parent: NodePath,
    pub index: usize,
}

impl InsertionPoint {
    pub fn new(parent: NodePath, index: usize) -> Self {
        Self { parent, index }
    }

    /// The gap immediately before the element at `path`.
    pub fn before(path: &NodePath) -> Option<Self> {
        Some(Self::new(path.parent()?, path.last()?))
    }

    /// The gap immediately after the element at `path`.
    pub fn after(path: &NodePath) -> Option<Self> {
        Some(Self::new(path.parent()?, path.last()? + 1))
    }
}

/// Document order: comparing `parent ++ [index]` lexicographically puts a gap
/// before a child ahead of any gap inside that child.
impl Ord for InsertionPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.parent.indices().iter().chain(std::iter::once(&self.index));
        let rhs = other
            .parent
            .indices()
            .iter()
            .chain(std::iter::once(&other.index));
        lhs.cmp(rhs)
    }
}

impl PartialOrd for InsertionPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_and_last() {
        let path = NodePath::from(vec![0, 3, 2]);
        assert_eq!(path.parent(), Some(NodePath::from(vec![0, 3])));
        assert_eq!(path.last(), Some(2));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn test_shifted_by_insert_moves_later_siblings_only() {
        let at = InsertionPoint::new(NodePath::from(vec![0, 1]), 2);
        let later = NodePath::from(vec![0, 1, 3, 0]);
        let earlier = NodePath::from(vec![0, 1, 1]);
        let elsewhere = NodePath::from(vec![0, 2, 5]);
        assert_eq!(later.shifted_by_insert(&at), NodePath::from(vec![0, 1, 4, 0]));
        assert_eq!(earlier.shifted_by_insert(&at), earlier);
        assert_eq!(elsewhere.shifted_by_insert(&at), elsewhere);
        assert_eq!(
            NodePath::from(vec![0, 1]).shifted_by_insert(&at),
            NodePath::from(vec![0, 1])
        );
    }

    #[test]
    fn test_insertion_points_follow_document_order() {
        let run = NodePath::from(vec![0, 2]);
        let before = InsertionPoint::before(&run).unwrap();
        let inside = InsertionPoint::new(run.clone(), 0);
        let after = InsertionPoint::after(&run).unwrap();
        let inside_end = InsertionPoint::new(run, 4);

        assert!(before < inside);
        assert!(inside < inside_end);
        assert!(inside_end < after);
    }
}
