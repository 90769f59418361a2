//! Ordered selection set and the policy deciding what may be selected.

use crate::scene::{EntityId, NodeId};

/// Selected nodes in selection order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    members: Vec<NodeId>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.members.iter().position(|m| *m == node)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.members.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.members.last().copied()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied()
    }

    /// Append a node. Returns false if it was already selected.
    pub fn push(&mut self, node: NodeId) -> bool {
        if self.contains(node) {
            return false;
        }
        self.members.push(node);
        true
    }

    pub fn remove_at(&mut self, index: usize) -> Option<NodeId> {
        (index < self.members.len()).then(|| self.members.remove(index))
    }

    /// Remove a node, returning where it was.
    pub fn remove(&mut self, node: NodeId) -> Option<usize> {
        let index = self.position(node)?;
        self.members.remove(index);
        Some(index)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

/// Decides whether a candidate may join a selection.
pub trait SelectionPolicy: Send {
    fn should_select(&self, entity: EntityId, node: NodeId) -> bool;
}

/// Accepts every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SelectionPolicy for AcceptAll {
    fn should_select(&self, _entity: EntityId, _node: NodeId) -> bool {
        true
    }
}

impl<F> SelectionPolicy for F
where
    F: Fn(EntityId, NodeId) -> bool + Send,
{
    fn should_select(&self, entity: EntityId, node: NodeId) -> bool {
        self(entity, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_deduplicates() {
        let mut set = SelectionSet::new();
        let a = NodeId::new();
        assert!(set.push(a));
        assert!(!set.push(a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_order_preserved() {
        let mut set = SelectionSet::new();
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        set.push(a);
        set.push(b);
        set.push(c);
        assert_eq!(set.first(), Some(a));
        assert_eq!(set.last(), Some(c));

        assert_eq!(set.remove(b), Some(1));
        assert_eq!(set.as_slice(), &[a, c]);
        assert_eq!(set.remove(b), None);
        assert_eq!(set.remove_at(5), None);
        assert_eq!(set.remove_at(0), Some(a));
        assert_eq!(set.as_slice(), &[c]);
    }

    #[test]
    fn test_closure_policy() {
        let blocked = EntityId::new();
        let policy = move |entity: EntityId, _node: NodeId| entity != blocked;
        assert!(!policy.should_select(blocked, NodeId::new()));
        assert!(policy.should_select(EntityId::new(), NodeId::new()));
        assert!(AcceptAll.should_select(blocked, NodeId::new()));
    }
}
