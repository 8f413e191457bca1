//! Path-indexed registry of live nodes.
//!
//! The registry only maps paths to arena handles. It owns no nodes and does
//! not check parent/child consistency; the [`Mirror`](super::Mirror) keeps
//! the tree and the registry in step.

use crate::error::{MirrorError, Result};
use crate::types::{NodeId, NodePath};
use std::collections::HashMap;

/// Map from path to live node. A path is registered at most once.
#[derive(Debug, Default)]
pub struct PathRegistry {
    entries: HashMap<NodePath, NodeId>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` at `path`. An occupied path is rejected; replacing a node
    /// requires unregistering it first.
    pub fn register(&mut self, path: NodePath, id: NodeId) -> Result<()> {
        if self.entries.contains_key(&path) {
            return Err(MirrorError::DuplicatePath(path));
        }
        self.entries.insert(path, id);
        Ok(())
    }

    pub fn lookup(&self, path: &NodePath) -> Result<NodeId> {
        self.entries
            .get(path)
            .copied()
            .ok_or_else(|| MirrorError::NotFound(path.clone()))
    }

    /// Remove a path, returning the node that was registered there
    pub fn unregister(&mut self, path: &NodePath) -> Option<NodeId> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered paths, sorted
    pub fn paths(&self) -> Vec<&NodePath> {
        let mut paths: Vec<&NodePath> = self.entries.keys().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PathRegistry::new();
        let path = NodePath::from(["run1.h5", "trace"]);
        registry.register(path.clone(), NodeId(7)).unwrap();

        assert_eq!(registry.lookup(&path).unwrap(), NodeId(7));
        assert!(registry.contains(&path));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = PathRegistry::new();
        let path = NodePath::root("run1.h5");
        registry.register(path.clone(), NodeId(1)).unwrap();

        let err = registry.register(path.clone(), NodeId(2)).unwrap_err();
        assert!(matches!(err, MirrorError::DuplicatePath(p) if p == path));
        // The original entry survives
        assert_eq!(registry.lookup(&path).unwrap(), NodeId(1));
    }

    #[test]
    fn test_unregister_then_lookup_fails() {
        let mut registry = PathRegistry::new();
        let path = NodePath::root("a");
        registry.register(path.clone(), NodeId(1)).unwrap();

        assert_eq!(registry.unregister(&path), Some(NodeId(1)));
        assert!(registry.lookup(&path).unwrap_err().is_not_found());
        assert_eq!(registry.unregister(&path), None);

        // Explicit removal frees the path for reuse
        registry.register(path.clone(), NodeId(2)).unwrap();
        assert_eq!(registry.lookup(&path).unwrap(), NodeId(2));
    }

    #[test]
    fn test_no_structural_validation() {
        let mut registry = PathRegistry::new();
        // A child without its parent is accepted; consistency is the caller's job
        registry
            .register(NodePath::from(["missing", "child"]), NodeId(3))
            .unwrap();
        assert_eq!(registry.paths(), vec![&NodePath::from(["missing", "child"])]);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_register_lookup_returns_same_node(
            paths in prop::collection::hash_set(
                prop::collection::vec("[a-z0-9_.]{1,8}", 1..5),
                1..40,
            )
        ) {
            let mut registry = PathRegistry::new();
            let paths: Vec<NodePath> = paths.into_iter().map(NodePath::from).collect();
            for (i, path) in paths.iter().enumerate() {
                registry.register(path.clone(), NodeId(i as u64)).unwrap();
            }
            for (i, path) in paths.iter().enumerate() {
                prop_assert_eq!(registry.lookup(path).unwrap(), NodeId(i as u64));
            }
            prop_assert_eq!(registry.len(), paths.len());
        }
    }
}
