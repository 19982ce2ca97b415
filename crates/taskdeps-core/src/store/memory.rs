//! In-process edge store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::EdgeStore;
use crate::error::StoreError;
use crate::model::{DependencyEdge, EdgeId, TaskId};

#[derive(Debug, Default)]
struct Inner {
    edges: BTreeMap<EdgeId, DependencyEdge>,
    revision: u64,
    last_id: EdgeId,
    failure: Option<String>,
}

/// Edge store backed by a mutex-guarded map.
///
/// Every successful mutation bumps the revision. [`Self::set_unavailable`]
/// makes all operations fail, which is how tests exercise
/// `StoreUnavailable` propagation.
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    inner: Mutex<Inner>,
}

impl MemoryEdgeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with edges, bypassing validation. Useful to reproduce stores that
    /// were edited outside the engine.
    pub fn with_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for edge in edges {
                inner.last_id = inner.last_id.max(edge.id);
                inner.edges.insert(edge.id, edge);
            }
            inner.revision += 1;
        }
        store
    }

    /// Make every operation fail with [`StoreError::Unavailable`], or clear
    /// the failure with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.lock().failure = reason.map(str::to_string);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().edges.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checked(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        match &inner.failure {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(inner),
        }
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn list(&self) -> Result<Vec<DependencyEdge>, StoreError> {
        Ok(self.checked()?.edges.values().cloned().collect())
    }

    fn insert(&self, edge: &DependencyEdge) -> Result<(), StoreError> {
        let mut inner = self.checked()?;
        let key = edge.key();
        if inner.edges.contains_key(&edge.id) || inner.edges.values().any(|e| e.key() == key) {
            return Err(StoreError::Conflict {
                from: edge.from.clone(),
                to: edge.to.clone(),
                dep_type: edge.dep_type,
            });
        }
        inner.last_id = inner.last_id.max(edge.id);
        inner.edges.insert(edge.id, edge.clone());
        inner.revision += 1;
        Ok(())
    }

    fn delete(&self, id: EdgeId) -> Result<bool, StoreError> {
        let mut inner = self.checked()?;
        let removed = inner.edges.remove(&id).is_some();
        if removed {
            inner.revision += 1;
        }
        Ok(removed)
    }

    fn delete_for_task(&self, task: &TaskId) -> Result<usize, StoreError> {
        let mut inner = self.checked()?;
        let before = inner.edges.len();
        inner.edges.retain(|_, edge| !edge.touches(task));
        let removed = before - inner.edges.len();
        if removed > 0 {
            inner.revision += 1;
        }
        Ok(removed)
    }

    fn next_edge_id(&self) -> Result<EdgeId, StoreError> {
        Ok(self.checked()?.last_id.next())
    }

    fn revision(&self) -> Result<Option<u64>, StoreError> {
        Ok(Some(self.checked()?.revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyType;
    use chrono::Utc;

    fn edge(id: u64, from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            id: EdgeId::new(id),
            from: from.into(),
            to: to.into(),
            dep_type: DependencyType::Blocks,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_list_delete() {
        let store = MemoryEdgeStore::new();
        store.insert(&edge(1, "a", "b")).unwrap();
        store.insert(&edge(2, "b", "c")).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);

        assert!(store.delete(EdgeId::new(1)).unwrap());
        assert!(!store.delete(EdgeId::new(1)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_key_conflicts() {
        let store = MemoryEdgeStore::new();
        store.insert(&edge(1, "a", "b")).unwrap();
        assert!(matches!(
            store.insert(&edge(2, "a", "b")),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn revision_moves_only_on_change() {
        let store = MemoryEdgeStore::new();
        let r0 = store.revision().unwrap();
        store.insert(&edge(1, "a", "b")).unwrap();
        let r1 = store.revision().unwrap();
        assert_ne!(r0, r1);

        store.delete(EdgeId::new(9)).unwrap();
        assert_eq!(store.revision().unwrap(), r1);
    }

    #[test]
    fn delete_for_task_removes_both_directions() {
        let store = MemoryEdgeStore::new();
        store.insert(&edge(1, "a", "t")).unwrap();
        store.insert(&edge(2, "t", "b")).unwrap();
        store.insert(&edge(3, "a", "b")).unwrap();

        assert_eq!(store.delete_for_task(&"t".into()).unwrap(), 2);
        let left = store.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, EdgeId::new(3));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = MemoryEdgeStore::new();
        let first = store.next_edge_id().unwrap();
        store.insert(&edge(first.get(), "a", "b")).unwrap();
        store.delete(first).unwrap();
        assert!(store.next_edge_id().unwrap() > first);
    }

    #[test]
    fn unavailable_store_fails_everything() {
        let store = MemoryEdgeStore::new();
        store.set_unavailable(Some("disk gone"));
        assert!(matches!(store.list(), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.insert(&edge(1, "a", "b")), Err(StoreError::Unavailable(_))));
        store.set_unavailable(None);
        assert!(store.list().unwrap().is_empty());
    }
}
