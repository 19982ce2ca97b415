//! In-memory adjacency over dependency edges.
//!
//! [`GraphStore`] indexes a snapshot of committed edges by task id in both
//! directions. Adjacency sets are ordered by [`EdgeId`], and edge ids are
//! allocated in creation order, so iteration is deterministic insertion
//! order. Cycle path reporting depends on that.
//!
//! The store enforces the per-edge invariants (no self-loop, no duplicate
//! `(from, to, type)`) but not acyclicity; that is the job of
//! [`CycleGuard`](super::cycles::CycleGuard), which must run before
//! [`GraphStore::add_edge`] for `Blocks` edges.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeSet, HashMap};

use crate::error::DependencyError;
use crate::model::{DependencyEdge, DependencyType, EdgeId, EdgeKey, TaskId};

/// Bidirectional adjacency index over dependency edges.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    edges: HashMap<EdgeId, DependencyEdge>,
    /// task → ids of edges where the task is `from` ("depends on").
    outgoing: HashMap<TaskId, BTreeSet<EdgeId>>,
    /// task → ids of edges where the task is `to` ("is depended on by").
    incoming: HashMap<TaskId, BTreeSet<EdgeId>>,
    by_key: HashMap<EdgeKey, EdgeId>,
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of already-committed edges.
    ///
    /// Rows that violate the per-edge invariants (duplicates, self-loops) are
    /// skipped with a warning rather than failing the whole load; the
    /// persistence layer is expected to reject them in the first place.
    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let mut store = Self::new();
        for edge in edges {
            let id = edge.id;
            if let Err(err) = store.add_edge(edge) {
                tracing::warn!(edge = %id, %err, "skipping invalid stored edge");
            }
        }
        store
    }

    /// Insert an edge.
    ///
    /// # Errors
    ///
    /// - [`DependencyError::SelfDependency`] if `from == to`.
    /// - [`DependencyError::DuplicateEdge`] if an edge with the same
    ///   `(from, to, type)` or the same id is already present.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> Result<(), DependencyError> {
        if edge.from == edge.to {
            return Err(DependencyError::SelfDependency(edge.from));
        }

        let key = edge.key();
        if self.by_key.contains_key(&key) || self.edges.contains_key(&edge.id) {
            return Err(DependencyError::DuplicateEdge {
                from: edge.from,
                to: edge.to,
                dep_type: edge.dep_type,
            });
        }

        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.id);
        self.incoming
            .entry(edge.to.clone())
            .or_default()
            .insert(edge.id);
        self.by_key.insert(key, edge.id);
        self.edges.insert(edge.id, edge);
        Ok(())
    }

    /// Remove an edge by id. Returns the removed edge, or `None` if it was
    /// already absent (not an error).
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<DependencyEdge> {
        let edge = self.edges.remove(&id)?;
        detach(&mut self.outgoing, &edge.from, id);
        detach(&mut self.incoming, &edge.to, id);
        self.by_key.remove(&edge.key());
        Some(edge)
    }

    /// Remove every edge where `task` is source or target.
    ///
    /// Returns the removed edges in id order.
    pub fn remove_all_for_task(&mut self, task: &TaskId) -> Vec<DependencyEdge> {
        let mut ids: BTreeSet<EdgeId> = BTreeSet::new();
        if let Some(out) = self.outgoing.get(task) {
            ids.extend(out.iter().copied());
        }
        if let Some(inc) = self.incoming.get(task) {
            ids.extend(inc.iter().copied());
        }

        ids.into_iter()
            .filter_map(|id| self.remove_edge(id))
            .collect()
    }

    /// Outgoing edges of `task` (what it depends on / relates to), in
    /// insertion order.
    pub fn edges_from<'a>(
        &'a self,
        task: &TaskId,
    ) -> impl Iterator<Item = &'a DependencyEdge> + use<'a> {
        iter_ids(&self.edges, self.outgoing.get(task))
    }

    /// Incoming edges of `task` (what depends on / relates to it), in
    /// insertion order.
    pub fn edges_to<'a>(
        &'a self,
        task: &TaskId,
    ) -> impl Iterator<Item = &'a DependencyEdge> + use<'a> {
        iter_ids(&self.edges, self.incoming.get(task))
    }

    /// Direct `Blocks` prerequisites of `task`, in insertion order.
    pub fn prerequisites<'a>(&'a self, task: &TaskId) -> impl Iterator<Item = &'a TaskId> + use<'a> {
        self.edges_from(task)
            .filter(|edge| edge.dep_type.is_constraining())
            .map(|edge| &edge.to)
    }

    /// Direct `Blocks` dependents of `task`, in insertion order.
    pub fn dependents<'a>(&'a self, task: &TaskId) -> impl Iterator<Item = &'a TaskId> + use<'a> {
        self.edges_to(task)
            .filter(|edge| edge.dep_type.is_constraining())
            .map(|edge| &edge.from)
    }

    /// Look up an edge by id.
    #[must_use]
    pub fn get(&self, id: EdgeId) -> Option<&DependencyEdge> {
        self.edges.get(&id)
    }

    /// Look up an edge by its `(from, to, type)` identity.
    #[must_use]
    pub fn find(&self, from: &TaskId, to: &TaskId, dep_type: DependencyType) -> Option<&DependencyEdge> {
        let key = EdgeKey {
            from: from.clone(),
            to: to.clone(),
            dep_type,
        };
        self.by_key.get(&key).and_then(|id| self.edges.get(id))
    }

    /// Every task id appearing as an endpoint, sorted.
    #[must_use]
    pub fn task_ids(&self) -> Vec<&TaskId> {
        let mut ids: Vec<&TaskId> = self
            .outgoing
            .iter()
            .chain(self.incoming.iter())
            .filter(|(_, set)| !set.is_empty())
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// All edges in id order.
    #[must_use]
    pub fn edges(&self) -> Vec<&DependencyEdge> {
        let mut all: Vec<&DependencyEdge> = self.edges.values().collect();
        all.sort_unstable_by_key(|edge| edge.id);
        all
    }

    /// Highest edge id present, if any.
    #[must_use]
    pub fn max_edge_id(&self) -> Option<EdgeId> {
        self.edges.keys().copied().max()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

fn detach(index: &mut HashMap<TaskId, BTreeSet<EdgeId>>, task: &TaskId, id: EdgeId) {
    if let Some(set) = index.get_mut(task) {
        set.remove(&id);
        if set.is_empty() {
            index.remove(task);
        }
    }
}

fn iter_ids<'a>(
    edges: &'a HashMap<EdgeId, DependencyEdge>,
    ids: Option<&'a BTreeSet<EdgeId>>,
) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
    ids.into_iter()
        .flat_map(|set| set.iter())
        .filter_map(move |id| edges.get(id))
}
