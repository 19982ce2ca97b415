//! Persistence collaborators for dependency edges.
//!
//! The engine is schema-agnostic: it talks to an injected [`EdgeStore`] and
//! rebuilds its adjacency from [`EdgeStore::list`]. Two implementations ship
//! with the crate:
//!
//! - [`memory::MemoryEdgeStore`]: in-process, for embedding and tests.
//! - [`sqlite::SqliteEdgeStore`]: SQLite-backed, used by the `td` CLI.
//!
//! # Cache invalidation
//!
//! [`EdgeStore::revision`] returns a counter that changes whenever the stored
//! edge set changes, through this process or any other writer. The engine
//! only reuses a cached adjacency when the revision is unchanged; stores
//! that return `None` are re-read on every call.

pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::model::{DependencyEdge, EdgeId, TaskId};

/// Injected edge persistence.
pub trait EdgeStore: Send + Sync {
    /// Every stored edge, in any order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store cannot be read.
    fn list(&self) -> Result<Vec<DependencyEdge>, StoreError>;

    /// Persist a validated edge.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the `(from, to, type)` key or id is already
    /// stored; other variants for backend failures.
    fn insert(&self, edge: &DependencyEdge) -> Result<(), StoreError>;

    /// Delete an edge by id. Returns `false` if it was already absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn delete(&self, id: EdgeId) -> Result<bool, StoreError>;

    /// Atomically delete every edge referencing `task` as source or target.
    /// Returns the number of edges removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; nothing is removed then.
    fn delete_for_task(&self, task: &TaskId) -> Result<usize, StoreError>;

    /// Id to assign to the next created edge. Strictly greater than every id
    /// ever inserted, including deleted ones, so ids order edges by creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn next_edge_id(&self) -> Result<EdgeId, StoreError>;

    /// Change counter for the stored edge set, if the store tracks one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn revision(&self) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }
}

impl<S: EdgeStore + ?Sized> EdgeStore for std::sync::Arc<S> {
    fn list(&self) -> Result<Vec<DependencyEdge>, StoreError> {
        (**self).list()
    }

    fn insert(&self, edge: &DependencyEdge) -> Result<(), StoreError> {
        (**self).insert(edge)
    }

    fn delete(&self, id: EdgeId) -> Result<bool, StoreError> {
        (**self).delete(id)
    }

    fn delete_for_task(&self, task: &TaskId) -> Result<usize, StoreError> {
        (**self).delete_for_task(task)
    }

    fn next_edge_id(&self) -> Result<EdgeId, StoreError> {
        (**self).next_edge_id()
    }

    fn revision(&self) -> Result<Option<u64>, StoreError> {
        (**self).revision()
    }
}
