//! The dependency engine facade.
//!
//! # Overview
//!
//! [`DependencyEngine`] ties the pieces together over three injected
//! collaborators:
//!
//! - an [`EdgeStore`] holding committed edges,
//! - a [`TaskStatusSource`] answering "is this task done?",
//! - a [`NotificationSink`] receiving blocked/unblocked events.
//!
//! Every call works on a [`GraphStore`] snapshot loaded from the edge store.
//! By default the snapshot is rebuilt per call. With
//! [`EngineConfig::cache_adjacency`] the last snapshot is reused for as long
//! as [`EdgeStore::revision`] is unchanged. Writes always validate against a
//! fresh read.
//!
//! # Concurrency
//!
//! Mutations and status-change processing take the engine's write lock, so
//! cycle validation, persistence, and notifier updates never interleave.
//! Queries take the read lock and run concurrently with each other.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = DependencyEngine::new(MemoryEdgeStore::new(), statuses);
//! engine.create_dependency(&"2".into(), &"1".into(), DependencyType::Blocks)?;
//! assert!(engine.is_blocked(&"2".into(), BlockingMode::Direct)?.blocked);
//! let events = engine.on_task_status_changed(&"1".into(), TaskStatus::Done)?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::instrument;

use crate::config::ProjectConfig;
use crate::error::{DependencyError, StoreError};
use crate::graph::adjacency::GraphStore;
use crate::graph::blocking::BlockingResolver;
use crate::graph::cycles::{self, CycleGuard, CycleReport};
use crate::model::{
    BlockingMode, BlockingStatus, DependencyEdge, DependencyEvent, DependencyType, EdgeId, TaskId,
    TaskStatus,
};
use crate::notify::ChangeNotifier;
use crate::sink::{NoopSink, NotificationSink};
use crate::status::TaskStatusSource;
use crate::store::EdgeStore;

/// Engine behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reuse the adjacency snapshot while the store revision is unchanged.
    pub cache_adjacency: bool,
    /// Reject unknown task ids on create and status change.
    pub validate_task_ids: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_adjacency: false,
            validate_task_ids: true,
        }
    }
}

impl From<&ProjectConfig> for EngineConfig {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            cache_adjacency: config.graph.cache_adjacency,
            validate_task_ids: config.graph.validate_task_ids,
        }
    }
}

/// One requested edge in a [`DependencyEngine::create_dependencies`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDependency {
    pub from: TaskId,
    pub to: TaskId,
    pub dep_type: DependencyType,
}

impl NewDependency {
    #[must_use]
    pub fn blocks(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            dep_type: DependencyType::Blocks,
        }
    }

    #[must_use]
    pub fn relates(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            dep_type: DependencyType::RelatesTo,
        }
    }
}

/// A batch stopped at its first rejected edge. Earlier edges stay committed.
#[derive(Debug, thiserror::Error)]
#[error("dependency #{index} rejected: {source}")]
pub struct BatchError {
    /// Position of the rejected edge in the batch.
    pub index: usize,
    /// Edges committed before the failure, in batch order.
    pub committed: Vec<DependencyEdge>,
    #[source]
    pub source: DependencyError,
}

#[derive(Debug)]
struct CachedGraph {
    revision: u64,
    graph: Arc<GraphStore>,
}

/// Dependency graph engine over injected collaborators.
pub struct DependencyEngine<E, S, N = NoopSink> {
    edges: E,
    statuses: S,
    sink: N,
    config: EngineConfig,
    gate: RwLock<()>,
    cache: Mutex<Option<CachedGraph>>,
    notifier: Mutex<ChangeNotifier>,
}

impl<E, S> DependencyEngine<E, S, NoopSink>
where
    E: EdgeStore,
    S: TaskStatusSource,
{
    /// Engine with default config that discards events (they are still
    /// returned from [`Self::on_task_status_changed`]).
    pub fn new(edges: E, statuses: S) -> Self {
        Self::with_sink(edges, statuses, NoopSink)
    }
}

impl<E, S, N> DependencyEngine<E, S, N>
where
    E: EdgeStore,
    S: TaskStatusSource,
    N: NotificationSink,
{
    pub fn with_sink(edges: E, statuses: S, sink: N) -> Self {
        Self {
            edges,
            statuses,
            sink,
            config: EngineConfig::default(),
            gate: RwLock::new(()),
            cache: Mutex::new(None),
            notifier: Mutex::new(ChangeNotifier::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub const fn config(&self) -> EngineConfig {
        self.config
    }

    pub const fn edge_store(&self) -> &E {
        &self.edges
    }

    pub const fn status_source(&self) -> &S {
        &self.statuses
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Validate and commit `from → to`.
    ///
    /// # Errors
    ///
    /// - [`DependencyError::SelfDependency`] if `from == to`.
    /// - [`DependencyError::UnknownTask`] if id validation is on and either
    ///   endpoint is unknown to the status source.
    /// - [`DependencyError::DuplicateEdge`] if the same `(from, to, type)`
    ///   already exists.
    /// - [`DependencyError::CircularDependency`] if a `Blocks` edge would
    ///   close a loop.
    /// - [`DependencyError::StoreUnavailable`] if the store fails.
    ///
    /// Nothing is persisted on error.
    #[instrument(skip_all, fields(from = %from, to = %to, dep_type = %dep_type))]
    pub fn create_dependency(
        &self,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<DependencyEdge, DependencyError> {
        let _write = self.write_gate();
        let mut graph = self.load()?;
        let result = self.commit_edge(&mut graph, from, to, dep_type);
        self.invalidate_cache();
        result
    }

    /// Commit a batch of edges in order. Each edge is validated against the
    /// committed graph including the edges before it in the batch.
    ///
    /// # Errors
    ///
    /// [`BatchError`] at the first rejected edge; edges before it remain
    /// committed and are listed in [`BatchError::committed`].
    #[instrument(skip_all, fields(count = batch.len()))]
    pub fn create_dependencies(
        &self,
        batch: &[NewDependency],
    ) -> Result<Vec<DependencyEdge>, BatchError> {
        let _write = self.write_gate();
        let mut committed = Vec::with_capacity(batch.len());

        let mut graph = match self.load() {
            Ok(graph) => graph,
            Err(source) => {
                return Err(BatchError {
                    index: 0,
                    committed,
                    source,
                });
            }
        };

        for (index, item) in batch.iter().enumerate() {
            match self.commit_edge(&mut graph, &item.from, &item.to, item.dep_type) {
                Ok(edge) => committed.push(edge),
                Err(source) => {
                    self.invalidate_cache();
                    return Err(BatchError {
                        index,
                        committed,
                        source,
                    });
                }
            }
        }

        self.invalidate_cache();
        Ok(committed)
    }

    /// Delete an edge. Deleting an absent edge is a no-op returning `None`.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    #[instrument(skip_all, fields(edge = %id))]
    pub fn delete_dependency(
        &self,
        id: EdgeId,
    ) -> Result<Option<DependencyEdge>, DependencyError> {
        let _write = self.write_gate();
        let graph = self.load()?;
        let edge = graph.get(id).cloned();
        let removed = self.edges.delete(id)?;
        self.invalidate_cache();

        if removed {
            tracing::debug!(edge = %id, "dependency deleted");
            Ok(edge)
        } else {
            tracing::debug!(edge = %id, "dependency already absent");
            Ok(None)
        }
    }

    /// Cascade removal for a deleted task: drops every edge where `task` is
    /// source or target, atomically, and forgets the notifier's record of it.
    /// Returns the number of edges removed.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails; nothing is
    /// removed then.
    #[instrument(skip_all, fields(task = %task))]
    pub fn remove_task(&self, task: &TaskId) -> Result<usize, DependencyError> {
        let _write = self.write_gate();
        let removed = self.edges.delete_for_task(task)?;
        self.invalidate_cache();
        self.notifier().forget(task);
        tracing::debug!(removed, "task edges removed");
        Ok(removed)
    }

    /// Cascade removal performed by the caller's own store, for backends
    /// that delete the task row and its edges in one transaction.
    ///
    /// `remove` runs under the engine's write gate and must drop every edge
    /// touching `task`. Afterwards the snapshot cache is invalidated and, on
    /// success, the notifier forgets `task`.
    ///
    /// # Errors
    ///
    /// Whatever `remove` returns.
    #[instrument(skip_all, fields(task = %task))]
    pub fn remove_task_with<T, Err>(
        &self,
        task: &TaskId,
        remove: impl FnOnce(&TaskId) -> Result<T, Err>,
    ) -> Result<T, Err> {
        let _write = self.write_gate();
        let result = remove(task);
        self.invalidate_cache();
        if result.is_ok() {
            self.notifier().forget(task);
            tracing::debug!("task removed with its edges");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Status changes
    // -----------------------------------------------------------------------

    /// Process `task` moving to `new_status`: recompute its direct
    /// dependents, deliver resulting events to the sink, and return them.
    ///
    /// Reporting the status already recorded for `task` emits nothing.
    ///
    /// # Errors
    ///
    /// - [`DependencyError::UnknownTask`] if id validation is on and `task`
    ///   is unknown.
    /// - [`DependencyError::StoreUnavailable`] if the edges cannot be read.
    /// - [`DependencyError::PartialRecompute`] if some dependents could not
    ///   be evaluated. The events it carries were still delivered.
    #[instrument(skip_all, fields(task = %task, status = %new_status))]
    pub fn on_task_status_changed(
        &self,
        task: &TaskId,
        new_status: TaskStatus,
    ) -> Result<Vec<DependencyEvent>, DependencyError> {
        let _write = self.write_gate();
        if self.config.validate_task_ids && !self.statuses.contains(task)? {
            return Err(DependencyError::UnknownTask(task.clone()));
        }

        let graph = self.snapshot()?;
        let outcome = self
            .notifier()
            .on_status_changed(&graph, &self.statuses, task, new_status);

        for event in &outcome.events {
            self.sink.deliver(event);
        }

        if outcome.failures.is_empty() {
            Ok(outcome.events)
        } else {
            tracing::warn!(
                events = outcome.events.len(),
                failures = outcome.failures.len(),
                "partial recompute"
            );
            Err(DependencyError::PartialRecompute {
                events: outcome.events,
                failures: outcome.failures,
            })
        }
    }

    /// Record `task`'s current status without emitting events.
    ///
    /// Lets a caller that knows the status before a change (for example from
    /// its own database) seed the notifier, so the next
    /// [`Self::on_task_status_changed`] compares against the real previous
    /// status instead of assuming a transition.
    pub fn observe_status(&self, task: &TaskId, status: TaskStatus) {
        let _write = self.write_gate();
        self.notifier().observe_status(task.clone(), status);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `task` is blocked under `mode`, and by which tasks.
    ///
    /// # Errors
    ///
    /// [`DependencyError::UnknownTask`] for an unknown prerequisite,
    /// [`DependencyError::StatusUnavailable`] or
    /// [`DependencyError::StoreUnavailable`] on collaborator failure.
    #[instrument(skip_all, fields(task = %task, mode = %mode))]
    pub fn is_blocked(
        &self,
        task: &TaskId,
        mode: BlockingMode,
    ) -> Result<BlockingStatus, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        let resolver = BlockingResolver::new(&graph, &self.statuses);
        Ok(resolver.is_blocked(task, mode)?)
    }

    /// Direct prerequisites of `task` that are not done, in insertion order.
    ///
    /// # Errors
    ///
    /// Same as [`Self::is_blocked`].
    #[instrument(skip_all, fields(task = %task))]
    pub fn blocking_tasks(&self, task: &TaskId) -> Result<Vec<TaskId>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        let resolver = BlockingResolver::new(&graph, &self.statuses);
        Ok(resolver.blocking_tasks(task)?)
    }

    /// Direct dependents of `task` (tasks holding a `Blocks` edge to it).
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    #[instrument(skip_all, fields(task = %task))]
    pub fn blocked_tasks(&self, task: &TaskId) -> Result<Vec<TaskId>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        Ok(BlockingResolver::new(&graph, &self.statuses).blocked_tasks(task))
    }

    /// Outgoing edges of `task`, both types, in insertion order.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    pub fn dependencies_of(&self, task: &TaskId) -> Result<Vec<DependencyEdge>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        Ok(graph.edges_from(task).cloned().collect())
    }

    /// Incoming edges of `task` (the "blocked by" view from the other side),
    /// both types, in insertion order.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    pub fn dependents_of(&self, task: &TaskId) -> Result<Vec<DependencyEdge>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        Ok(graph.edges_to(task).cloned().collect())
    }

    /// Tasks linked to `task` by `RelatesTo` in either direction, in edge
    /// creation order, without duplicates.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    pub fn related_tasks(&self, task: &TaskId) -> Result<Vec<TaskId>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;

        let mut links: Vec<(EdgeId, &TaskId)> = graph
            .edges_from(task)
            .filter(|edge| edge.dep_type == DependencyType::RelatesTo)
            .map(|edge| (edge.id, &edge.to))
            .chain(
                graph
                    .edges_to(task)
                    .filter(|edge| edge.dep_type == DependencyType::RelatesTo)
                    .map(|edge| (edge.id, &edge.from)),
            )
            .collect();
        links.sort_unstable_by_key(|(id, _)| *id);

        let mut related: Vec<TaskId> = Vec::with_capacity(links.len());
        for (_, other) in links {
            if !related.contains(other) {
                related.push(other.clone());
            }
        }
        Ok(related)
    }

    /// Every committed edge in id order.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    pub fn edges(&self) -> Result<Vec<DependencyEdge>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        Ok(graph.edges().into_iter().cloned().collect())
    }

    /// Post-hoc cycle diagnostic over the stored `Blocks` edges. Empty unless
    /// the store was modified outside the engine.
    ///
    /// # Errors
    ///
    /// [`DependencyError::StoreUnavailable`] if the store fails.
    #[instrument(skip(self))]
    pub fn find_cycles(&self) -> Result<Vec<CycleReport>, DependencyError> {
        let _read = self.read_gate();
        let graph = self.snapshot()?;
        Ok(cycles::find_cycles(&graph))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn commit_edge(
        &self,
        graph: &mut GraphStore,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<DependencyEdge, DependencyError> {
        if from == to {
            tracing::warn!(task = %from, "rejected self dependency");
            return Err(DependencyError::SelfDependency(from.clone()));
        }

        if self.config.validate_task_ids {
            for task in [from, to] {
                if !self.statuses.contains(task)? {
                    tracing::warn!(task = %task, "rejected dependency on unknown task");
                    return Err(DependencyError::UnknownTask(task.clone()));
                }
            }
        }

        if graph.find(from, to, dep_type).is_some() {
            tracing::warn!(%from, %to, %dep_type, "rejected duplicate dependency");
            return Err(DependencyError::DuplicateEdge {
                from: from.clone(),
                to: to.clone(),
                dep_type,
            });
        }

        if let Err(err) = CycleGuard::new(graph).check(from, to, dep_type) {
            tracing::warn!(%from, %to, %err, "rejected dependency");
            return Err(err);
        }

        let edge = DependencyEdge {
            id: self.edges.next_edge_id()?,
            from: from.clone(),
            to: to.clone(),
            dep_type,
            created_at: Utc::now(),
        };

        match self.edges.insert(&edge) {
            Ok(()) => {}
            Err(StoreError::Conflict { from, to, dep_type }) => {
                return Err(DependencyError::DuplicateEdge { from, to, dep_type });
            }
            Err(err) => return Err(err.into()),
        }

        graph.add_edge(edge.clone())?;
        tracing::debug!(edge = %edge.id, %from, %to, %dep_type, "dependency committed");
        Ok(edge)
    }

    /// Fresh snapshot straight from the store.
    fn load(&self) -> Result<GraphStore, DependencyError> {
        let graph = GraphStore::from_edges(self.edges.list()?);
        tracing::debug!(edges = graph.len(), "loaded graph snapshot");
        Ok(graph)
    }

    /// Snapshot for reads, served from the cache when enabled and current.
    fn snapshot(&self) -> Result<Arc<GraphStore>, DependencyError> {
        if !self.config.cache_adjacency {
            return self.load().map(Arc::new);
        }

        let revision = self.edges.revision()?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let (Some(revision), Some(cached)) = (revision, cache.as_ref()) {
            if cached.revision == revision {
                return Ok(Arc::clone(&cached.graph));
            }
        }

        let graph = Arc::new(self.load()?);
        *cache = revision.map(|revision| CachedGraph {
            revision,
            graph: Arc::clone(&graph),
        });
        Ok(graph)
    }

    fn invalidate_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn notifier(&self) -> MutexGuard<'_, ChangeNotifier> {
        self.notifier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::sink::CollectingSink;
    use crate::status::MemoryStatusSource;
    use crate::store::memory::MemoryEdgeStore;
    use TaskStatus::{Done, NotDone};

    type Engine = DependencyEngine<Arc<MemoryEdgeStore>, Arc<MemoryStatusSource>, Arc<CollectingSink>>;

    struct Fixture {
        engine: Engine,
        store: Arc<MemoryEdgeStore>,
        statuses: Arc<MemoryStatusSource>,
        sink: Arc<CollectingSink>,
    }

    fn fixture(tasks: &[(&str, TaskStatus)]) -> Fixture {
        let store = Arc::new(MemoryEdgeStore::new());
        let statuses = Arc::new(MemoryStatusSource::with_tasks(tasks.iter().copied()));
        let sink = Arc::new(CollectingSink::new());
        let engine = DependencyEngine::with_sink(
            Arc::clone(&store),
            Arc::clone(&statuses),
            Arc::clone(&sink),
        );
        Fixture {
            engine,
            store,
            statuses,
            sink,
        }
    }

    fn id(raw: &str) -> TaskId {
        TaskId::from(raw)
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let f = fixture(&[("1", NotDone), ("2", NotDone), ("3", NotDone)]);
        let a = f
            .engine
            .create_dependency(&id("2"), &id("1"), DependencyType::Blocks)
            .unwrap();
        let b = f
            .engine
            .create_dependency(&id("3"), &id("1"), DependencyType::RelatesTo)
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(f.store.len(), 2);
    }

    #[test]
    fn rejected_edges_are_not_persisted() {
        let f = fixture(&[("a", NotDone), ("b", NotDone)]);
        f.engine
            .create_dependency(&id("a"), &id("b"), DependencyType::Blocks)
            .unwrap();

        let cycle = f
            .engine
            .create_dependency(&id("b"), &id("a"), DependencyType::Blocks)
            .unwrap_err();
        assert_eq!(cycle.code(), ErrorCode::CycleDetected);

        let dup = f
            .engine
            .create_dependency(&id("a"), &id("b"), DependencyType::Blocks)
            .unwrap_err();
        assert_eq!(dup.code(), ErrorCode::DuplicateEdge);

        let own = f
            .engine
            .create_dependency(&id("a"), &id("a"), DependencyType::RelatesTo)
            .unwrap_err();
        assert_eq!(own.code(), ErrorCode::SelfDependency);

        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn unknown_endpoint_is_rejected_when_validating() {
        let f = fixture(&[("a", NotDone)]);
        let err = f
            .engine
            .create_dependency(&id("a"), &id("ghost"), DependencyType::Blocks)
            .unwrap_err();
        assert!(matches!(err, DependencyError::UnknownTask(ref t) if t.as_str() == "ghost"));
        assert!(f.store.is_empty());
    }

    #[test]
    fn validation_can_be_disabled() {
        let f = fixture(&[]);
        let engine = f.engine.with_config(EngineConfig {
            validate_task_ids: false,
            ..EngineConfig::default()
        });
        engine
            .create_dependency(&id("x"), &id("y"), DependencyType::Blocks)
            .unwrap();
    }

    #[test]
    fn store_failure_surfaces_unchanged() {
        let f = fixture(&[("a", NotDone), ("b", NotDone)]);
        f.store.set_unavailable(Some("disk full"));
        let err = f
            .engine
            .create_dependency(&id("a"), &id("b"), DependencyType::Blocks)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn batch_sees_earlier_edges_and_reports_failure_index() {
        let f = fixture(&[("a", NotDone), ("b", NotDone), ("c", NotDone)]);
        let err = f
            .engine
            .create_dependencies(&[
                NewDependency::blocks("a", "b"),
                NewDependency::blocks("b", "c"),
                NewDependency::blocks("c", "a"),
                NewDependency::relates("a", "c"),
            ])
            .unwrap_err();

        assert_eq!(err.index, 2);
        assert_eq!(err.committed.len(), 2);
        assert!(matches!(err.source, DependencyError::CircularDependency { .. }));
        assert_eq!(f.store.len(), 2);
    }

    #[test]
    fn delete_is_idempotent() {
        let f = fixture(&[("1", NotDone), ("2", NotDone)]);
        let edge = f
            .engine
            .create_dependency(&id("2"), &id("1"), DependencyType::Blocks)
            .unwrap();

        assert_eq!(f.engine.delete_dependency(edge.id).unwrap(), Some(edge.clone()));
        assert_eq!(f.engine.delete_dependency(edge.id).unwrap(), None);
        assert!(!f.engine.is_blocked(&id("2"), BlockingMode::Direct).unwrap().blocked);
    }

    #[test]
    fn remove_task_cascades_both_directions() {
        let f = fixture(&[("a", NotDone), ("t", NotDone), ("b", NotDone)]);
        f.engine
            .create_dependencies(&[
                NewDependency::blocks("a", "t"),
                NewDependency::blocks("t", "b"),
                NewDependency::relates("b", "a"),
            ])
            .unwrap();

        assert_eq!(f.engine.remove_task(&id("t")).unwrap(), 2);
        assert!(f.engine.dependencies_of(&id("a")).unwrap().is_empty());
        assert!(f.engine.dependents_of(&id("b")).unwrap().is_empty());
        assert_eq!(f.engine.related_tasks(&id("a")).unwrap(), vec![id("b")]);
    }

    #[test]
    fn status_change_delivers_events_to_sink() {
        let f = fixture(&[("1", NotDone), ("2", NotDone)]);
        f.engine
            .create_dependency(&id("2"), &id("1"), DependencyType::Blocks)
            .unwrap();

        f.statuses.set("1", Done);
        let events = f.engine.on_task_status_changed(&id("1"), Done).unwrap();
        assert_eq!(
            events,
            vec![DependencyEvent::Unblocked {
                task_id: id("2"),
                resolved_task_id: id("1"),
            }]
        );
        assert_eq!(f.sink.take(), events);

        assert!(f.engine.on_task_status_changed(&id("1"), Done).unwrap().is_empty());
        assert!(f.sink.take().is_empty());
    }

    #[test]
    fn observed_status_suppresses_phantom_transition() {
        let f = fixture(&[("1", Done), ("2", NotDone)]);
        f.engine
            .create_dependency(&id("2"), &id("1"), DependencyType::Blocks)
            .unwrap();

        f.engine.observe_status(&id("1"), Done);
        assert!(f.engine.on_task_status_changed(&id("1"), Done).unwrap().is_empty());
    }

    #[test]
    fn partial_recompute_still_dispatches() {
        let f = fixture(&[("1", NotDone), ("2", NotDone), ("3", NotDone)]);
        let engine = f.engine.with_config(EngineConfig {
            validate_task_ids: false,
            ..EngineConfig::default()
        });
        engine
            .create_dependencies(&[
                NewDependency::blocks("2", "1"),
                NewDependency::blocks("3", "1"),
                NewDependency::blocks("3", "ghost"),
            ])
            .unwrap();

        let err = engine.on_task_status_changed(&id("1"), Done).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PartialRecompute);
        assert_eq!(err.partial_events().len(), 1);
        assert_eq!(f.sink.take(), err.partial_events());
    }

    #[test]
    fn unknown_task_status_change_is_rejected() {
        let f = fixture(&[("1", NotDone)]);
        let err = f.engine.on_task_status_changed(&id("nope"), Done).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownTask);
    }

    #[test]
    fn cached_snapshot_tracks_store_revision() {
        let f = fixture(&[("1", NotDone), ("2", NotDone), ("3", NotDone)]);
        let engine = f.engine.with_config(EngineConfig {
            cache_adjacency: true,
            validate_task_ids: true,
        });
        engine
            .create_dependency(&id("2"), &id("1"), DependencyType::Blocks)
            .unwrap();
        assert_eq!(engine.blocked_tasks(&id("1")).unwrap(), vec![id("2")]);

        // A write that bypasses the engine still invalidates via revision.
        f.store
            .insert(&DependencyEdge {
                id: EdgeId::new(100),
                from: id("3"),
                to: id("1"),
                dep_type: DependencyType::Blocks,
                created_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(engine.blocked_tasks(&id("1")).unwrap(), vec![id("2"), id("3")]);
    }

    #[test]
    fn related_tasks_deduplicates_both_directions() {
        let f = fixture(&[("a", NotDone), ("b", NotDone), ("c", NotDone)]);
        f.engine
            .create_dependencies(&[
                NewDependency::relates("a", "b"),
                NewDependency::relates("c", "a"),
                NewDependency::relates("b", "a"),
                NewDependency::blocks("a", "c"),
            ])
            .unwrap();
        assert_eq!(f.engine.related_tasks(&id("a")).unwrap(), vec![id("b"), id("c")]);
    }

    #[test]
    fn find_cycles_reports_externally_written_loops() {
        let store = MemoryEdgeStore::with_edges([
            DependencyEdge {
                id: EdgeId::new(1),
                from: id("a"),
                to: id("b"),
                dep_type: DependencyType::Blocks,
                created_at: Utc::now(),
            },
            DependencyEdge {
                id: EdgeId::new(2),
                from: id("b"),
                to: id("a"),
                dep_type: DependencyType::Blocks,
                created_at: Utc::now(),
            },
        ]);
        let engine = DependencyEngine::new(store, MemoryStatusSource::new());
        let cycles = engine.find_cycles().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members, vec![id("a"), id("b")]);
    }
}
