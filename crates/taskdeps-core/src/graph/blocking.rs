//! Blocking status over the Blocks subgraph.
//!
//! # Overview
//!
//! A task is **blocked** when at least one of its prerequisites is not done.
//! Two modes are supported:
//!
//! - **Direct**: only immediate `Blocks` prerequisites count. O(degree).
//! - **Transitive**: every prerequisite reachable through `Blocks` edges
//!   counts. The whole reachable subgraph is walked breadth-first and every
//!   not-done task is collected, so `by` is complete rather than merely
//!   non-empty. Done tasks are walked through: a done prerequisite can still
//!   have unfinished prerequisites of its own.
//!
//! `RelatesTo` edges never block. A task with no prerequisites is never
//! blocked, and a prerequisite whose edge was deleted no longer counts (the
//! resolver only ever sees the current snapshot).
//!
//! # Usage
//!
//! ```rust,ignore
//! let resolver = BlockingResolver::new(&graph, &statuses);
//! let status = resolver.is_blocked(&"2".into(), BlockingMode::Direct)?;
//! if status.blocked {
//!     println!("waiting on {:?}", status.by);
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashSet, VecDeque};

use super::adjacency::GraphStore;
use crate::error::StatusError;
use crate::model::{BlockingMode, BlockingStatus, TaskId};
use crate::status::TaskStatusSource;

/// Computes blocking status from a graph snapshot and a status source.
pub struct BlockingResolver<'a, S: ?Sized> {
    graph: &'a GraphStore,
    statuses: &'a S,
}

impl<'a, S: TaskStatusSource + ?Sized> BlockingResolver<'a, S> {
    pub const fn new(graph: &'a GraphStore, statuses: &'a S) -> Self {
        Self { graph, statuses }
    }

    /// Whether `task` is blocked under `mode`, and by whom.
    ///
    /// # Errors
    ///
    /// Returns the first status lookup failure. A prerequisite unknown to
    /// the status source is reported as [`StatusError::UnknownTask`].
    pub fn is_blocked(
        &self,
        task: &TaskId,
        mode: BlockingMode,
    ) -> Result<BlockingStatus, StatusError> {
        let by = match mode {
            BlockingMode::Direct => self.blocking_tasks(task)?,
            BlockingMode::Transitive => self.transitive_blockers(task)?,
        };
        Ok(BlockingStatus::from_blockers(by))
    }

    /// Direct prerequisites of `task` that are not done, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns the first status lookup failure.
    pub fn blocking_tasks(&self, task: &TaskId) -> Result<Vec<TaskId>, StatusError> {
        let mut blockers = Vec::new();
        for prereq in self.graph.prerequisites(task) {
            if !self.statuses.status(prereq)?.is_done() {
                blockers.push(prereq.clone());
            }
        }
        Ok(blockers)
    }

    /// Direct dependents of `task`: tasks holding a `Blocks` edge to it.
    ///
    /// These are the tasks to re-evaluate when `task` changes status. No
    /// status lookup is needed.
    #[must_use]
    pub fn blocked_tasks(&self, task: &TaskId) -> Vec<TaskId> {
        self.graph.dependents(task).cloned().collect()
    }

    /// Every not-done task reachable from `task` through `Blocks` edges,
    /// nearest first.
    fn transitive_blockers(&self, task: &TaskId) -> Result<Vec<TaskId>, StatusError> {
        let mut blockers = Vec::new();
        let mut visited: HashSet<&TaskId> = HashSet::new();
        let mut queue: VecDeque<&TaskId> = VecDeque::new();

        visited.insert(task);
        queue.extend(self.graph.prerequisites(task));

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if !self.statuses.status(current)?.is_done() {
                blockers.push(current.clone());
            }
            queue.extend(
                self.graph
                    .prerequisites(current)
                    .filter(|next| !visited.contains(*next)),
            );
        }

        Ok(blockers)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, DependencyType, EdgeId, TaskStatus};
    use crate::status::MemoryStatusSource;
    use chrono::Utc;

    fn graph(edges: &[(&str, &str, DependencyType)]) -> GraphStore {
        GraphStore::from_edges(edges.iter().enumerate().map(|(i, (from, to, dep_type))| {
            DependencyEdge {
                id: EdgeId::new(i as u64 + 1),
                from: TaskId::from(*from),
                to: TaskId::from(*to),
                dep_type: *dep_type,
                created_at: Utc::now(),
            }
        }))
    }

    fn blocks(edges: &[(&str, &str)]) -> GraphStore {
        graph(
            &edges
                .iter()
                .map(|(a, b)| (*a, *b, DependencyType::Blocks))
                .collect::<Vec<_>>(),
        )
    }

    fn ids(raw: &[&str]) -> Vec<TaskId> {
        raw.iter().map(|id| TaskId::from(*id)).collect()
    }

    use DependencyType::{Blocks, RelatesTo};
    use TaskStatus::{Done, NotDone};

    #[test]
    fn task_without_prerequisites_is_never_blocked() {
        let g = GraphStore::new();
        let statuses = MemoryStatusSource::with_tasks([("1", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);

        for mode in [BlockingMode::Direct, BlockingMode::Transitive] {
            assert_eq!(resolver.is_blocked(&"1".into(), mode), Ok(BlockingStatus::unblocked()));
        }
    }

    #[test]
    fn direct_blocked_by_not_done_prerequisite() {
        let g = blocks(&[("2", "1")]);
        let statuses = MemoryStatusSource::with_tasks([("1", NotDone), ("2", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);

        let status = resolver.is_blocked(&"2".into(), BlockingMode::Direct).unwrap();
        assert!(status.blocked);
        assert_eq!(status.by, ids(&["1"]));

        statuses.set("1", Done);
        let status = resolver.is_blocked(&"2".into(), BlockingMode::Direct).unwrap();
        assert_eq!(status, BlockingStatus::unblocked());
    }

    #[test]
    fn blocking_tasks_lists_only_not_done_in_insertion_order() {
        let g = blocks(&[("t", "c"), ("t", "a"), ("t", "b")]);
        let statuses = MemoryStatusSource::with_tasks([
            ("t", NotDone),
            ("a", NotDone),
            ("b", Done),
            ("c", NotDone),
        ]);
        let resolver = BlockingResolver::new(&g, &statuses);
        assert_eq!(resolver.blocking_tasks(&"t".into()), Ok(ids(&["c", "a"])));
    }

    #[test]
    fn relates_to_never_blocks() {
        let g = graph(&[("2", "1", RelatesTo)]);
        let statuses = MemoryStatusSource::with_tasks([("1", NotDone), ("2", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);

        assert!(!resolver.is_blocked(&"2".into(), BlockingMode::Transitive).unwrap().blocked);
        assert!(resolver.blocked_tasks(&"1".into()).is_empty());
    }

    #[test]
    fn transitive_collects_complete_ancestor_set() {
        // A depends on B, B depends on C.
        let g = blocks(&[("A", "B"), ("B", "C")]);
        let statuses =
            MemoryStatusSource::with_tasks([("A", NotDone), ("B", NotDone), ("C", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);

        let status = resolver.is_blocked(&"A".into(), BlockingMode::Transitive).unwrap();
        assert_eq!(status, BlockingStatus::from_blockers(ids(&["B", "C"])));

        let direct = resolver.is_blocked(&"A".into(), BlockingMode::Direct).unwrap();
        assert_eq!(direct.by, ids(&["B"]));
    }

    #[test]
    fn transitive_walks_through_done_prerequisites() {
        let g = blocks(&[("A", "B"), ("B", "C")]);
        let statuses = MemoryStatusSource::with_tasks([("A", NotDone), ("B", Done), ("C", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);

        assert!(!resolver.is_blocked(&"A".into(), BlockingMode::Direct).unwrap().blocked);
        assert_eq!(
            resolver.is_blocked(&"A".into(), BlockingMode::Transitive).unwrap().by,
            ids(&["C"])
        );
    }

    #[test]
    fn transitive_visits_shared_ancestor_once() {
        let g = blocks(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]);
        let statuses = MemoryStatusSource::with_tasks([
            ("A", NotDone),
            ("B", NotDone),
            ("C", NotDone),
            ("D", NotDone),
        ]);
        let resolver = BlockingResolver::new(&g, &statuses);
        assert_eq!(
            resolver.is_blocked(&"A".into(), BlockingMode::Transitive).unwrap().by,
            ids(&["B", "C", "D"])
        );
    }

    #[test]
    fn blocked_tasks_lists_direct_dependents() {
        let g = graph(&[("2", "1", Blocks), ("3", "1", Blocks), ("4", "1", RelatesTo), ("5", "2", Blocks)]);
        let statuses = MemoryStatusSource::new();
        let resolver = BlockingResolver::new(&g, &statuses);
        assert_eq!(resolver.blocked_tasks(&"1".into()), ids(&["2", "3"]));
    }

    #[test]
    fn unknown_prerequisite_surfaces_error() {
        let g = blocks(&[("2", "ghost")]);
        let statuses = MemoryStatusSource::with_tasks([("2", NotDone)]);
        let resolver = BlockingResolver::new(&g, &statuses);
        assert_eq!(
            resolver.is_blocked(&"2".into(), BlockingMode::Direct),
            Err(StatusError::UnknownTask("ghost".into()))
        );
    }
}
