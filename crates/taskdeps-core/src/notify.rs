//! Blocked/unblocked transitions driven by task status changes.
//!
//! # Overview
//!
//! [`ChangeNotifier`] turns a task's status change into `Blocked` /
//! `Unblocked` transitions of its dependents. It is driven only by status
//! change reports and never polls.
//!
//! When task `T` changes status, each direct dependent `D` of `T` is
//! re-evaluated in **direct** mode with `T`'s new status pinned:
//!
//! - `T → Done`: if `D` was blocked and now has no not-done prerequisite,
//!   emit [`DependencyEvent::Unblocked`]. One fewer blocker is not a
//!   transition, so nothing is emitted while others remain.
//! - `T → NotDone`: if `D` was unblocked and is now blocked, emit
//!   [`DependencyEvent::Blocked`].
//!
//! # Prior state
//!
//! The previous state of `D` is evaluated against the current edge set with
//! `T` pinned to its previous status: `D` was blocked before iff some other
//! prerequisite is not done, or `T` itself was not done. Edges may have been
//! added or removed since the last status change, so block states are never
//! cached between calls. `T`'s previous status is taken from the record, or
//! assumed to be the opposite of the new one (the call reports a
//! transition). A repeated report of the status already recorded for `T` is
//! a no-op.
//!
//! # Failure
//!
//! A dependent whose prerequisites cannot be looked up is skipped. The
//! remaining dependents are still
//! processed, and the caller receives every event produced alongside the
//! list of failures.

use std::collections::HashMap;

use crate::error::RecomputeFailure;
use crate::graph::adjacency::GraphStore;
use crate::graph::blocking::BlockingResolver;
use crate::model::{BlockingMode, DependencyEvent, TaskId, TaskStatus};
use crate::status::{StatusOverlay, TaskStatusSource};

/// Per-dependent blocking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Blocked,
    Unblocked,
}

impl BlockState {
    const fn from_blocked(blocked: bool) -> Self {
        if blocked { Self::Blocked } else { Self::Unblocked }
    }
}

/// Result of processing one status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recomputation {
    pub events: Vec<DependencyEvent>,
    pub failures: Vec<RecomputeFailure>,
}

impl Recomputation {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tracks task statuses and turns status changes into events.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    statuses: HashMap<TaskId, TaskStatus>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `task`'s status without emitting anything.
    pub fn observe_status(&mut self, task: TaskId, status: TaskStatus) {
        self.statuses.insert(task, status);
    }

    /// Recorded status of `task`, if any.
    #[must_use]
    pub fn recorded_status(&self, task: &TaskId) -> Option<TaskStatus> {
        self.statuses.get(task).copied()
    }

    /// Drop everything recorded about `task` (used when it is deleted).
    pub fn forget(&mut self, task: &TaskId) {
        self.statuses.remove(task);
    }

    /// Process `task` moving to `new_status`.
    pub fn on_status_changed<S>(
        &mut self,
        graph: &GraphStore,
        statuses: &S,
        task: &TaskId,
        new_status: TaskStatus,
    ) -> Recomputation
    where
        S: TaskStatusSource + ?Sized,
    {
        let previous = self
            .statuses
            .insert(task.clone(), new_status)
            .unwrap_or_else(|| new_status.toggled());

        if previous == new_status {
            tracing::debug!(task = %task, status = %new_status, "status unchanged; no events");
            return Recomputation::default();
        }

        let overlay = StatusOverlay::new(statuses, task, new_status);
        let resolver = BlockingResolver::new(graph, &overlay);

        let mut result = Recomputation::default();
        for dependent in resolver.blocked_tasks(task) {
            let blockers = match resolver.blocking_tasks(&dependent) {
                Ok(blockers) => blockers,
                Err(error) => {
                    tracing::warn!(task = %dependent, %error, "could not recompute blocking state");
                    result.failures.push(RecomputeFailure {
                        task_id: dependent,
                        error,
                    });
                    continue;
                }
            };

            let now = BlockState::from_blocked(!blockers.is_empty());
            let others_blocking = blockers.iter().any(|b| b != task);
            let before = BlockState::from_blocked(others_blocking || !previous.is_done());

            let event = match (before, now, new_status) {
                (BlockState::Blocked, BlockState::Unblocked, TaskStatus::Done) => {
                    Some(DependencyEvent::Unblocked {
                        task_id: dependent.clone(),
                        resolved_task_id: task.clone(),
                    })
                }
                (BlockState::Unblocked, BlockState::Blocked, TaskStatus::NotDone) => {
                    Some(DependencyEvent::Blocked {
                        task_id: dependent.clone(),
                        blocking_task_id: task.clone(),
                        blocking_task_ids: blockers,
                    })
                }
                _ => None,
            };

            if let Some(event) = event {
                tracing::debug!(%event, "dependency state transition");
                result.events.push(event);
            }
        }

        result
    }
}
