//! Task completion status lookup.
//!
//! The engine never derives completion state itself; it asks a
//! [`TaskStatusSource`]. [`MemoryStatusSource`] is an in-process
//! implementation for embedding and tests; the SQLite-backed source lives in
//! [`crate::store::sqlite`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StatusError;
use crate::model::{TaskId, TaskStatus};

/// Source of truth for task completion status.
pub trait TaskStatusSource: Send + Sync {
    /// Current status of `task`.
    ///
    /// # Errors
    ///
    /// [`StatusError::UnknownTask`] if the task does not exist,
    /// [`StatusError::Unavailable`] if the source cannot be reached.
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError>;

    /// Whether `task` exists. The default asks [`Self::status`].
    ///
    /// # Errors
    ///
    /// Propagates [`StatusError::Unavailable`].
    fn contains(&self, task: &TaskId) -> Result<bool, StatusError> {
        match self.status(task) {
            Ok(_) => Ok(true),
            Err(StatusError::UnknownTask(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl<S: TaskStatusSource + ?Sized> TaskStatusSource for &S {
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError> {
        (**self).status(task)
    }

    fn contains(&self, task: &TaskId) -> Result<bool, StatusError> {
        (**self).contains(task)
    }
}

impl<S: TaskStatusSource + ?Sized> TaskStatusSource for std::sync::Arc<S> {
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError> {
        (**self).status(task)
    }

    fn contains(&self, task: &TaskId) -> Result<bool, StatusError> {
        (**self).contains(task)
    }
}

/// A view over another source with one task's status pinned.
///
/// Used while processing a status change so the recomputation sees the new
/// status whether or not the underlying source has committed it yet.
pub(crate) struct StatusOverlay<'a, S: ?Sized> {
    inner: &'a S,
    task: &'a TaskId,
    status: TaskStatus,
}

impl<'a, S: TaskStatusSource + ?Sized> StatusOverlay<'a, S> {
    pub(crate) const fn new(inner: &'a S, task: &'a TaskId, status: TaskStatus) -> Self {
        Self {
            inner,
            task,
            status,
        }
    }
}

impl<S: TaskStatusSource + ?Sized> TaskStatusSource for StatusOverlay<'_, S> {
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError> {
        if task == self.task {
            Ok(self.status)
        } else {
            self.inner.status(task)
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStatusSource
// ---------------------------------------------------------------------------

/// Thread-safe in-memory status table.
#[derive(Debug, Default)]
pub struct MemoryStatusSource {
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
    unavailable: RwLock<Option<String>>,
}

impl MemoryStatusSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(task, status)` pairs.
    pub fn with_tasks<I, T>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (T, TaskStatus)>,
        T: Into<TaskId>,
    {
        let source = Self::new();
        for (task, status) in tasks {
            source.set(task, status);
        }
        source
    }

    /// Insert or update a task's status.
    pub fn set(&self, task: impl Into<TaskId>, status: TaskStatus) {
        let mut guard = self
            .statuses
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(task.into(), status);
    }

    /// Forget a task; later lookups report it unknown.
    pub fn remove(&self, task: &TaskId) -> Option<TaskStatus> {
        let mut guard = self
            .statuses
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(task)
    }

    /// Make every lookup fail with [`StatusError::Unavailable`] (or restore
    /// normal operation with `None`).
    pub fn set_unavailable(&self, reason: Option<&str>) {
        let mut guard = self
            .unavailable
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = reason.map(str::to_string);
    }
}

impl TaskStatusSource for MemoryStatusSource {
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError> {
        if let Some(reason) = self
            .unavailable
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            return Err(StatusError::Unavailable(reason.clone()));
        }

        self.statuses
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(task)
            .copied()
            .ok_or_else(|| StatusError::UnknownTask(task.clone()))
    }
}
