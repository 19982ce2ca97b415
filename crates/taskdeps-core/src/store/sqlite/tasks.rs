use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

use super::{Database, from_micros, to_micros};
use crate::error::{StatusError, StoreError};
use crate::model::{TaskId, TaskStatus};
use crate::status::TaskStatusSource;

/// A row of the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task rows, and the [`TaskStatusSource`] the CLI hands to the engine.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db: Database,
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let status: String = row.get(2)?;
    let status: TaskStatus = status.parse().map_err(|error: String| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, error.into())
    })?;
    Ok(TaskRecord {
        id: TaskId::new(id),
        title,
        status,
        created_at: from_micros(3, row.get(3)?)?,
        updated_at: from_micros(4, row.get(4)?)?,
    })
}

impl SqliteTaskStore {
    pub(super) const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new not-done task. Returns `false` if the id already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn add(&self, id: &TaskId, title: &str) -> Result<bool, StoreError> {
        let now = to_micros(Utc::now());
        let conn = self.db.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tasks (task_id, title, status, created_at_us, updated_at_us)
             VALUES (?1, ?2, 'not_done', ?3, ?3)",
            params![id.as_str(), title, now],
        )?;
        Ok(inserted > 0)
    }

    /// Set a task's status. Returns the previous status, or `None` if the task
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn set_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
    ) -> Result<Option<TaskStatus>, StoreError> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let previous: Option<String> = tx
            .query_row(
                "SELECT status FROM tasks WHERE task_id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(previous) = previous else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE tasks SET status = ?2, updated_at_us = ?3 WHERE task_id = ?1",
            params![id.as_str(), status.as_str(), to_micros(Utc::now())],
        )?;
        tx.commit()?;

        let previous: TaskStatus = previous.parse().map_err(|error: String| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, error.into())
        })?;
        Ok(Some(previous))
    }

    /// Delete a task row together with every `task_dependencies` row that
    /// references it, in one transaction. Returns the number of edges
    /// removed, or `None` (and changes nothing) if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure; nothing is removed then.
    pub fn remove_with_dependencies(&self, id: &TaskId) -> Result<Option<usize>, StoreError> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let edges = tx.execute(
            "DELETE FROM task_dependencies WHERE task_id = ?1 OR depends_on_task_id = ?1",
            [id.as_str()],
        )?;
        let tasks = tx.execute("DELETE FROM tasks WHERE task_id = ?1", [id.as_str()])?;
        if tasks == 0 {
            tx.rollback()?;
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some(edges))
    }

    /// Fetch one task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.db.lock();
        let task = conn
            .query_row(
                "SELECT task_id, title, status, created_at_us, updated_at_us
                 FROM tasks WHERE task_id = ?1",
                [id.as_str()],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// All tasks ordered by creation time, then id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT task_id, title, status, created_at_us, updated_at_us
             FROM tasks ORDER BY created_at_us, task_id",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }
}

impl TaskStatusSource for SqliteTaskStore {
    fn status(&self, task: &TaskId) -> Result<TaskStatus, StatusError> {
        match self.get(task) {
            Ok(Some(record)) => Ok(record.status),
            Ok(None) => Err(StatusError::UnknownTask(task.clone())),
            Err(error) => Err(StatusError::Unavailable(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, DependencyType, EdgeId};
    use crate::store::EdgeStore;

    fn store() -> SqliteTaskStore {
        Database::open_in_memory().expect("open db").tasks()
    }

    #[test]
    fn add_is_idempotent_and_defaults_to_not_done() {
        let store = store();
        assert!(store.add(&"1".into(), "write parser").unwrap());
        assert!(!store.add(&"1".into(), "again").unwrap());

        let task = store.get(&"1".into()).unwrap().unwrap();
        assert_eq!(task.title, "write parser");
        assert_eq!(task.status, TaskStatus::NotDone);
    }

    #[test]
    fn set_status_returns_previous() {
        let store = store();
        store.add(&"1".into(), "").unwrap();
        assert_eq!(
            store.set_status(&"1".into(), TaskStatus::Done).unwrap(),
            Some(TaskStatus::NotDone)
        );
        assert_eq!(
            store.set_status(&"1".into(), TaskStatus::Done).unwrap(),
            Some(TaskStatus::Done)
        );
        assert_eq!(store.set_status(&"nope".into(), TaskStatus::Done).unwrap(), None);
    }

    #[test]
    fn status_source_reports_unknown_tasks() {
        let store = store();
        store.add(&"1".into(), "").unwrap();
        assert_eq!(store.status(&"1".into()), Ok(TaskStatus::NotDone));
        assert_eq!(
            store.status(&"2".into()),
            Err(StatusError::UnknownTask("2".into()))
        );
    }

    #[test]
    fn remove_drops_row_and_edges_together() {
        let db = Database::open_in_memory().expect("open db");
        let store = db.tasks();
        let edges = db.edges();
        for id in ["a", "t", "b"] {
            store.add(&id.into(), "").unwrap();
        }
        for (id, from, to) in [(1, "a", "t"), (2, "t", "b"), (3, "a", "b")] {
            edges
                .insert(&DependencyEdge {
                    id: EdgeId::new(id),
                    from: from.into(),
                    to: to.into(),
                    dep_type: DependencyType::Blocks,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        assert_eq!(store.remove_with_dependencies(&"t".into()).unwrap(), Some(2));
        assert_eq!(store.get(&"t".into()).unwrap(), None);
        let left: Vec<_> = edges.list().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(left, vec![EdgeId::new(3)]);

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TaskId::from("a"), TaskId::from("b")]);
    }

    #[test]
    fn remove_unknown_task_keeps_dangling_edges() {
        let db = Database::open_in_memory().expect("open db");
        let edges = db.edges();
        edges
            .insert(&DependencyEdge {
                id: EdgeId::new(1),
                from: "ghost".into(),
                to: "x".into(),
                dep_type: DependencyType::Blocks,
                created_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(db.tasks().remove_with_dependencies(&"ghost".into()).unwrap(), None);
        assert_eq!(edges.list().unwrap().len(), 1);
    }
}
