use rusqlite::{ErrorCode as SqliteErrorCode, OptionalExtension, Row, params};

use super::{Database, from_micros, to_micros};
use crate::error::StoreError;
use crate::model::{DependencyEdge, DependencyType, EdgeId, TaskId};
use crate::store::EdgeStore;

/// [`EdgeStore`] over the `task_dependencies` table.
#[derive(Debug, Clone)]
pub struct SqliteEdgeStore {
    db: Database,
}

impl SqliteEdgeStore {
    pub(super) const fn new(db: Database) -> Self {
        Self { db }
    }
}

fn edge_id_param(id: EdgeId) -> Result<i64, StoreError> {
    i64::try_from(id.get())
        .map_err(|_| StoreError::Unavailable(format!("edge id {id} exceeds sqlite integer range")))
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<DependencyEdge> {
    let id: i64 = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let dep_type: String = row.get(3)?;
    let created_at_us: i64 = row.get(4)?;

    let id = u64::try_from(id).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(error))
    })?;
    let dep_type: DependencyType = dep_type.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(error))
    })?;

    Ok(DependencyEdge {
        id: EdgeId::new(id),
        from: TaskId::new(from),
        to: TaskId::new(to),
        dep_type,
        created_at: from_micros(4, created_at_us)?,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _) if matches!(inner.code, SqliteErrorCode::ConstraintViolation)
    )
}

impl EdgeStore for SqliteEdgeStore {
    fn list(&self) -> Result<Vec<DependencyEdge>, StoreError> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, task_id, depends_on_task_id, dependency_type, created_at_us
             FROM task_dependencies
             ORDER BY id",
        )?;
        let edges = stmt
            .query_map([], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn insert(&self, edge: &DependencyEdge) -> Result<(), StoreError> {
        let id = edge_id_param(edge.id)?;
        let conn = self.db.lock();
        let result = conn.execute(
            "INSERT INTO task_dependencies
                (id, task_id, depends_on_task_id, dependency_type, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                edge.from.as_str(),
                edge.to.as_str(),
                edge.dep_type.as_str(),
                to_micros(edge.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_constraint_violation(&error) => Err(StoreError::Conflict {
                from: edge.from.clone(),
                to: edge.to.clone(),
                dep_type: edge.dep_type,
            }),
            Err(error) => Err(error.into()),
        }
    }

    fn delete(&self, id: EdgeId) -> Result<bool, StoreError> {
        let id = edge_id_param(id)?;
        let conn = self.db.lock();
        let removed = conn.execute("DELETE FROM task_dependencies WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    fn delete_for_task(&self, task: &TaskId) -> Result<usize, StoreError> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM task_dependencies WHERE task_id = ?1 OR depends_on_task_id = ?1",
            [task.as_str()],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn next_edge_id(&self) -> Result<EdgeId, StoreError> {
        let conn = self.db.lock();
        let last: Option<i64> = conn
            .query_row(
                "SELECT MAX(last_edge_id, COALESCE((SELECT MAX(id) FROM task_dependencies), 0))
                 FROM graph_meta WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last = u64::try_from(last.unwrap_or(0)).unwrap_or(0);
        Ok(EdgeId::new(last).next())
    }

    fn revision(&self) -> Result<Option<u64>, StoreError> {
        let conn = self.db.lock();
        let revision: Option<i64> = conn
            .query_row("SELECT revision FROM graph_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(revision.and_then(|r| u64::try_from(r).ok()))
    }
}
