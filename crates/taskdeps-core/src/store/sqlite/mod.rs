//! SQLite-backed persistence.
//!
//! Runtime pragmas:
//! - `journal_mode = WAL` so readers in other processes are not blocked by a
//!   writer
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON`
//!
//! A [`Database`] owns one connection behind a mutex and hands out two
//! views over it: [`SqliteEdgeStore`] for the engine's edges and
//! [`SqliteTaskStore`] for task rows and status lookup.

mod edges;
pub mod migrations;
pub mod schema;
mod tasks;

pub use edges::SqliteEdgeStore;
pub use tasks::{SqliteTaskStore, TaskRecord};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Type;

/// Busy timeout used for every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to an open, migrated database.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`, apply pragmas, and migrate
    /// the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opening,
    /// configuring, or migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply schema migrations")?;

        tracing::debug!(path = %path.display(), "opened task database");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database. Used by tests and benchmarks.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn).context("apply schema migrations")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Edge store view over this database.
    #[must_use]
    pub fn edges(&self) -> SqliteEdgeStore {
        SqliteEdgeStore::new(self.clone())
    }

    /// Task table view over this database.
    #[must_use]
    pub fn tasks(&self) -> SqliteTaskStore {
        SqliteTaskStore::new(self.clone())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(column: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}
