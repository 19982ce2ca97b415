//! Project discovery and engine wiring for CLI commands.

use std::path::{Path, PathBuf};

use taskdeps_core::config::{self, PROJECT_DIR, ProjectConfig};
use taskdeps_core::lock::{DEFAULT_LOCK_TIMEOUT, ProjectLock};
use taskdeps_core::sink::TracingSink;
use taskdeps_core::store::sqlite::{Database, SqliteEdgeStore, SqliteTaskStore};
use taskdeps_core::{DependencyEngine, EngineConfig, ErrorCode};

/// Database file, relative to the project root.
pub const DATABASE_FILE: &str = ".taskdeps/taskdeps.sqlite3";

/// The engine as the CLI runs it: SQLite edges and statuses, events logged.
pub type CliEngine = DependencyEngine<SqliteEdgeStore, SqliteTaskStore, TracingSink>;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a taskdeps project: no .taskdeps directory above {}", .start.display())]
    NotInitialized { start: PathBuf },

    #[error("invalid project config: {0:#}")]
    Config(anyhow::Error),

    #[error("cannot open database {}: {:#}", .path.display(), .reason)]
    Database { path: PathBuf, reason: anyhow::Error },
}

impl ProjectError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Database { .. } => ErrorCode::StoreUnavailable,
        }
    }
}

/// Walk up from `start` to the nearest directory containing `.taskdeps/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_DIR).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// An opened project: its root, config, and database handle.
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub db: Database,
}

impl Project {
    /// Locate and open the project enclosing `start`.
    ///
    /// # Errors
    ///
    /// [`ProjectError`] if there is no project, the config is malformed, or
    /// the database cannot be opened.
    pub fn discover(start: &Path) -> Result<Self, ProjectError> {
        let root = find_project_root(start).ok_or_else(|| ProjectError::NotInitialized {
            start: start.to_path_buf(),
        })?;
        let config = config::load_project_config(&root).map_err(ProjectError::Config)?;
        let path = root.join(DATABASE_FILE);
        let db = Database::open(&path).map_err(|reason| ProjectError::Database { path, reason })?;
        tracing::debug!(root = %root.display(), "project opened");
        Ok(Self { root, config, db })
    }

    /// Build an engine over this project's stores.
    pub fn engine(&self) -> CliEngine {
        DependencyEngine::with_sink(self.db.edges(), self.db.tasks(), TracingSink)
            .with_config(EngineConfig::from(&self.config))
    }

    /// Exclusive lock for commands that write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere past the timeout.
    pub fn write_lock(&self) -> anyhow::Result<ProjectLock> {
        Ok(ProjectLock::exclusive(&self.root, DEFAULT_LOCK_TIMEOUT)?)
    }

    /// Shared lock for read-only commands.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer holds the lock past the timeout.
    pub fn read_lock(&self) -> anyhow::Result<ProjectLock> {
        Ok(ProjectLock::shared(&self.root, DEFAULT_LOCK_TIMEOUT)?)
    }
}
