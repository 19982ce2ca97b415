use std::fmt;

use crate::model::{DependencyEvent, DependencyType, TaskId};

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnknownTask,
    SelfDependency,
    CycleDetected,
    DuplicateEdge,
    PartialRecompute,
    StatusUnavailable,
    StoreUnavailable,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownTask => "E2001",
            Self::SelfDependency => "E2002",
            Self::CycleDetected => "E2003",
            Self::DuplicateEdge => "E2004",
            Self::PartialRecompute => "E3001",
            Self::StatusUnavailable => "E3002",
            Self::StoreUnavailable => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownTask => "Task not found",
            Self::SelfDependency => "Task cannot depend on itself",
            Self::CycleDetected => "Cycle would be created",
            Self::DuplicateEdge => "Dependency already exists",
            Self::PartialRecompute => "Blocking state partially recomputed",
            Self::StatusUnavailable => "Task status source unavailable",
            Self::StoreUnavailable => "Dependency store unavailable",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `td init` to initialize this project."),
            Self::ConfigParseError => Some("Fix syntax in .taskdeps/config.toml and retry."),
            Self::UnknownTask => Some("Create the task first with `td task add <id>`."),
            Self::SelfDependency => None,
            Self::CycleDetected => {
                Some("Remove/adjust dependency links to keep the graph acyclic.")
            }
            Self::DuplicateEdge => Some("Delete the existing dependency to change its type."),
            Self::PartialRecompute => {
                Some("Re-run `td blocked <task>` for the failed dependents to reconcile.")
            }
            Self::StatusUnavailable | Self::StoreUnavailable => {
                Some("Check the backing store is reachable; the engine does not retry.")
            }
            Self::LockContention => Some("Retry after the other `td` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure reported by an [`EdgeStore`](crate::store::EdgeStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The backing store rejected the edge as a duplicate of an existing key.
    #[error("edge already stored: {from} -> {to} ({dep_type})")]
    Conflict {
        from: TaskId,
        to: TaskId,
        dep_type: DependencyType,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a [`TaskStatusSource`](crate::status::TaskStatusSource).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("status source unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// DependencyError
// ---------------------------------------------------------------------------

/// A dependent whose blocking state could not be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeFailure {
    pub task_id: TaskId,
    pub error: StatusError,
}

impl fmt::Display for RecomputeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task_id, self.error)
    }
}

/// Errors surfaced by the dependency engine.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("circular dependency: {}", format_path(.path))]
    CircularDependency { path: Vec<TaskId> },

    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("dependency already exists: {from} -> {to} ({dep_type})")]
    DuplicateEdge {
        from: TaskId,
        to: TaskId,
        dep_type: DependencyType,
    },

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("status lookup failed: {0}")]
    StatusUnavailable(String),

    /// Some dependents were recomputed; `events` for those are valid and have
    /// already been dispatched.
    #[error(
        "recomputed blocking state with {} failure(s): {}",
        .failures.len(),
        format_failures(.failures)
    )]
    PartialRecompute {
        events: Vec<DependencyEvent>,
        failures: Vec<RecomputeFailure>,
    },
}

impl DependencyError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CircularDependency { .. } => ErrorCode::CycleDetected,
            Self::SelfDependency(_) => ErrorCode::SelfDependency,
            Self::DuplicateEdge { .. } => ErrorCode::DuplicateEdge,
            Self::UnknownTask(_) => ErrorCode::UnknownTask,
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            Self::StatusUnavailable(_) => ErrorCode::StatusUnavailable,
            Self::PartialRecompute { .. } => ErrorCode::PartialRecompute,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Events that remain valid despite the error (only non-empty for
    /// partial recomputes).
    #[must_use]
    pub fn partial_events(&self) -> &[DependencyEvent] {
        match self {
            Self::PartialRecompute { events, .. } => events,
            _ => &[],
        }
    }
}

impl From<StatusError> for DependencyError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::UnknownTask(id) => Self::UnknownTask(id),
            StatusError::Unavailable(reason) => Self::StatusUnavailable(reason),
        }
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

fn format_failures(failures: &[RecomputeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
