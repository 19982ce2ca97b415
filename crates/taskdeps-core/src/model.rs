//! Core value types shared by the graph engine, stores, and CLI.
//!
//! - [`TaskId`]: opaque task identifier owned by the surrounding application.
//! - [`EdgeId`]: store-assigned identifier for a dependency edge.
//! - [`DependencyType`]: `blocks` (constraining) or `relates_to` (annotation).
//! - [`DependencyEdge`]: one committed, immutable relationship.
//! - [`TaskStatus`], [`BlockingMode`], [`BlockingStatus`]: resolver inputs and
//!   outputs.
//! - [`DependencyEvent`]: blocked/unblocked transitions handed to the
//!   notification collaborator.
//!
//! Edge direction: `from → to` with type `Blocks` means **`from` depends on
//! `to`**; `from` cannot be completed until `to` is done. "Blocked by" is the
//! inverse view from `to` and is never stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of an external task.
///
/// The engine never interprets the value; it only compares and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the owned string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a committed dependency edge.
///
/// Ids are allocated in increasing order, so ordering by id is creation
/// order. The graph relies on this for deterministic adjacency iteration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EdgeId(u64);

impl EdgeId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EdgeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

// ---------------------------------------------------------------------------
// DependencyType
// ---------------------------------------------------------------------------

/// Kind of relationship between two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Constraining: the source waits for the target to be done.
    Blocks,
    /// Informational link; never affects blocking and is exempt from cycle
    /// checks.
    RelatesTo,
}

impl DependencyType {
    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::RelatesTo => "relates_to",
        }
    }

    /// Whether this type participates in blocking and acyclicity.
    #[must_use]
    pub const fn is_constraining(self) -> bool {
        matches!(self, Self::Blocks)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown dependency type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dependency type '{0}' (expected 'blocks' or 'relates_to')")]
pub struct ParseDependencyTypeError(pub String);

impl FromStr for DependencyType {
    type Err = ParseDependencyTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocks" | "depends_on" => Ok(Self::Blocks),
            "relates_to" | "related_to" | "related" | "relates" => Ok(Self::RelatesTo),
            other => Err(ParseDependencyTypeError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyEdge
// ---------------------------------------------------------------------------

/// A committed dependency edge. Immutable once stored; changing the type
/// means deleting and recreating the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: EdgeId,
    /// The dependent task.
    pub from: TaskId,
    /// The prerequisite (for `Blocks`) or related task.
    pub to: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub created_at: DateTime<Utc>,
}

impl DependencyEdge {
    /// Identity key used for duplicate detection.
    #[must_use]
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
            dep_type: self.dep_type,
        }
    }

    /// Whether `task` is either endpoint of this edge.
    #[must_use]
    pub fn touches(&self, task: &TaskId) -> bool {
        &self.from == task || &self.to == task
    }
}

/// `(from, to, type)` triple; at most one edge exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub from: TaskId,
    pub to: TaskId,
    pub dep_type: DependencyType,
}

// ---------------------------------------------------------------------------
// Status and blocking
// ---------------------------------------------------------------------------

/// Completion status of a task, reduced to what blocking needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Done,
    NotDone,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::NotDone => "not_done",
        }
    }

    /// The other status.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Done => Self::NotDone,
            Self::NotDone => Self::Done,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "done" => Ok(Self::Done),
            "not_done" | "open" | "notdone" => Ok(Self::NotDone),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// How far up the Blocks subgraph a blocking check looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// Immediate prerequisites only.
    #[default]
    Direct,
    /// Every prerequisite reachable through Blocks edges.
    Transitive,
}

impl fmt::Display for BlockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Transitive => f.write_str("transitive"),
        }
    }
}

/// Result of a blocking query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockingStatus {
    pub blocked: bool,
    /// Every not-done task responsible, in traversal order.
    pub by: Vec<TaskId>,
}

impl BlockingStatus {
    #[must_use]
    pub fn unblocked() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_blockers(by: Vec<TaskId>) -> Self {
        Self {
            blocked: !by.is_empty(),
            by,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A genuine blocked/unblocked transition of a dependent task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DependencyEvent {
    /// `task_id` went from unblocked to blocked because `blocking_task_id`
    /// was reopened. `blocking_task_ids` lists every current direct blocker.
    Blocked {
        task_id: TaskId,
        blocking_task_id: TaskId,
        blocking_task_ids: Vec<TaskId>,
    },
    /// `task_id` has no remaining not-done direct prerequisites after
    /// `resolved_task_id` was completed.
    Unblocked {
        task_id: TaskId,
        resolved_task_id: TaskId,
    },
}

impl DependencyEvent {
    /// The dependent task whose state changed.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Blocked { task_id, .. } | Self::Unblocked { task_id, .. } => task_id,
        }
    }

    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

impl fmt::Display for DependencyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked {
                task_id,
                blocking_task_id,
                ..
            } => write!(f, "{task_id} blocked by {blocking_task_id}"),
            Self::Unblocked {
                task_id,
                resolved_task_id,
            } => write!(f, "{task_id} unblocked ({resolved_task_id} done)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_type_parses_aliases() {
        assert_eq!("blocks".parse::<DependencyType>(), Ok(DependencyType::Blocks));
        assert_eq!(
            "related_to".parse::<DependencyType>(),
            Ok(DependencyType::RelatesTo)
        );
        assert_eq!(
            " Relates_To ".parse::<DependencyType>(),
            Ok(DependencyType::RelatesTo)
        );
        assert!("blocked_by".parse::<DependencyType>().is_err());
    }

    #[test]
    fn only_blocks_is_constraining() {
        assert!(DependencyType::Blocks.is_constraining());
        assert!(!DependencyType::RelatesTo.is_constraining());
    }

    #[test]
    fn blocking_status_from_blockers() {
        assert_eq!(BlockingStatus::from_blockers(vec![]), BlockingStatus::unblocked());
        let status = BlockingStatus::from_blockers(vec![TaskId::from("1")]);
        assert!(status.blocked);
        assert_eq!(status.by, vec![TaskId::from("1")]);
    }

    #[test]
    fn edge_ids_order_by_creation() {
        let first = EdgeId::new(1);
        assert!(first < first.next());
        assert_eq!("42".parse::<EdgeId>(), Ok(EdgeId::new(42)));
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = DependencyEvent::Unblocked {
            task_id: TaskId::from("2"),
            resolved_task_id: TaskId::from("1"),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "unblocked");
        assert_eq!(json["task_id"], "2");
        assert_eq!(json["resolved_task_id"], "1");
        assert_eq!(event.to_string(), "2 unblocked (1 done)");
    }
}
