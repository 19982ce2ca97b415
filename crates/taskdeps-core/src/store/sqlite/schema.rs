//! Canonical SQLite schema for the task dependency database.
//!
//! The schema stores task rows for the CLI's status source and the
//! dependency edges the engine manages. Edge rows are keyed by the
//! `(task_id, depends_on_task_id, dependency_type)` triple; the database
//! itself refuses duplicates and self-references so a misbehaving writer
//! cannot bypass the engine's checks.
//!
//! Edges deliberately carry no foreign key to `tasks`: the edge store is
//! usable on its own, with task existence checked by whatever status source
//! the engine is given.
//!
//! `graph_meta.revision` is bumped by triggers on every edge mutation, so
//! any process can detect that the edge set changed since it last read it.
//! `graph_meta.last_edge_id` is a high-water mark that keeps edge ids
//! increasing even after the newest edge is deleted.

/// Migration v1: tasks, edges, and graph metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'not_done'
        CHECK (status IN ('done', 'not_done')),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    id INTEGER PRIMARY KEY,
    task_id TEXT NOT NULL,
    depends_on_task_id TEXT NOT NULL,
    dependency_type TEXT NOT NULL
        CHECK (dependency_type IN ('blocks', 'relates_to')),
    created_at_us INTEGER NOT NULL,
    UNIQUE (task_id, depends_on_task_id, dependency_type),
    CHECK (task_id <> depends_on_task_id)
);

CREATE TABLE IF NOT EXISTS graph_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    last_edge_id INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO graph_meta (id, schema_version, revision, last_edge_id)
VALUES (1, 0, 0, 0);

CREATE INDEX IF NOT EXISTS idx_task_dependencies_depends_on
    ON task_dependencies(depends_on_task_id, dependency_type);

CREATE INDEX IF NOT EXISTS idx_task_dependencies_task
    ON task_dependencies(task_id, dependency_type);

CREATE INDEX IF NOT EXISTS idx_tasks_status
    ON tasks(status);

CREATE TRIGGER IF NOT EXISTS task_dependencies_ai
AFTER INSERT ON task_dependencies
BEGIN
    UPDATE graph_meta
    SET revision = revision + 1,
        last_edge_id = MAX(last_edge_id, NEW.id)
    WHERE id = 1;
END;

CREATE TRIGGER IF NOT EXISTS task_dependencies_ad
AFTER DELETE ON task_dependencies
BEGIN
    UPDATE graph_meta SET revision = revision + 1 WHERE id = 1;
END;

CREATE TRIGGER IF NOT EXISTS task_dependencies_au
AFTER UPDATE ON task_dependencies
BEGIN
    UPDATE graph_meta SET revision = revision + 1 WHERE id = 1;
END;
";

/// Indexes expected after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_task_dependencies_depends_on",
    "idx_task_dependencies_task",
    "idx_tasks_status",
];

/// Triggers expected after all migrations.
pub const REQUIRED_TRIGGERS: &[&str] = &[
    "task_dependencies_ai",
    "task_dependencies_ad",
    "task_dependencies_au",
];
