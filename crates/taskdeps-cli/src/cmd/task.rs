//! `td task`: create, complete, reopen, list, and remove tasks.
//!
//! `done` and `reopen` persist the new status and then run the dependency
//! engine's status-change hook, printing every blocked/unblocked event it
//! emits for the task's dependents.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use taskdeps_core::store::sqlite::TaskRecord;
use taskdeps_core::{DependencyError, DependencyEvent, TaskId, TaskStatus};

use super::parse_task_id;
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};
use crate::project::Project;

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    #[command(
        about = "Register a task",
        after_help = "EXAMPLES:\n    # Add a task with a title\n    td task add design --title \"Design the API\"\n\n    # Title defaults to the id\n    td task add implement"
    )]
    Add(TaskAddArgs),

    #[command(
        about = "Mark a task done and report dependents it unblocks",
        after_help = "EXAMPLES:\n    td task done design\n    td task done design --json"
    )]
    Done(TaskIdArg),

    #[command(
        about = "Reopen a task and report dependents it blocks again",
        after_help = "EXAMPLES:\n    td task reopen design"
    )]
    Reopen(TaskIdArg),

    #[command(
        about = "Remove a task and every dependency touching it",
        after_help = "EXAMPLES:\n    td task rm design"
    )]
    Rm(TaskIdArg),

    #[command(about = "List tasks with their direct blocking state")]
    List,
}

#[derive(Args, Debug)]
pub struct TaskAddArgs {
    /// Task id.
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    /// Human-readable title (defaults to the id).
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskIdArg {
    /// Task id.
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TaskAddOutput {
    ok: bool,
    id: TaskId,
    title: String,
    created: bool,
}

#[derive(Debug, Serialize)]
struct StatusChangeOutput {
    ok: bool,
    id: TaskId,
    status: TaskStatus,
    previous: TaskStatus,
    events: Vec<DependencyEvent>,
}

#[derive(Debug, Serialize)]
struct TaskRmOutput {
    ok: bool,
    id: TaskId,
    removed_dependencies: usize,
}

#[derive(Debug, Serialize)]
struct TaskRow {
    #[serde(flatten)]
    record: TaskRecord,
    blocked: bool,
    blocked_by: Vec<TaskId>,
}

// ---------------------------------------------------------------------------
// Command runners
// ---------------------------------------------------------------------------

pub fn run_task(args: &TaskArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    match &args.command {
        TaskCommand::Add(a) => run_task_add(a, output, &project),
        TaskCommand::Done(a) => run_status_change(&a.id, TaskStatus::Done, output, &project),
        TaskCommand::Reopen(a) => run_status_change(&a.id, TaskStatus::NotDone, output, &project),
        TaskCommand::Rm(a) => run_task_rm(&a.id, output, &project),
        TaskCommand::List => run_task_list(output, &project),
    }
}

fn run_task_add(args: &TaskAddArgs, output: OutputMode, project: &Project) -> Result<()> {
    let _lock = project.write_lock()?;
    let title = args.title.clone().unwrap_or_else(|| args.id.to_string());
    let created = project.db.tasks().add(&args.id, &title)?;

    let result = TaskAddOutput {
        ok: true,
        id: args.id.clone(),
        title,
        created,
    };

    render(output, &result, |r, w| {
        if r.created {
            writeln!(w, "✓ added task {}: {}", r.id, r.title)
        } else {
            writeln!(w, "task {} already exists", r.id)
        }
    })
}

fn run_status_change(
    id: &TaskId,
    status: TaskStatus,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let _lock = project.write_lock()?;
    let engine = project.engine();

    let previous = project
        .db
        .tasks()
        .set_status(id, status)?
        .ok_or_else(|| DependencyError::UnknownTask(id.clone()))?;

    // Each invocation starts with an empty notifier; seed it with the stored
    // status so repeated `done` calls stay silent.
    engine.observe_status(id, previous);

    let (events, failure) = match engine.on_task_status_changed(id, status) {
        Ok(events) => (events, None),
        Err(err @ DependencyError::PartialRecompute { .. }) => {
            (err.partial_events().to_vec(), Some(err))
        }
        Err(err) => return Err(err.into()),
    };

    let result = StatusChangeOutput {
        ok: failure.is_none(),
        id: id.clone(),
        status,
        previous,
        events,
    };

    render_mode(
        output,
        &result,
        |r, w| {
            writeln!(w, "{} {}", r.id, r.status)?;
            for event in &r.events {
                writeln!(w, "{event}")?;
            }
            Ok(())
        },
        |r, w| {
            let verb = if r.status.is_done() { "completed" } else { "reopened" };
            writeln!(w, "✓ {verb} {}", r.id)?;
            if r.previous == r.status {
                writeln!(w, "  (already {})", r.status)?;
            }
            for event in &r.events {
                let mark = if event.is_blocked() { "⊘" } else { "→" };
                writeln!(w, "  {mark} {event}")?;
            }
            Ok(())
        },
    )?;

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn run_task_rm(id: &TaskId, output: OutputMode, project: &Project) -> Result<()> {
    let _lock = project.write_lock()?;
    let tasks = project.db.tasks();
    let removed = project
        .engine()
        .remove_task_with(id, |id| tasks.remove_with_dependencies(id))?;
    let Some(removed_dependencies) = removed else {
        return Err(DependencyError::UnknownTask(id.clone()).into());
    };

    let result = TaskRmOutput {
        ok: true,
        id: id.clone(),
        removed_dependencies,
    };

    render(output, &result, |r, w| {
        writeln!(
            w,
            "✓ removed task {} ({} dependencies)",
            r.id, r.removed_dependencies
        )
    })
}

fn run_task_list(output: OutputMode, project: &Project) -> Result<()> {
    let _lock = project.read_lock()?;
    let engine = project.engine();
    let mode = project.config.blocking.default_mode;

    let mut rows = Vec::new();
    for record in project.db.tasks().list()? {
        let status = engine.is_blocked(&record.id, mode)?;
        rows.push(TaskRow {
            record,
            blocked: status.blocked,
            blocked_by: status.by,
        });
    }

    render_mode(
        output,
        &rows,
        |rows, w| {
            for row in rows {
                writeln!(
                    w,
                    "{}  {}  {}  {}",
                    row.record.id,
                    row.record.status,
                    if row.blocked { "blocked" } else { "ready" },
                    row.record.title
                )?;
            }
            Ok(())
        },
        |rows, w| {
            pretty_section(w, &format!("Tasks ({})", rows.len()))?;
            for row in rows {
                let state = if row.record.status.is_done() {
                    "done".to_string()
                } else if row.blocked {
                    format!("blocked by {}", join_ids(&row.blocked_by))
                } else {
                    "ready".to_string()
                };
                pretty_kv(w, row.record.id.as_str(), format!("{} [{state}]", row.record.title))?;
            }
            Ok(())
        },
    )
}

pub(crate) fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        cmd: TaskCommand,
    }

    #[test]
    fn add_parses_title() {
        let w = Wrapper::parse_from(["test", "add", "design", "--title", "Design it"]);
        match w.cmd {
            TaskCommand::Add(args) => {
                assert_eq!(args.id.as_str(), "design");
                assert_eq!(args.title.as_deref(), Some("Design it"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blank_task_id_rejected_by_parser() {
        assert!(Wrapper::try_parse_from(["test", "done", " "]).is_err());
    }

    #[test]
    fn join_ids_formats_list() {
        assert_eq!(join_ids(&[TaskId::from("a"), TaskId::from("b")]), "a, b");
        assert_eq!(join_ids(&[]), "");
    }
}
