//! Blocking queries: `td blocked`, `td blockers`, `td dependents`.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use taskdeps_core::{BlockingMode, StatusError, TaskId, TaskStatus, TaskStatusSource};

use super::parse_task_id;
use super::task::join_ids;
use crate::output::{OutputMode, pretty_section, render, render_mode};
use crate::project::Project;

/// Arguments for `td blocked`.
#[derive(Args, Debug)]
pub struct BlockedArgs {
    #[arg(value_parser = parse_task_id)]
    pub task: TaskId,

    /// Consider every prerequisite reachable through dependency chains.
    #[arg(long, conflicts_with = "direct")]
    pub transitive: bool,

    /// Consider immediate prerequisites only.
    #[arg(long)]
    pub direct: bool,
}

impl BlockedArgs {
    /// Explicit flag, else the project's configured default.
    const fn mode(&self, default: BlockingMode) -> BlockingMode {
        if self.transitive {
            BlockingMode::Transitive
        } else if self.direct {
            BlockingMode::Direct
        } else {
            default
        }
    }
}

/// Arguments for `td blockers` and `td dependents`.
#[derive(Args, Debug)]
pub struct TaskQueryArgs {
    #[arg(value_parser = parse_task_id)]
    pub task: TaskId,
}

#[derive(Debug, Serialize)]
struct BlockedOutput {
    task: TaskId,
    mode: BlockingMode,
    blocked: bool,
    by: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
struct Neighbor {
    id: TaskId,
    /// `None` when the task is referenced by an edge but has no task row.
    status: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
struct NeighborsOutput {
    task: TaskId,
    tasks: Vec<Neighbor>,
}

fn with_status(source: &impl TaskStatusSource, ids: Vec<TaskId>) -> Result<Vec<Neighbor>> {
    ids.into_iter()
        .map(|id| -> Result<Neighbor> {
            let status = match source.status(&id) {
                Ok(status) => Some(status),
                Err(StatusError::UnknownTask(_)) => None,
                Err(err) => return Err(err.into()),
            };
            Ok(Neighbor { id, status })
        })
        .collect()
}

fn status_label(status: Option<TaskStatus>) -> &'static str {
    status.map_or("missing", TaskStatus::as_str)
}

pub fn run_blocked(args: &BlockedArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let _lock = project.read_lock()?;
    let mode = args.mode(project.config.blocking.default_mode);
    let status = project.engine().is_blocked(&args.task, mode)?;

    let result = BlockedOutput {
        task: args.task.clone(),
        mode,
        blocked: status.blocked,
        by: status.by,
    };

    render(output, &result, |r, w| {
        if r.blocked {
            writeln!(w, "{} is blocked ({}) by {}", r.task, r.mode, join_ids(&r.by))
        } else {
            writeln!(w, "{} is not blocked ({})", r.task, r.mode)
        }
    })
}

pub fn run_blockers(args: &TaskQueryArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let _lock = project.read_lock()?;
    let engine = project.engine();
    let ids = engine.blocking_tasks(&args.task)?;
    let result = NeighborsOutput {
        task: args.task.clone(),
        tasks: with_status(engine.status_source(), ids)?,
    };
    render_neighbors(output, &result, &format!("Blocking {}", result.task))
}

pub fn run_dependents(args: &TaskQueryArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let _lock = project.read_lock()?;
    let engine = project.engine();
    let ids = engine.blocked_tasks(&args.task)?;
    let result = NeighborsOutput {
        task: args.task.clone(),
        tasks: with_status(engine.status_source(), ids)?,
    };
    render_neighbors(output, &result, &format!("Dependents of {}", result.task))
}

fn render_neighbors(output: OutputMode, result: &NeighborsOutput, heading: &str) -> Result<()> {
    render_mode(
        output,
        result,
        |r, w| {
            for n in &r.tasks {
                writeln!(w, "{}  {}", n.id, status_label(n.status))?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, heading)?;
            if r.tasks.is_empty() {
                writeln!(w, "  (none)")?;
            }
            for n in &r.tasks {
                let mark = if n.status == Some(TaskStatus::Done) { "✓" } else { "·" };
                writeln!(w, "  {mark} {} [{}]", n.id, status_label(n.status))?;
            }
            Ok(())
        },
    )
}
