//! `td dep`: manage dependency edges between tasks.
//!
//! Subcommands:
//! - `td dep add <task> --on <prereq>`: `<task>` depends on `<prereq>` (Blocks)
//! - `td dep add <task> --relates <other>`: informational RelatesTo edge
//! - `td dep rm <edge-id>`: delete one edge by id
//! - `td dep list <task>`: prerequisites, dependents, and related tasks

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use taskdeps_core::{DependencyEdge, DependencyType, EdgeId, TaskId};

use super::parse_task_id;
use super::task::join_ids;
use crate::output::{OutputMode, pretty_section, render, render_mode};
use crate::project::Project;

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommand,
}

#[derive(Subcommand, Debug)]
pub enum DepCommand {
    #[command(
        about = "Add a dependency edge",
        after_help = "EXAMPLES:\n    # implement cannot complete before design\n    td dep add implement --on design\n\n    # informational link\n    td dep add implement --relates docs"
    )]
    Add(DepAddArgs),

    #[command(
        about = "Remove a dependency edge by id",
        long_about = "Remove a dependency edge by id. Removing an edge that no longer exists \
                      succeeds and reports `removed: false`.",
        after_help = "EXAMPLES:\n    td dep rm 3"
    )]
    Rm(DepRmArgs),

    #[command(
        about = "Show a task's dependencies, dependents, and related tasks",
        after_help = "EXAMPLES:\n    td dep list implement --json"
    )]
    List(DepListArgs),
}

/// Arguments for `td dep add`.
#[derive(Args, Debug)]
pub struct DepAddArgs {
    /// The dependent task.
    #[arg(value_parser = parse_task_id)]
    pub task: TaskId,

    /// Prerequisite that must be done before <task> (Blocks edge).
    #[arg(long, group = "link_target", value_name = "PREREQ", value_parser = parse_task_id)]
    pub on: Option<TaskId>,

    /// Related task (RelatesTo edge, no blocking semantics).
    #[arg(long, group = "link_target", value_name = "OTHER", value_parser = parse_task_id)]
    pub relates: Option<TaskId>,
}

impl DepAddArgs {
    /// Target task and edge type, or `None` if neither flag was given.
    fn target(&self) -> Option<(&TaskId, DependencyType)> {
        self.on
            .as_ref()
            .map(|to| (to, DependencyType::Blocks))
            .or_else(|| self.relates.as_ref().map(|to| (to, DependencyType::RelatesTo)))
    }
}

/// Arguments for `td dep rm`.
#[derive(Args, Debug)]
pub struct DepRmArgs {
    /// Edge id as printed by `td dep add` or `td dep list`.
    pub id: EdgeId,
}

/// Arguments for `td dep list`.
#[derive(Args, Debug)]
pub struct DepListArgs {
    #[arg(value_parser = parse_task_id)]
    pub task: TaskId,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DepAddOutput {
    ok: bool,
    #[serde(flatten)]
    edge: DependencyEdge,
}

#[derive(Debug, Serialize)]
struct DepRmOutput {
    ok: bool,
    id: EdgeId,
    /// `false` when the edge was already gone; that is not an error.
    removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    edge: Option<DependencyEdge>,
}

#[derive(Debug, Serialize)]
struct DepListOutput {
    task: TaskId,
    depends_on: Vec<DependencyEdge>,
    dependents: Vec<DependencyEdge>,
    related: Vec<TaskId>,
}

fn describe(edge: &DependencyEdge) -> String {
    match edge.dep_type {
        DependencyType::Blocks => format!("#{} {} depends on {}", edge.id, edge.from, edge.to),
        DependencyType::RelatesTo => format!("#{} {} relates to {}", edge.id, edge.from, edge.to),
    }
}

// ---------------------------------------------------------------------------
// Command runners
// ---------------------------------------------------------------------------

pub fn run_dep(args: &DepArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    match &args.command {
        DepCommand::Add(a) => run_dep_add(a, output, &project),
        DepCommand::Rm(a) => run_dep_rm(a, output, &project),
        DepCommand::List(a) => run_dep_list(a, output, &project),
    }
}

fn run_dep_add(args: &DepAddArgs, output: OutputMode, project: &Project) -> Result<()> {
    let Some((to, dep_type)) = args.target() else {
        anyhow::bail!("must provide --on <prereq> or --relates <other>");
    };

    let _lock = project.write_lock()?;
    let edge = project.engine().create_dependency(&args.task, to, dep_type)?;

    let result = DepAddOutput { ok: true, edge };
    render(output, &result, |r, w| writeln!(w, "✓ {}", describe(&r.edge)))
}

fn run_dep_rm(args: &DepRmArgs, output: OutputMode, project: &Project) -> Result<()> {
    let _lock = project.write_lock()?;
    let edge = project.engine().delete_dependency(args.id)?;

    let result = DepRmOutput {
        ok: true,
        id: args.id,
        removed: edge.is_some(),
        edge,
    };
    render(output, &result, |r, w| match &r.edge {
        Some(edge) => writeln!(w, "✓ removed {}", describe(edge)),
        None => writeln!(w, "✓ dependency #{} already absent", r.id),
    })
}

fn run_dep_list(args: &DepListArgs, output: OutputMode, project: &Project) -> Result<()> {
    let _lock = project.read_lock()?;
    let engine = project.engine();

    let result = DepListOutput {
        task: args.task.clone(),
        depends_on: engine.dependencies_of(&args.task)?,
        dependents: engine.dependents_of(&args.task)?,
        related: engine.related_tasks(&args.task)?,
    };

    render_mode(
        output,
        &result,
        |r, w| {
            for edge in r.depends_on.iter().chain(&r.dependents) {
                writeln!(w, "{}  {}  {}  {}", edge.id, edge.from, edge.dep_type, edge.to)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("Dependencies of {}", r.task))?;
            for edge in &r.depends_on {
                writeln!(w, "  {}", describe(edge))?;
            }
            writeln!(w)?;
            pretty_section(w, "Dependents")?;
            for edge in &r.dependents {
                writeln!(w, "  {}", describe(edge))?;
            }
            if !r.related.is_empty() {
                writeln!(w)?;
                writeln!(w, "Related: {}", join_ids(&r.related))?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        cmd: DepCommand,
    }

    #[test]
    fn dep_add_on_is_blocks() {
        let w = Wrapper::parse_from(["test", "add", "implement", "--on", "design"]);
        let DepCommand::Add(args) = w.cmd else {
            panic!("expected add");
        };
        let (to, dep_type) = args.target().expect("target");
        assert_eq!(to.as_str(), "design");
        assert_eq!(dep_type, DependencyType::Blocks);
    }

    #[test]
    fn dep_add_relates_is_relates_to() {
        let w = Wrapper::parse_from(["test", "add", "a", "--relates", "b"]);
        let DepCommand::Add(args) = w.cmd else {
            panic!("expected add");
        };
        assert_eq!(args.target().expect("target").1, DependencyType::RelatesTo);
    }

    #[test]
    fn dep_add_cannot_have_both_targets() {
        assert!(Wrapper::try_parse_from(["test", "add", "a", "--on", "b", "--relates", "c"]).is_err());
    }

    #[test]
    fn dep_rm_parses_edge_id() {
        let w = Wrapper::parse_from(["test", "rm", "42"]);
        let DepCommand::Rm(args) = w.cmd else {
            panic!("expected rm");
        };
        assert_eq!(args.id, EdgeId::new(42));
        assert!(Wrapper::try_parse_from(["test", "rm", "not-a-number"]).is_err());
    }

    #[test]
    fn describe_names_direction() {
        let edge = DependencyEdge {
            id: EdgeId::new(3),
            from: TaskId::from("implement"),
            to: TaskId::from("design"),
            dep_type: DependencyType::Blocks,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(describe(&edge), "#3 implement depends on design");
    }

    #[test]
    fn dep_rm_of_absent_edge_is_not_an_error() {
        let result = DepRmOutput {
            ok: true,
            id: EdgeId::new(7),
            removed: false,
            edge: None,
        };
        let value = serde_json::to_value(&result).expect("json");
        assert_eq!(value, serde_json::json!({"ok": true, "id": 7, "removed": false}));
    }
}
