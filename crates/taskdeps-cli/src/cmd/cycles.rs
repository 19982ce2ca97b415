//! `td cycles`: report dependency cycles (strongly connected components).
//!
//! Edges created through `td` can never close a cycle; this catches rows
//! written to the database by other tools.

use std::io::Write;
use std::path::Path;

use clap::Args;
use serde::Serialize;

use taskdeps_core::graph::CycleReport;

use crate::output::{OutputMode, pretty_section, render_mode};
use crate::project::Project;

/// Arguments for `td cycles`.
#[derive(Args, Debug, Default)]
pub struct CyclesArgs {}

#[derive(Debug, Serialize)]
struct CyclesOutput {
    acyclic: bool,
    cycles: Vec<CycleReport>,
}

/// Execute `td cycles`. Returns `true` when at least one cycle was found.
///
/// # Errors
///
/// Returns an error if the project cannot be opened or the edges read.
pub fn run_cycles(_args: &CyclesArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<bool> {
    let project = Project::discover(project_root)?;
    let _lock = project.read_lock()?;
    let cycles = project.engine().find_cycles()?;

    if !cycles.is_empty() {
        tracing::warn!(count = cycles.len(), "dependency cycles present");
    }

    let payload = CyclesOutput {
        acyclic: cycles.is_empty(),
        cycles,
    };

    render_mode(output, &payload, render_cycles_text, render_cycles_human)?;
    Ok(!payload.acyclic)
}

fn render_cycles_text(payload: &CyclesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for cycle in &payload.cycles {
        let members: Vec<&str> = cycle.members.iter().map(|m| m.as_str()).collect();
        writeln!(w, "{}", members.join(" "))?;
    }
    Ok(())
}

fn render_cycles_human(payload: &CyclesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.acyclic {
        return writeln!(w, "✓ no dependency cycles");
    }

    pretty_section(w, &format!("Dependency cycles ({})", payload.cycles.len()))?;
    for (i, cycle) in payload.cycles.iter().enumerate() {
        let members: Vec<&str> = cycle.members.iter().map(|m| m.as_str()).collect();
        writeln!(w, "  {}. {}", i + 1, members.join(" ↔ "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeps_core::TaskId;

    fn payload(cycles: Vec<Vec<&str>>) -> CyclesOutput {
        let cycles: Vec<CycleReport> = cycles
            .into_iter()
            .map(|members| CycleReport {
                members: members.into_iter().map(TaskId::from).collect(),
            })
            .collect();
        CyclesOutput {
            acyclic: cycles.is_empty(),
            cycles,
        }
    }

    #[test]
    fn human_output_for_acyclic_graph() {
        let mut out = Vec::new();
        render_cycles_human(&payload(vec![]), &mut out).expect("render");
        assert_eq!(String::from_utf8(out).expect("utf8"), "✓ no dependency cycles\n");
    }

    #[test]
    fn text_output_lists_members() {
        let mut out = Vec::new();
        render_cycles_text(&payload(vec![vec!["a", "b"], vec!["c", "d", "e"]]), &mut out)
            .expect("render");
        assert_eq!(String::from_utf8(out).expect("utf8"), "a b\nc d e\n");
    }

    #[test]
    fn json_shape() {
        let value = serde_json::to_value(payload(vec![vec!["a", "b"]])).expect("json");
        assert_eq!(value["acyclic"], false);
        assert_eq!(value["cycles"][0]["members"], serde_json::json!(["a", "b"]));
    }
}
