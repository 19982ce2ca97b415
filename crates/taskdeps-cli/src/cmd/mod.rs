pub mod blocking;
pub mod completions;
pub mod cycles;
pub mod dep;
pub mod init;
pub mod task;

use taskdeps_core::TaskId;

/// Clap value parser for task ids: trimmed, non-empty, no whitespace.
pub fn parse_task_id(raw: &str) -> Result<TaskId, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("task id must not be empty".to_string());
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(format!("task id '{trimmed}' must not contain whitespace"));
    }
    Ok(TaskId::from(trimmed))
}
