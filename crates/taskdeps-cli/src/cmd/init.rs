use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use taskdeps_core::config::{self, PROJECT_CONFIG_FILE, PROJECT_DIR, ProjectConfig};
use taskdeps_core::store::sqlite::Database;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::DATABASE_FILE;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.taskdeps/` already exists.
    /// Existing tasks and dependencies are kept.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "taskdeps.sqlite3\ntaskdeps.sqlite3-wal\ntaskdeps.sqlite3-shm\nlock\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    root: String,
    database: String,
    config: String,
    reinitialized: bool,
}

/// Execute `td init`. Creates the project skeleton:
///
/// ```text
/// .taskdeps/
///   config.toml        (default project config)
///   taskdeps.sqlite3   (tasks and dependency edges, migrated)
///   .gitignore         (database and lock files)
/// ```
///
/// # Errors
///
/// Returns an error if `.taskdeps/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_dir = project_root.join(PROJECT_DIR);
    let existed = project_dir.exists();

    if existed && !args.force {
        anyhow::bail!(".taskdeps/ already exists. Use `td init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    config::write_project_config(project_root, &ProjectConfig::default())?;

    let gitignore = project_dir.join(".gitignore");
    std::fs::write(&gitignore, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore.display()))?;

    let db_path = project_root.join(DATABASE_FILE);
    Database::open(&db_path)?;

    tracing::info!(root = %project_root.display(), reinitialized = existed, "project initialized");

    let result = InitOutput {
        ok: true,
        root: project_root.display().to_string(),
        database: DATABASE_FILE.to_string(),
        config: PROJECT_CONFIG_FILE.to_string(),
        reinitialized: existed,
    };

    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "initialized {}", r.root),
        |r, w| {
            writeln!(w, "✓ Initialized taskdeps project")?;
            pretty_kv(w, "root", &r.root)?;
            pretty_kv(w, "database", &r.database)?;
            pretty_kv(w, "config", &r.config)
        },
    )
}
