#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status when a command fails.
const EXIT_FAILURE: u8 = 1;
/// Exit status when `td cycles` finds cycles.
const EXIT_CYCLES_FOUND: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "td: task dependency graph with cycle-safe edges and unblock events",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (defaults to pretty on a terminal, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a taskdeps project",
        long_about = "Create .taskdeps/ with a migrated database and default config.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    td init\n\n    # Emit machine-readable output\n    td init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Add, complete, reopen, list, or remove tasks",
        after_help = "EXAMPLES:\n    td task add design\n    td task done design\n    td task list"
    )]
    Task(cmd::task::TaskArgs),

    #[command(
        next_help_heading = "Dependencies",
        about = "Add, remove, or list dependency edges",
        after_help = "EXAMPLES:\n    # implement depends on design\n    td dep add implement --on design\n\n    # Remove edge 3\n    td dep rm 3"
    )]
    Dep(cmd::dep::DepArgs),

    #[command(
        next_help_heading = "Read",
        about = "Check whether a task is blocked",
        long_about = "Check whether a task has unfinished prerequisites. Direct mode looks at \
                      immediate prerequisites; transitive mode follows dependency chains.",
        after_help = "EXAMPLES:\n    td blocked implement\n    td blocked release --transitive --json"
    )]
    Blocked(cmd::blocking::BlockedArgs),

    #[command(
        next_help_heading = "Read",
        about = "List a task's unfinished direct prerequisites",
        after_help = "EXAMPLES:\n    td blockers implement"
    )]
    Blockers(cmd::blocking::TaskQueryArgs),

    #[command(
        next_help_heading = "Read",
        about = "List tasks that directly depend on a task",
        after_help = "EXAMPLES:\n    td dependents design"
    )]
    Dependents(cmd::blocking::TaskQueryArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Report dependency cycles",
        long_about = "Scan the dependency graph for cycles. Exits with status 2 when any are found.",
        after_help = "EXAMPLES:\n    td cycles\n    td cycles --json"
    )]
    Cycles(cmd::cycles::CyclesArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    td completions bash\n\n    # Generate zsh completions\n    td completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TASKDEPS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "taskdeps=debug,info"
        } else {
            "taskdeps=info,warn"
        })
    });

    let format = env::var("TASKDEPS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let cwd = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: cannot read current directory: {err}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let config_root = project::find_project_root(&cwd).unwrap_or_else(|| cwd.clone());
    let output = resolve_output_mode(cli.format, cli.json, &config_root);

    let result = match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &cwd).map(|()| true),
        Commands::Task(ref args) => cmd::task::run_task(args, output, &cwd).map(|()| true),
        Commands::Dep(ref args) => cmd::dep::run_dep(args, output, &cwd).map(|()| true),
        Commands::Blocked(ref args) => {
            cmd::blocking::run_blocked(args, output, &cwd).map(|()| true)
        }
        Commands::Blockers(ref args) => {
            cmd::blocking::run_blockers(args, output, &cwd).map(|()| true)
        }
        Commands::Dependents(ref args) => {
            cmd::blocking::run_dependents(args, output, &cwd).map(|()| true)
        }
        Commands::Cycles(ref args) => {
            cmd::cycles::run_cycles(args, output, &cwd).map(|found| !found)
        }
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command).map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_CYCLES_FOUND),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            let cli_error = CliError::from_anyhow(&err);
            if render_error(output, &cli_error).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["td", "--json", "cycles"]);
        assert!(cli.json);
    }

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["td", "task", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["td", "--format", "text", "cycles"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
        assert!(Cli::try_parse_from(["td", "--format", "yaml", "cycles"]).is_err());
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["td", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["td", "init"],
            vec!["td", "task", "add", "a", "--title", "A"],
            vec!["td", "task", "done", "a"],
            vec!["td", "task", "reopen", "a"],
            vec!["td", "task", "rm", "a"],
            vec!["td", "task", "list"],
            vec!["td", "dep", "add", "b", "--on", "a"],
            vec!["td", "dep", "add", "b", "--relates", "a"],
            vec!["td", "dep", "rm", "1"],
            vec!["td", "dep", "list", "a"],
            vec!["td", "blocked", "a", "--transitive"],
            vec!["td", "blockers", "a"],
            vec!["td", "dependents", "a"],
            vec!["td", "cycles"],
            vec!["td", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "Failed to parse: {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
