mod config;
mod context;
mod error;
mod git;
mod lifecycle;
mod logging;
mod models;
mod mux;
mod orchestrator;
mod parser;
mod persistence;
mod protocol;
mod workspace;

#[cfg(test)]
mod testing;

use clap::{ArgAction, Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, Instrument};

use config::{user_config_path, Config};
use context::AppContext;
use error::{OrchestratorError, Result};
use lifecycle::{BatchOptions, CreateOptions, DeleteOptions, LifecycleController};
use models::{OrchestrationResult, SessionRecord, SessionStatus};

#[derive(Parser)]
#[command(name = "batchmux")]
#[command(version)]
#[command(about = "Run a task list as tmux sessions inside a dedicated git worktree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/batchmux/config.toml)
    #[arg(long, global = true, env = "BATCHMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Repository that owns the worktrees (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// More output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace with a single tmux session
    Create {
        /// Session id (letters, digits and '-'; ticket ids like PROJ-12 keep their case)
        id: String,
        /// Check out this branch instead of feature/<id>
        #[arg(short, long)]
        branch: Option<String>,
        /// Agent recorded on the session (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,
    },
    /// Start one tmux session per executable task of a task document
    Batch {
        /// Markdown task document
        task_doc: PathBuf,
        /// Batch id (defaults to the document's `Batch:` line, then a timestamp)
        #[arg(long)]
        batch_id: Option<String>,
        /// Show what would be created without running git or tmux
        #[arg(long)]
        dry_run: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach to a session (recreating it if tmux lost it)
    Attach {
        id: String,
        /// Task session inside a batch
        #[arg(short, long)]
        task: Option<String>,
    },
    /// Kill the tmux sessions of a session or batch
    Stop { id: String },
    /// Stop sessions, remove the workspace and forget the session
    Delete {
        id: String,
        #[arg(long)]
        keep_workspace: bool,
        #[arg(long)]
        keep_session: bool,
    },
    /// List registered sessions
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete every registered session
    DeleteAll {
        /// Also delete sessions that are still active
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(repo) = &cli.repo {
        config.workspace.repo = Some(repo.clone());
    }
    let repo = match config.repo_path() {
        Ok(repo) => std::fs::canonicalize(&repo).unwrap_or(repo),
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let ctx = AppContext::new(config, repo);
    if let Err(e) = logging::init_tracing(cli.verbose, &ctx.log_path) {
        eprintln!("warning: {:#}", e);
    }
    debug!(
        config = %cli.config.clone().unwrap_or_else(user_config_path).display(),
        repo = %ctx.repo.display(),
        "starting"
    );

    let span = ctx.span();
    let log_path = ctx.log_path.clone();
    let controller = LifecycleController::with_system_tools(ctx);

    match run(cli.command, &controller).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e, &log_path),
    }
}

async fn run(command: Commands, controller: &LifecycleController) -> Result<()> {
    match command {
        Commands::Create { id, branch, agents } => {
            let record = controller
                .create(&id, CreateOptions { branch, agents })
                .await?;
            println!("Created session {} on branch {}", record.id, record.branch);
            println!("  workspace: {}", record.worktree_path.display());
            println!("  attach:    batchmux attach {}", record.id);
        }
        Commands::Batch {
            task_doc,
            batch_id,
            dry_run,
            json,
        } => {
            let result = controller
                .create_batch(&task_doc, BatchOptions { batch_id, dry_run })
                .await?;
            if json {
                print_json(&result);
            } else {
                print_batch(&result, dry_run);
            }
        }
        Commands::Attach { id, task } => {
            controller.attach(&id, task.as_deref()).await?;
        }
        Commands::Stop { id } => {
            controller.stop(&id).await?;
            println!("Stopped {}", id);
        }
        Commands::Delete {
            id,
            keep_workspace,
            keep_session,
        } => {
            controller
                .delete(
                    &id,
                    DeleteOptions {
                        keep_workspace,
                        keep_session,
                    },
                )
                .await?;
            println!("Deleted {}", id);
        }
        Commands::List { json } => {
            let records = controller.list().await?;
            if json {
                print_json(&records);
            } else {
                print_records(&records);
                print_untracked(controller, &records).await;
            }
        }
        Commands::DeleteAll { force } => {
            let deleted = controller.delete_all(force).await?;
            println!("Deleted {} session(s)", deleted);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "cannot encode output as JSON"),
    }
}

fn print_batch(result: &OrchestrationResult, dry_run: bool) {
    let workspace = &result.workspace;
    println!(
        "Batch {}{}  branch {}  workspace {}",
        result.batch_id,
        if dry_run { " (dry run)" } else { "" },
        workspace.branch_name,
        workspace.display_path()
    );

    for session in &result.sessions {
        let mark = match session.status {
            SessionStatus::Running => "ok",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Created => "planned",
            SessionStatus::Stopped => "stopped",
        };
        print!(
            "  {:<8} {:<40} {} [{}]",
            mark,
            session.multiplexer_name,
            session.task.name,
            session.task.status.as_str()
        );
        match &session.error {
            Some(err) => println!(": {}", err),
            None => println!(),
        }
    }

    let summary = &result.summary;
    println!(
        "{} task(s): {} running, {} failed, {} skipped",
        summary.total, summary.success, summary.failed, summary.skipped
    );
    if result.all_failed() {
        println!("No session could be started. Is tmux installed?");
    } else if result.has_failures() {
        println!("Some sessions failed; the batch stays registered with the ones that started.");
    }
}

fn print_records(records: &[SessionRecord]) {
    if records.is_empty() {
        println!("No sessions.");
        return;
    }
    println!(
        "{:<24} {:<8} {:<28} {:>5}  {:<12} PATH",
        "ID", "STATUS", "BRANCH", "TASKS", "ACTIVE"
    );
    for record in records {
        println!(
            "{:<24} {:<8} {:<28} {:>5}  {:<12} {}",
            record.id,
            record.status,
            record.branch,
            record.tasks.len(),
            record.last_active_display(),
            record.worktree_path.display()
        );
    }
}

/// Worktrees under the managed root that no registry entry owns
async fn print_untracked(controller: &LifecycleController, records: &[SessionRecord]) {
    let workspaces = match controller.workspaces().list().await {
        Ok(workspaces) => workspaces,
        Err(e) => {
            debug!(error = %e, "workspace scan skipped");
            return;
        }
    };
    let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let untracked: Vec<_> = workspaces
        .iter()
        .filter(|w| !known.contains(w.id.as_str()))
        .collect();
    if untracked.is_empty() {
        return;
    }
    println!(
        "\nUntracked workspaces under {}:",
        controller.workspaces().root().display()
    );
    for workspace in untracked {
        println!("  {:<24} {}", workspace.id, workspace.branch_name);
    }
}

/// Process exit status for a failed command
fn exit_code(err: &OrchestratorError) -> u8 {
    match err {
        OrchestratorError::Interrupted(signal) => (128 + signal).clamp(0, 255) as u8,
        err if err.is_user_error() => 2,
        _ => 1,
    }
}

fn report(err: &OrchestratorError, log_path: &Path) -> ExitCode {
    match err {
        OrchestratorError::Interrupted(_) => {
            eprintln!("interrupted; sessions and workspace were cleaned up");
        }
        err if err.is_user_error() => eprintln!("error: {}", err),
        err => {
            error!(error = %err, "command failed");
            eprintln!("error: the command did not complete");
            for step in err.steps() {
                eprintln!("  - {}", step);
            }
            eprintln!("details: {}", log_path.display());
        }
    }
    ExitCode::from(exit_code(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_batch() {
        let cli = Cli::try_parse_from([
            "batchmux", "-vv", "batch", "tasks.md", "--batch-id", "proj1", "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Batch {
                task_doc,
                batch_id,
                dry_run,
                json,
            } => {
                assert_eq!(task_doc, PathBuf::from("tasks.md"));
                assert_eq!(batch_id.as_deref(), Some("proj1"));
                assert!(dry_run);
                assert!(!json);
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_parse_delete_flags_and_globals() {
        let cli = Cli::try_parse_from([
            "batchmux",
            "delete",
            "PROJ-1",
            "--keep-workspace",
            "--repo",
            "/src/app",
        ])
        .unwrap();
        assert_eq!(cli.repo, Some(PathBuf::from("/src/app")));
        assert!(matches!(
            cli.command,
            Commands::Delete { keep_workspace: true, keep_session: false, .. }
        ));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&OrchestratorError::validation("bad")), 2);
        assert_eq!(exit_code(&OrchestratorError::Interrupted(2)), 130);
        assert_eq!(exit_code(&OrchestratorError::Interrupted(15)), 143);
        assert_eq!(exit_code(&OrchestratorError::session("bmx_a", "boom")), 1);
        assert_eq!(
            exit_code(&OrchestratorError::Aggregate(vec![
                OrchestratorError::validation("bad"),
                OrchestratorError::registry("/tmp/r.json", "denied"),
            ])),
            1
        );
    }
}
