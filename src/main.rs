// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Warden driver entry point - thin CLI over the orchestration core.
//!
//! Each invocation is one short-lived driver process: read the shared
//! state, do one operation, exit. All logic lives in the library.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use warden::config::{load_config, CliOptions};
use warden::error::Result;
use warden::conflict::{detect_file_conflicts, WorkerInfo};
use warden::lock::{Liveness, LivenessOracle, LockStore};
use warden::state::{EventLog, TaskState, TaskStateMachine};
use warden::telemetry::{init_telemetry, TelemetryConfig};
use warden::workspace::{GitBackend, VcsBackend};

/// Warden - coordinate a fleet of terminal-based coding agents.
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about = "Fleet orchestration for coding agents", long_about = None)]
struct Cli {
    /// tmux session the fleet runs in
    #[arg(long, env = "WARDEN_SESSION")]
    session: Option<String>,

    /// Village directory (shared orchestration state root)
    #[arg(long, env = "WARDEN_VILLAGE_DIR")]
    village_dir: Option<PathBuf>,

    /// Locks directory (defaults to <village>/locks)
    #[arg(long, env = "WARDEN_LOCKS_DIR")]
    locks_dir: Option<PathBuf>,

    /// Worktrees directory (defaults to <village>/worktrees)
    #[arg(long, env = "WARDEN_WORKTREES_DIR")]
    worktrees_dir: Option<PathBuf>,

    /// Verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List task locks and their liveness
    Locks,
    /// Inspect or drive a task's lifecycle state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Detect file conflicts across active workers
    Conflicts {
        /// Mark the report blocked if any conflict exists
        #[arg(long)]
        block: bool,
    },
    /// Manage per-task workspaces
    Workspaces {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Print a task's current state
    Get { task_id: String },
    /// Print a task's transition history
    History { task_id: String },
    /// Record a task's first state
    Init {
        task_id: String,
        /// Starting state (defaults to queued)
        #[arg(long, default_value = "queued")]
        state: String,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
    /// Transition a task to a new state
    Set {
        task_id: String,
        state: String,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommands {
    /// List workspaces registered under a repository
    List {
        /// Repository root
        #[arg(default_value = ".")]
        repo: PathBuf,
    },
    /// Create an isolated workspace for a task
    Create {
        task_id: String,
        /// Repository root
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Ref to branch the workspace from
        #[arg(long, default_value = "main")]
        base_ref: String,
    },
    /// Remove a workspace
    Remove { path: PathBuf },
    /// Hard-reset a workspace (rollback primitive)
    Reset { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = if cli.verbose {
        TelemetryConfig::development()
    } else {
        TelemetryConfig::default()
    };
    init_telemetry(&telemetry)?;

    let options = CliOptions {
        session: cli.session.clone(),
        village_dir: cli.village_dir.clone(),
        locks_dir: cli.locks_dir.clone(),
        worktrees_dir: cli.worktrees_dir.clone(),
        block_on_conflict: match &cli.command {
            Commands::Conflicts { block: true } => Some(true),
            _ => None,
        },
        ..Default::default()
    };
    let config = load_config(std::path::Path::new("."), options)?;

    let store = LockStore::new(&config.locks_dir);
    let machine = TaskStateMachine::new(store.clone(), EventLog::in_village(&config.village_dir));
    let backend = GitBackend::new();

    match cli.command {
        Commands::Locks => {
            let locks = store.read_all();
            if locks.is_empty() {
                println!("no locks in {}", config.locks_dir.display());
                return Ok(());
            }
            let oracle = LivenessOracle::tmux();
            let liveness = oracle.evaluate_locks(&locks, &config.session).await;
            for (lock, (_, live)) in locks.iter().zip(liveness.iter()) {
                let state = lock
                    .state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    lock.task_id, live, state, lock.pane, lock.agent, lock.claimed_at
                );
            }
        }

        Commands::State { command } => match command {
            StateCommands::Get { task_id } => match machine.get_state(&task_id) {
                Some(state) => println!("{state}"),
                None => println!("(no state)"),
            },
            StateCommands::History { task_id } => {
                for entry in machine.get_state_history(&task_id) {
                    let from = entry
                        .from_state
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{} -> {}", entry.ts.to_rfc3339(), from, entry.to_state);
                }
            }
            StateCommands::Init {
                task_id,
                state,
                context,
            } => {
                let state = parse_state(&state)?;
                let new = machine.initialize(&task_id, state, parse_context(&context)?)?;
                println!("{task_id}: {new}");
            }
            StateCommands::Set {
                task_id,
                state,
                context,
            } => {
                let state = parse_state(&state)?;
                let new = machine.transition(&task_id, state, parse_context(&context)?)?;
                println!("{task_id}: {new}");
            }
        },

        Commands::Conflicts { .. } => {
            let locks = store.read_all();
            let oracle = LivenessOracle::tmux();
            let liveness = oracle.evaluate_locks(&locks, &config.session).await;

            // Only live workers whose workspace is actually on disk take
            // part in the pass; a stale lock's worktree may be long gone.
            let workers: Vec<WorkerInfo> = locks
                .iter()
                .zip(liveness.iter())
                .filter(|(_, (_, live))| *live == Liveness::Active)
                .map(|(lock, _)| {
                    WorkerInfo::new(
                        &lock.task_id,
                        config.worktrees_dir.join(&lock.task_id),
                        &lock.pane,
                        &lock.window,
                    )
                })
                .filter(|worker| worker.workspace.exists())
                .collect();

            let report = detect_file_conflicts(&backend, &workers, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.blocked {
                bail!("conflicts detected and block_on_conflict is set");
            }
        }

        Commands::Workspaces { command } => match command {
            WorkspaceCommands::List { repo } => {
                backend.ensure_repo(&repo).await?;
                for ws in backend.list_workspaces(&repo).await? {
                    println!(
                        "{}\t{}\t{}",
                        ws.path.display(),
                        ws.branch.as_deref().unwrap_or("(detached)"),
                        ws.commit
                    );
                }
            }
            WorkspaceCommands::Create {
                task_id,
                repo,
                base_ref,
            } => {
                backend.ensure_repo(&repo).await?;
                let path = config.worktrees_dir.join(&task_id);
                let info = backend.ensure_workspace(&repo, &path, &base_ref).await?;
                println!("{}\t{}", info.path.display(), info.commit);
            }
            WorkspaceCommands::Remove { path } => {
                let removed = backend.remove_workspace(&path).await?;
                println!("{}", if removed { "removed" } else { "nothing to remove" });
            }
            WorkspaceCommands::Reset { path } => {
                backend.reset_workspace(&path).await?;
                println!("reset {}", path.display());
            }
        },
    }

    Ok(())
}

/// Parse a lifecycle state argument.
fn parse_state(raw: &str) -> Result<TaskState> {
    raw.parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("expected one of: queued, claimed, in_progress, paused, completed, failed")
}

/// Parse repeated `key=value` context arguments.
fn parse_context(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("invalid context entry (expected key=value): {entry}"))
        })
        .collect()
}
