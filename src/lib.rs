// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Warden - filesystem-coordinated orchestration for fleets of coding agents.
//!
//! Coordinates many concurrent, crash-prone agent workers without a central
//! server or database. Each worker is an independent OS process in its own
//! tmux pane, working in its own isolated git worktree; all shared state is
//! plain files in a locks directory, and liveness is inferred from pane
//! existence rather than tracked directly.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`lock`] - Lock files (`key=value`, atomic replace-on-write) and the
//!   pane-probing liveness oracle
//! - [`state`] - Per-task lifecycle state machine with persisted transition
//!   history and an append-only event log
//! - [`workspace`] - Workspace lifecycle behind the [`workspace::VcsBackend`]
//!   trait; git worktrees as the reference backend
//! - [`conflict`] - Cross-workspace file-conflict detection
//! - [`recovery`] - Failure finalization with optional workspace rollback
//! - [`config`] - Configuration loading and merging
//! - [`error`] - Error types
//! - [`telemetry`] - Tracing initialization for driver processes
//!
//! # Coordination model
//!
//! There is no long-running coordinator and no inter-process mutex. Drivers
//! are short-lived single-threaded processes reading and writing the shared
//! locks directory; write-temp-then-atomic-rename is the only concurrency
//! primitive, and two drivers racing the same task resolve last-writer-wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden::config::{load_config, CliOptions};
//! use warden::lock::{LivenessOracle, LockStore};
//! use warden::state::{EventLog, TaskState, TaskStateMachine};
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let machine = TaskStateMachine::new(
//!     LockStore::new(&config.locks_dir),
//!     EventLog::in_village(&config.village_dir),
//! );
//! machine.initialize("bd-0001", TaskState::Queued, Default::default())?;
//!
//! let oracle = LivenessOracle::tmux();
//! let locks = LockStore::new(&config.locks_dir).read_all();
//! let liveness = oracle.evaluate_locks(&locks, &config.session).await;
//! ```

pub mod config;
pub mod conflict;
pub mod error;
pub mod lock;
pub mod recovery;
pub mod state;
pub mod telemetry;
pub mod workspace;

// Re-export commonly used types at crate root
pub use config::{CliOptions, WardenConfig};
pub use conflict::{detect_file_conflicts, find_overlaps, Conflict, ConflictReport, WorkerInfo};
pub use error::{LockError, ProbeError, StateError, WorkspaceError};
pub use lock::{parse_lock, Liveness, LivenessOracle, Lock, LockStore, PaneProbe, TmuxProbe};
pub use recovery::finalize_failure;
pub use state::{EventLog, EventRecord, StateTransition, TaskState, TaskStateMachine};
pub use workspace::{GitBackend, VcsBackend, WorkspaceInfo};
