// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the warden orchestration core.
//!
//! This module provides strongly-typed errors for each subsystem, using
//! `thiserror` for ergonomic error definitions and `anyhow` for propagation
//! at the binary surface.
//!
//! Absence is not an error here: a missing lock file, an absent tmux session,
//! or a workspace that is no longer listed come back as `None` / empty
//! collections from the read paths. These enums cover the cases where a
//! caller's assumption was violated or a persistence write failed.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::TaskState;

/// Errors that can occur while persisting or updating lock files.
///
/// Read-side problems (missing file, corrupt field) never surface here;
/// `parse_lock` degrades to `None` instead.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("IO error writing lock for {task_id}: {source}")]
    Io {
        task_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state history for {task_id}: {message}")]
    HistorySerialization { task_id: String, message: String },
}

/// Errors that can occur during state machine operations.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Task {task_id} is already initialized (state: {current})")]
    AlreadyInitialized { task_id: String, current: TaskState },

    #[error("Task {task_id} has no recorded state; initialize it first")]
    NotInitialized { task_id: String },

    #[error("Invalid transition for {task_id}: {from} -> {to} (valid targets: {valid})")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
        valid: String,
    },

    #[error("Failed to persist state for {task_id}: {source}")]
    Persistence {
        task_id: String,
        #[source]
        source: LockError,
    },
}

/// Errors that can occur during workspace (VCS) operations.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Not a repository root: {0}")]
    NotARepo(PathBuf),

    #[error("Workspace already registered at {0}")]
    WorkspaceExists(PathBuf),

    #[error("Workspace does not exist: {0}")]
    WorkspaceMissing(PathBuf),

    #[error("Command timed out after {0}ms")]
    Timeout(u64),
}

/// Errors from the pane probe (terminal multiplexer queries).
///
/// The liveness oracle swallows these into an empty pane set; they surface
/// only to callers driving a probe directly.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tmux error: {0}")]
    Command(String),

    #[error("Probe timed out after {0}ms")]
    Timeout(u64),
}

/// Convenience alias used at the binary surface.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
