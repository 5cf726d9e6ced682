// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default village directory name (shared orchestration state root).
pub const DEFAULT_VILLAGE_DIR: &str = ".warden";

/// Default tmux session the fleet runs in.
pub const DEFAULT_SESSION: &str = "village";

/// Partial configuration as found in a config file.
///
/// Every field is optional; missing values fall through to the next source
/// in precedence order (CLI > workspace > global > defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    /// Whether detected file conflicts block scheduling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_on_conflict: Option<bool>,

    /// Whether a failing task's workspace is hard-reset before the task
    /// is marked failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_on_failure: Option<bool>,

    /// tmux session the fleet's panes live in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Root directory for shared orchestration state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub village_dir: Option<PathBuf>,

    /// Directory holding per-task lock files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locks_dir: Option<PathBuf>,

    /// Directory under which per-task workspaces are created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktrees_dir: Option<PathBuf>,
}

impl PartialConfig {
    /// Overlay `other` on top of `self` (fields set in `other` win).
    pub fn overlay(mut self, other: PartialConfig) -> Self {
        self.block_on_conflict = other.block_on_conflict.or(self.block_on_conflict);
        self.rollback_on_failure = other.rollback_on_failure.or(self.rollback_on_failure);
        self.session = other.session.or(self.session);
        self.village_dir = other.village_dir.or(self.village_dir);
        self.locks_dir = other.locks_dir.or(self.locks_dir);
        self.worktrees_dir = other.worktrees_dir.or(self.worktrees_dir);
        self
    }
}

/// Fully resolved configuration, read-only input to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardenConfig {
    pub block_on_conflict: bool,
    pub rollback_on_failure: bool,
    pub session: String,
    pub village_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub worktrees_dir: PathBuf,
}

impl WardenConfig {
    /// Resolve a partial config against defaults.
    ///
    /// `locks_dir` and `worktrees_dir` default to subdirectories of the
    /// (possibly overridden) village directory.
    pub fn resolve(partial: PartialConfig) -> Self {
        let village_dir = partial
            .village_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VILLAGE_DIR));
        let locks_dir = partial
            .locks_dir
            .unwrap_or_else(|| village_dir.join("locks"));
        let worktrees_dir = partial
            .worktrees_dir
            .unwrap_or_else(|| village_dir.join("worktrees"));

        Self {
            block_on_conflict: partial.block_on_conflict.unwrap_or(false),
            rollback_on_failure: partial.rollback_on_failure.unwrap_or(false),
            session: partial.session.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
            village_dir,
            locks_dir,
            worktrees_dir,
        }
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self::resolve(PartialConfig::default())
    }
}
