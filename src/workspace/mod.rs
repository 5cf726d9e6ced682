// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workspace lifecycle management behind a VCS-neutral trait.
//!
//! Every concurrently active worker gets its own isolated working copy (a
//! git worktree in the reference backend) so workers never edit the same
//! checkout. The [`VcsBackend`] trait is the capability contract: a second
//! backend implements the identical surface, and tests mock it without
//! touching a real repository.
//!
//! ```text
//! /project/                    # Main repo
//! ├── .git/
//! └── src/
//!
//! /worktrees/bd-0001/          # One workspace per active task
//! ├── .git                     # Worktree link file
//! └── src/
//! ```

pub mod git;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

pub use git::GitBackend;

/// Live description of one workspace, as reported by the backend.
///
/// Reflects version-control state at query time; never cached beyond a
/// single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    /// Root directory of the workspace.
    pub path: PathBuf,
    /// Branch or ref label checked out, if any (detached heads have none).
    pub branch: Option<String>,
    /// Commit identifier currently checked out.
    pub commit: String,
}

/// Capability interface implemented per version-control backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VcsBackend: Send + Sync {
    /// Verify that `root` is the root of a valid repository.
    ///
    /// A subdirectory of a repository or an uninitialized directory is an
    /// error, not a softer answer: every other operation assumes a real
    /// repo root.
    async fn ensure_repo(&self, root: &Path) -> Result<(), WorkspaceError>;

    /// Whether the repository has no uncommitted or untracked changes.
    async fn check_clean(&self, root: &Path) -> Result<bool, WorkspaceError>;

    /// Create an isolated workspace at `workspace_path` starting from `base_ref`.
    ///
    /// Fails if a workspace is already registered at that path.
    async fn ensure_workspace(
        &self,
        repo_root: &Path,
        workspace_path: &Path,
        base_ref: &str,
    ) -> Result<WorkspaceInfo, WorkspaceError>;

    /// Remove a workspace. Returns `false` (not an error) if nothing
    /// existed at the path, `true` on successful removal.
    async fn remove_workspace(&self, path: &Path) -> Result<bool, WorkspaceError>;

    /// Enumerate the workspaces of a repository, skipping entries whose
    /// directory no longer exists on disk.
    async fn list_workspaces(&self, root: &Path) -> Result<Vec<WorkspaceInfo>, WorkspaceError>;

    /// Hard-reset tracked changes and delete untracked/ignored files.
    ///
    /// The rollback primitive for failed tasks. A missing workspace is a
    /// hard error here — it means orchestration bookkeeping is wrong
    /// upstream, and silently "resetting" nothing would hide that.
    async fn reset_workspace(&self, path: &Path) -> Result<(), WorkspaceError>;

    /// List modified and untracked files, relative to the workspace root.
    ///
    /// Read-only query; callers that cannot tolerate failure should treat
    /// an `Err` as "no changes observed" (the conflict detector does).
    async fn modified_files(&self, root: &Path) -> Result<Vec<PathBuf>, WorkspaceError>;
}
