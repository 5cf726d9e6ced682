// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Git reference implementation of [`VcsBackend`].
//!
//! Workspaces are `git worktree`s. Every subprocess call is bounded by a
//! timeout; a timeout is reported like any other command failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{VcsBackend, WorkspaceInfo};
use crate::error::WorkspaceError;

/// Default timeout for git subprocess calls.
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Git-worktree backend.
#[derive(Debug, Clone)]
pub struct GitBackend {
    timeout: Duration,
}

impl GitBackend {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Override the subprocess timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a git command in a directory and return trimmed stdout.
    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
        Ok(self.git_raw(cwd, args).await?.trim().to_string())
    }

    /// Run a git command and return stdout untouched.
    ///
    /// `-z` output is positional (a status record starts with a possibly
    /// blank column), so trimming would corrupt it.
    async fn git_raw(&self, cwd: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
        let future = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| WorkspaceError::Timeout(self.timeout.as_millis() as u64))??;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(WorkspaceError::Git(stderr.trim().to_string()))
        }
    }

    /// Whether a local branch exists in the repository at `root`.
    async fn branch_exists(&self, root: &Path, branch: &str) -> bool {
        self.git(
            root,
            &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )
        .await
        .is_ok()
    }

    /// Parsed `git worktree list --porcelain` entries for a repository.
    async fn worktree_entries(&self, root: &Path) -> Result<Vec<WorktreeEntry>, WorkspaceError> {
        let output = self.git(root, &["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&output))
    }

    /// Root of the main working tree for the repository containing `path`.
    async fn main_worktree(&self, path: &Path) -> Result<PathBuf, WorkspaceError> {
        let entries = self.worktree_entries(path).await?;
        entries
            .into_iter()
            .next()
            .map(|entry| entry.path)
            .ok_or_else(|| WorkspaceError::Git("empty worktree list".to_string()))
    }
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VcsBackend for GitBackend {
    async fn ensure_repo(&self, root: &Path) -> Result<(), WorkspaceError> {
        let toplevel = self
            .git(root, &["rev-parse", "--show-toplevel"])
            .await
            .map_err(|_| WorkspaceError::NotARepo(root.to_path_buf()))?;

        let toplevel = PathBuf::from(toplevel);
        let canonical_root = root.canonicalize()?;
        let canonical_top = toplevel.canonicalize().unwrap_or(toplevel);
        if canonical_root != canonical_top {
            // A subdirectory of a repo is not a repo root.
            return Err(WorkspaceError::NotARepo(root.to_path_buf()));
        }
        Ok(())
    }

    async fn check_clean(&self, root: &Path) -> Result<bool, WorkspaceError> {
        let status = self
            .git_raw(root, &["status", "--porcelain=v1", "-z", "-uall"])
            .await?;
        Ok(status.is_empty())
    }

    async fn ensure_workspace(
        &self,
        repo_root: &Path,
        workspace_path: &Path,
        base_ref: &str,
    ) -> Result<WorkspaceInfo, WorkspaceError> {
        let registered = self.worktree_entries(repo_root).await?;
        if registered.iter().any(|entry| entry.path == workspace_path) {
            return Err(WorkspaceError::WorkspaceExists(workspace_path.to_path_buf()));
        }
        if workspace_path.exists() {
            return Err(WorkspaceError::WorkspaceExists(workspace_path.to_path_buf()));
        }

        let branch = branch_name_for(workspace_path);
        let path_str = workspace_path.to_string_lossy().to_string();

        info!(
            workspace = %workspace_path.display(),
            branch = %branch,
            base_ref,
            "creating workspace"
        );
        if self.branch_exists(repo_root, &branch).await {
            self.git(repo_root, &["worktree", "add", &path_str, &branch])
                .await?;
        } else {
            self.git(
                repo_root,
                &["worktree", "add", "-b", &branch, &path_str, base_ref],
            )
            .await?;
        }

        let commit = self.git(workspace_path, &["rev-parse", "HEAD"]).await?;
        Ok(WorkspaceInfo {
            path: workspace_path.to_path_buf(),
            branch: Some(branch),
            commit,
        })
    }

    async fn remove_workspace(&self, path: &Path) -> Result<bool, WorkspaceError> {
        if !path.exists() {
            debug!(path = %path.display(), "nothing to remove");
            return Ok(false);
        }

        let main = self.main_worktree(path).await?;
        let path_str = path.to_string_lossy().to_string();
        info!(workspace = %path.display(), "removing workspace");

        if let Err(e) = self
            .git(&main, &["worktree", "remove", "--force", &path_str])
            .await
        {
            warn!(workspace = %path.display(), error = %e, "git worktree remove failed; removing manually");
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
            let _ = self.git(&main, &["worktree", "prune"]).await;
        }
        Ok(true)
    }

    async fn list_workspaces(&self, root: &Path) -> Result<Vec<WorkspaceInfo>, WorkspaceError> {
        let entries = self.worktree_entries(root).await?;
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_bare && entry.path != canonical_root && entry.path.exists())
            .map(|entry| WorkspaceInfo {
                path: entry.path,
                branch: entry.branch,
                commit: entry.head,
            })
            .collect())
    }

    async fn reset_workspace(&self, path: &Path) -> Result<(), WorkspaceError> {
        if !path.exists() {
            // A missing workspace here means orchestration bookkeeping is
            // wrong upstream; surface it instead of pretending to reset.
            return Err(WorkspaceError::WorkspaceMissing(path.to_path_buf()));
        }

        info!(workspace = %path.display(), "hard-resetting workspace");
        self.git(path, &["reset", "--hard"]).await?;
        self.git(path, &["clean", "-fdx"]).await?;
        Ok(())
    }

    async fn modified_files(&self, root: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
        let output = self
            .git_raw(root, &["status", "--porcelain=v1", "-z", "-uall"])
            .await?;
        Ok(parse_status_paths(&output))
    }
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq)]
struct WorktreeEntry {
    path: PathBuf,
    head: String,
    branch: Option<String>,
    is_bare: bool,
}

/// Parse `git worktree list --porcelain` output.
fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current = WorktreeEntry::default();

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if !current.path.as_os_str().is_empty() {
                entries.push(std::mem::take(&mut current));
            }
            current.path = PathBuf::from(path);
        } else if let Some(head) = line.strip_prefix("HEAD ") {
            current.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            current.branch = Some(branch.to_string());
        } else if line == "bare" {
            current.is_bare = true;
        }
    }

    if !current.path.as_os_str().is_empty() {
        entries.push(current);
    }
    entries
}

/// Extract paths from `git status --porcelain=v1 -z` output.
///
/// With `-z`, records are NUL-separated and paths appear verbatim: no
/// quoting and no C-style escaping, so names with spaces or non-ASCII
/// bytes survive intact. A rename or copy record names the new path and
/// is followed by one extra NUL field holding the original path, which
/// does not matter for overlap detection and is skipped.
fn parse_status_paths(output: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut fields = output.split('\0');
    while let Some(record) = fields.next() {
        // "XY path" with a two-column status and one space.
        let cols = record.as_bytes();
        let Some(path) = record.get(3..).filter(|p| !p.is_empty()) else {
            continue;
        };
        paths.push(PathBuf::from(path));
        if matches!(cols[0], b'R' | b'C') || matches!(cols[1], b'R' | b'C') {
            fields.next();
        }
    }
    paths
}

/// Branch name derived from a workspace directory name.
fn branch_name_for(workspace_path: &Path) -> String {
    workspace_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".to_string())
}
