// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File-conflict detection across concurrently active workers.
//!
//! Each worker edits its own isolated workspace, so nothing stops two
//! workers from touching the same file in their separate copies; the
//! collision only surfaces at merge time. This module compares the
//! modified-file sets of all active workspaces and reports every path
//! touched by two or more tasks.
//!
//! Conflicts are advisory, recomputed on every pass, and never persisted.
//! The snapshot can be stale relative to the moment of scheduling; that
//! race is acceptable because nothing safety-critical hangs off it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::WardenConfig;
use crate::error::WorkspaceError;
use crate::workspace::VcsBackend;

/// One currently active worker, assembled by the caller from live lock
/// and liveness data. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub task_id: String,
    pub workspace: PathBuf,
    pub pane: String,
    pub window: String,
}

impl WorkerInfo {
    pub fn new(
        task_id: impl Into<String>,
        workspace: impl Into<PathBuf>,
        pane: impl Into<String>,
        window: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            workspace: workspace.into(),
            pane: pane.into(),
            window: window.into(),
        }
    }
}

/// One file path modified by two or more workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Path relative to the workspace roots involved.
    pub path: PathBuf,
    /// Sorted, deduplicated ids of the tasks that touched the path (≥ 2).
    pub task_ids: Vec<String>,
    /// Distinct workspace directories involved, sorted.
    pub workspaces: Vec<PathBuf>,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    /// Whether execution should be blocked, per `block_on_conflict`.
    pub blocked: bool,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// List the files a workspace has modified, as absolute paths.
///
/// A nonexistent workspace directory is a hard error — the caller's
/// bookkeeping claimed a workspace that isn't there. A VCS query failure,
/// by contrast, degrades to "no changes" with a warning: one unreadable
/// worker must not block the whole fleet.
pub async fn modified_files(
    backend: &dyn VcsBackend,
    workspace: &Path,
) -> Result<Vec<PathBuf>, WorkspaceError> {
    if !workspace.exists() {
        return Err(WorkspaceError::WorkspaceMissing(workspace.to_path_buf()));
    }

    match backend.modified_files(workspace).await {
        Ok(paths) => Ok(paths.into_iter().map(|p| workspace.join(p)).collect()),
        Err(e) => {
            warn!(
                workspace = %workspace.display(),
                error = %e,
                "VCS status query failed; treating workspace as unchanged"
            );
            Ok(Vec::new())
        }
    }
}

/// Group per-task modified files into conflicts.
///
/// `modified` maps task id to that task's modified files (absolute);
/// `workspaces` maps task id to its workspace root, used to reduce each
/// file to its workspace-relative path so the same edit in two separate
/// working copies lands on one index key. Output is deterministic for
/// identical input (BTree ordering throughout) and contains no
/// single-task entries.
pub fn find_overlaps(
    modified: &BTreeMap<String, Vec<PathBuf>>,
    workspaces: &BTreeMap<String, PathBuf>,
) -> Vec<Conflict> {
    let mut index: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();

    for (task_id, files) in modified {
        for file in files {
            let key = match workspaces.get(task_id) {
                Some(root) => file.strip_prefix(root).unwrap_or(file).to_path_buf(),
                None => file.clone(),
            };
            index.entry(key).or_default().insert(task_id.clone());
        }
    }

    index
        .into_iter()
        .filter(|(_, tasks)| tasks.len() >= 2)
        .map(|(path, tasks)| {
            let roots: BTreeSet<PathBuf> = tasks
                .iter()
                .filter_map(|id| workspaces.get(id).cloned())
                .collect();
            Conflict {
                path,
                task_ids: tasks.into_iter().collect(),
                workspaces: roots.into_iter().collect(),
            }
        })
        .collect()
}

/// Run one full detection pass over the active workers.
///
/// Queries each worker's workspace through the backend, computes overlaps,
/// and applies the `block_on_conflict` policy flag from configuration.
pub async fn detect_file_conflicts(
    backend: &dyn VcsBackend,
    workers: &[WorkerInfo],
    config: &WardenConfig,
) -> Result<ConflictReport, WorkspaceError> {
    let mut modified: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut workspaces: BTreeMap<String, PathBuf> = BTreeMap::new();

    for worker in workers {
        let files = modified_files(backend, &worker.workspace).await?;
        debug!(
            task_id = %worker.task_id,
            workspace = %worker.workspace.display(),
            count = files.len(),
            "collected modified files"
        );
        workspaces.insert(worker.task_id.clone(), worker.workspace.clone());
        modified.insert(worker.task_id.clone(), files);
    }

    let conflicts = find_overlaps(&modified, &workspaces);
    let blocked = config.block_on_conflict && !conflicts.is_empty();
    if blocked {
        warn!(count = conflicts.len(), "conflicts detected; blocking");
    }
    Ok(ConflictReport { conflicts, blocked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MockVcsBackend;
    use tempfile::tempdir;

    fn map<K: Ord + Clone, V: Clone>(pairs: &[(K, V)]) -> BTreeMap<K, V> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_find_overlaps_basic() {
        // bd-A touches src/main.go; bd-B touches src/main.go and src/util.go.
        let workspaces = map(&[
            ("bd-A".to_string(), PathBuf::from("/wt/bd-A")),
            ("bd-B".to_string(), PathBuf::from("/wt/bd-B")),
        ]);
        let modified = map(&[
            (
                "bd-A".to_string(),
                vec![PathBuf::from("/wt/bd-A/src/main.go")],
            ),
            (
                "bd-B".to_string(),
                vec![
                    PathBuf::from("/wt/bd-B/src/main.go"),
                    PathBuf::from("/wt/bd-B/src/util.go"),
                ],
            ),
        ]);

        let conflicts = find_overlaps(&modified, &workspaces);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, PathBuf::from("src/main.go"));
        assert_eq!(conflicts[0].task_ids, vec!["bd-A", "bd-B"]);
        assert_eq!(
            conflicts[0].workspaces,
            vec![PathBuf::from("/wt/bd-A"), PathBuf::from("/wt/bd-B")]
        );
    }

    #[test]
    fn test_find_overlaps_single_task_no_conflict() {
        let workspaces = map(&[("bd-A".to_string(), PathBuf::from("/wt/bd-A"))]);
        let modified = map(&[(
            "bd-A".to_string(),
            vec![PathBuf::from("/wt/bd-A/src/main.go")],
        )]);
        assert!(find_overlaps(&modified, &workspaces).is_empty());
    }

    #[test]
    fn test_find_overlaps_symmetric() {
        let workspaces = map(&[
            ("bd-A".to_string(), PathBuf::from("/wt/bd-A")),
            ("bd-B".to_string(), PathBuf::from("/wt/bd-B")),
        ]);
        let forward = map(&[
            ("bd-A".to_string(), vec![PathBuf::from("/wt/bd-A/x.rs")]),
            ("bd-B".to_string(), vec![PathBuf::from("/wt/bd-B/x.rs")]),
        ]);
        // Same content regardless of which task the iteration visits first:
        // BTreeMap construction order below is reversed.
        let reverse: BTreeMap<String, Vec<PathBuf>> = forward.clone().into_iter().rev().collect();

        assert_eq!(
            find_overlaps(&forward, &workspaces),
            find_overlaps(&reverse, &workspaces)
        );
    }

    #[test]
    fn test_find_overlaps_three_way() {
        let workspaces = map(&[
            ("bd-A".to_string(), PathBuf::from("/wt/a")),
            ("bd-B".to_string(), PathBuf::from("/wt/b")),
            ("bd-C".to_string(), PathBuf::from("/wt/c")),
        ]);
        let modified = map(&[
            ("bd-A".to_string(), vec![PathBuf::from("/wt/a/shared.rs")]),
            ("bd-B".to_string(), vec![PathBuf::from("/wt/b/shared.rs")]),
            ("bd-C".to_string(), vec![PathBuf::from("/wt/c/shared.rs")]),
        ]);

        let conflicts = find_overlaps(&modified, &workspaces);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].task_ids, vec!["bd-A", "bd-B", "bd-C"]);
        assert_eq!(conflicts[0].workspaces.len(), 3);
    }

    #[tokio::test]
    async fn test_modified_files_missing_workspace_is_hard_error() {
        let backend = MockVcsBackend::new();
        let result = modified_files(&backend, Path::new("/definitely/not/here")).await;
        assert!(matches!(result, Err(WorkspaceError::WorkspaceMissing(_))));
    }

    #[tokio::test]
    async fn test_modified_files_query_failure_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let mut backend = MockVcsBackend::new();
        backend
            .expect_modified_files()
            .returning(|_| Err(WorkspaceError::Git("status failed".to_string())));

        let files = modified_files(&backend, dir.path()).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_modified_files_are_absolute() {
        let dir = tempdir().unwrap();
        let mut backend = MockVcsBackend::new();
        backend
            .expect_modified_files()
            .returning(|_| Ok(vec![PathBuf::from("src/lib.rs")]));

        let files = modified_files(&backend, dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("src/lib.rs")]);
    }

    #[tokio::test]
    async fn test_detect_blocks_when_configured() {
        let ws_a = tempdir().unwrap();
        let ws_b = tempdir().unwrap();
        let mut backend = MockVcsBackend::new();
        backend
            .expect_modified_files()
            .returning(|_| Ok(vec![PathBuf::from("src/main.go")]));

        let workers = vec![
            WorkerInfo::new("bd-A", ws_a.path(), "%1", "w1"),
            WorkerInfo::new("bd-B", ws_b.path(), "%2", "w2"),
        ];

        let blocking = WardenConfig {
            block_on_conflict: true,
            ..WardenConfig::default()
        };
        let report = detect_file_conflicts(&backend, &workers, &blocking)
            .await
            .unwrap();
        assert!(report.has_conflicts());
        assert!(report.blocked);

        let advisory = WardenConfig::default();
        let report = detect_file_conflicts(&backend, &workers, &advisory)
            .await
            .unwrap();
        assert!(report.has_conflicts());
        assert!(!report.blocked);
    }

    #[tokio::test]
    async fn test_detect_no_workers_no_conflicts() {
        let backend = MockVcsBackend::new();
        let report = detect_file_conflicts(&backend, &[], &WardenConfig::default())
            .await
            .unwrap();
        assert!(!report.has_conflicts());
        assert!(!report.blocked);
    }
}
