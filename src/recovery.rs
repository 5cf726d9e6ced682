// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Failure finalization: rollback a failed task's workspace, then record
//! the FAILED transition.
//!
//! When `rollback_on_failure` is enabled, the workspace is hard-reset
//! before the FAILED state is finalized, so a later retry starts from the
//! base ref instead of half-finished edits. A failure of the reset itself
//! is logged and swallowed: the task is already failing, and a rollback
//! problem must not cascade into losing the FAILED record.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::config::WardenConfig;
use crate::error::StateError;
use crate::state::{TaskState, TaskStateMachine};
use crate::workspace::VcsBackend;

/// Mark a task FAILED, rolling back its workspace first if configured.
pub async fn finalize_failure(
    machine: &TaskStateMachine,
    backend: &dyn VcsBackend,
    config: &WardenConfig,
    task_id: &str,
    workspace: Option<&Path>,
    context: BTreeMap<String, String>,
) -> Result<TaskState, StateError> {
    if config.rollback_on_failure {
        match workspace {
            Some(path) => {
                if let Err(e) = backend.reset_workspace(path).await {
                    warn!(
                        task_id,
                        workspace = %path.display(),
                        error = %e,
                        "rollback failed; recording FAILED anyway"
                    );
                } else {
                    info!(task_id, workspace = %path.display(), "workspace rolled back");
                }
            }
            None => {
                warn!(task_id, "rollback requested but no workspace known");
            }
        }
    }

    machine.transition(task_id, TaskState::Failed, context)
}
