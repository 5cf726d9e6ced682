// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The task state machine.
//!
//! Validates lifecycle transitions against a closed adjacency table and
//! persists them through the lock store: the current state as a `state=`
//! line, the full history as a single-line JSON `state_history=` entry,
//! and a best-effort record in the event log.
//!
//! The read-validate-write sequence is not atomic across the lock file and
//! the event log. Two drivers racing the same task can both pass validation
//! and the later write wins; the design accepts that window.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::lock::store::LockStore;
use crate::state::event_log::{EventLog, EventRecord};
use crate::state::types::{StateTransition, TaskState};

/// Allowed next states, per the lifecycle table.
pub fn valid_targets(from: TaskState) -> &'static [TaskState] {
    match from {
        TaskState::Queued => &[TaskState::Claimed],
        TaskState::Claimed => &[TaskState::InProgress, TaskState::Failed],
        TaskState::InProgress => &[
            TaskState::Paused,
            TaskState::Completed,
            TaskState::Failed,
        ],
        TaskState::Paused => &[TaskState::InProgress, TaskState::Failed],
        TaskState::Completed | TaskState::Failed => &[],
    }
}

/// Render a target set for error messages.
fn format_targets(targets: &[TaskState]) -> String {
    if targets.is_empty() {
        "none (terminal state)".to_string()
    } else {
        targets
            .iter()
            .map(TaskState::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Validates and persists task lifecycle transitions.
pub struct TaskStateMachine {
    store: LockStore,
    log: EventLog,
}

impl TaskStateMachine {
    pub fn new(store: LockStore, log: EventLog) -> Self {
        Self { store, log }
    }

    /// Record a task's first state.
    ///
    /// Fails if the task already has any persisted state (guard against
    /// double initialization). The starting state is conventionally
    /// `queued`, but any state is accepted so externally-determined
    /// lifecycles can be resumed.
    pub fn initialize(
        &self,
        task_id: &str,
        state: TaskState,
        context: BTreeMap<String, String>,
    ) -> Result<TaskState, StateError> {
        if let Some(current) = self.get_state(task_id) {
            return Err(StateError::AlreadyInitialized {
                task_id: task_id.to_string(),
                current,
            });
        }

        let entry = StateTransition::now(None, state, context.clone());
        let history = vec![entry];
        self.persist(task_id, state, &history, true)?;

        self.log_event(EventRecord::transition(task_id, None, state, context));
        info!(task_id, state = %state, "task initialized");
        Ok(state)
    }

    /// Apply one validated transition and return the new state.
    ///
    /// Fails with a message naming the valid target set when the task has
    /// no current state or `target` is not reachable from it. On success
    /// the history gains one entry, the persisted state is rewritten, and
    /// the event log gets a record (best-effort).
    pub fn transition(
        &self,
        task_id: &str,
        target: TaskState,
        context: BTreeMap<String, String>,
    ) -> Result<TaskState, StateError> {
        let current = self
            .get_state(task_id)
            .ok_or_else(|| StateError::NotInitialized {
                task_id: task_id.to_string(),
            })?;

        let targets = valid_targets(current);
        if !targets.contains(&target) {
            return Err(StateError::InvalidTransition {
                task_id: task_id.to_string(),
                from: current,
                to: target,
                valid: format_targets(targets),
            });
        }

        let mut history = self.get_state_history(task_id);
        history.push(StateTransition::now(Some(current), target, context.clone()));
        self.persist(task_id, target, &history, false)?;

        self.log_event(EventRecord::transition(
            task_id,
            Some(current),
            target,
            context,
        ));
        info!(task_id, from = %current, to = %target, "task transitioned");
        Ok(target)
    }

    /// The task's current state, or `None` if unrecorded or unreadable.
    pub fn get_state(&self, task_id: &str) -> Option<TaskState> {
        let fields = self.store.read_fields(task_id)?;
        let raw = fields.iter().rev().find(|(k, _)| k == "state")?;
        match raw.1.parse() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(task_id, error = %e, "unreadable state value; treating as absent");
                None
            }
        }
    }

    /// The task's transition history, oldest first; empty on any error.
    pub fn get_state_history(&self, task_id: &str) -> Vec<StateTransition> {
        let Some(fields) = self.store.read_fields(task_id) else {
            return Vec::new();
        };
        let Some((_, raw)) = fields.iter().rev().find(|(k, _)| k == "state_history") else {
            return Vec::new();
        };
        match serde_json::from_str(raw) {
            Ok(history) => history,
            Err(e) => {
                warn!(task_id, error = %e, "unreadable state history; treating as empty");
                Vec::new()
            }
        }
    }

    /// Patch state and history into the lock file atomically.
    fn persist(
        &self,
        task_id: &str,
        state: TaskState,
        history: &[StateTransition],
        include_id: bool,
    ) -> Result<(), StateError> {
        let history_json =
            serde_json::to_string(history).map_err(|e| StateError::Persistence {
                task_id: task_id.to_string(),
                source: crate::error::LockError::HistorySerialization {
                    task_id: task_id.to_string(),
                    message: e.to_string(),
                },
            })?;

        let mut updates: Vec<(&str, String)> = Vec::new();
        // A task initialized before any worker claims it gets a minimal
        // lock file holding the id and state lines only.
        if include_id && self.store.read_fields(task_id).is_none() {
            updates.push(("id", task_id.to_string()));
        }
        updates.push(("state", state.as_str().to_string()));
        updates.push(("state_history", history_json));

        if let Err(e) = self.store.patch(task_id, &updates) {
            // On-disk state stays at its last good value; re-read to report it.
            let on_disk = self.get_state(task_id);
            warn!(task_id, error = %e, on_disk = ?on_disk, "state persist failed");
            return Err(StateError::Persistence {
                task_id: task_id.to_string(),
                source: e,
            });
        }
        Ok(())
    }

    /// Append to the event log; failures are logged, never escalated.
    ///
    /// The lock file is authoritative even when its audit trail is not
    /// writable.
    fn log_event(&self, record: EventRecord) {
        if let Err(e) = self.log.append(&record) {
            warn!(
                task_id = %record.task_id,
                path = %self.log.path().display(),
                error = %e,
                "event log append failed (non-fatal)"
            );
        } else {
            debug!(task_id = %record.task_id, "event logged");
        }
    }
}
