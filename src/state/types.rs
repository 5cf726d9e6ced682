// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lifecycle state and transition history types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// Serialized lowercase (`in_progress` etc.) in lock files and the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Task is waiting to be claimed.
    Queued,
    /// A worker has claimed the task but not started work.
    Claimed,
    /// The worker is actively working.
    InProgress,
    /// Work is suspended; may resume.
    Paused,
    /// Task finished successfully. Terminal.
    Completed,
    /// Task failed. Terminal.
    Failed,
}

impl TaskState {
    /// Wire representation (lowercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this state has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// All states, in lifecycle order.
    pub fn all() -> [TaskState; 6] {
        [
            Self::Queued,
            Self::Claimed,
            Self::InProgress,
            Self::Paused,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "claimed" => Ok(Self::Claimed),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task state: {other:?}")),
        }
    }
}

/// One immutable entry in a task's transition history.
///
/// `from_state` is `None` only for the entry written by `initialize`.
/// History is append-only; entries are never mutated or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// When the transition was recorded (UTC).
    pub ts: DateTime<Utc>,
    /// State before the transition; `None` for the initializing entry.
    pub from_state: Option<TaskState>,
    /// State after the transition.
    pub to_state: TaskState,
    /// Free-form context captured at transition time (pane id, error, ...).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl StateTransition {
    /// Build an entry stamped with the current time.
    pub fn now(
        from_state: Option<TaskState>,
        to_state: TaskState,
        context: BTreeMap<String, String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            from_state,
            to_state,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_str() {
        for state in TaskState::all() {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
    }

    #[test]
    fn test_state_serde_lowercase() {
        let json = serde_json::to_string(&TaskState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskState = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(back, TaskState::Paused);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::InProgress.is_terminal());
    }

    #[test]
    fn test_unknown_state_rejected() {
        assert!("done".parse::<TaskState>().is_err());
        assert!("QUEUED".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_transition_history_json_shape() {
        let entry = StateTransition {
            ts: "2026-02-01T10:00:00Z".parse().unwrap(),
            from_state: None,
            to_state: TaskState::Queued,
            context: BTreeMap::new(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("from_state").unwrap().is_null());
        assert_eq!(json.get("to_state").unwrap(), "queued");
    }
}
