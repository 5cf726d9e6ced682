// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only event log for state transitions.
//!
//! One JSON object per line, keys sorted, appended to `events.log` in the
//! village directory. The log is an audit trail, not a source of truth:
//! the state machine treats append failures as non-fatal and the lock file
//! remains authoritative.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TaskState;

/// File name of the event log inside the village directory.
pub const EVENT_LOG_FILE: &str = "events.log";

/// One event-log line.
///
/// Fields are declared in alphabetical order so serde_json emits sorted
/// keys, which keeps the log diffable and greppable across writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Command that produced the event; `"state_transition"` for this core.
    pub cmd: String,
    /// Free-form context captured with the transition.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Error message when `result` is `"failure"`.
    pub error: Option<String>,
    /// State before the transition; null for initialization.
    pub from_state: Option<TaskState>,
    /// `"success"` or `"failure"`.
    pub result: String,
    /// Task the event belongs to.
    pub task_id: String,
    /// State after the transition.
    pub to_state: TaskState,
    /// When the event was recorded (UTC).
    pub ts: DateTime<Utc>,
}

impl EventRecord {
    /// A successful state-transition event stamped now.
    pub fn transition(
        task_id: impl Into<String>,
        from_state: Option<TaskState>,
        to_state: TaskState,
        context: BTreeMap<String, String>,
    ) -> Self {
        Self {
            cmd: "state_transition".to_string(),
            context,
            error: None,
            from_state,
            result: "success".to_string(),
            task_id: task_id.into(),
            to_state,
            ts: Utc::now(),
        }
    }
}

/// Append-only JSON-lines log.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Log living at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional log inside a village directory.
    pub fn in_village(village_dir: &Path) -> Self {
        Self::new(village_dir.join(EVENT_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub fn append(&self, record: &EventRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Read back all parsable records, skipping malformed lines.
    pub fn read_all(&self) -> Vec<EventRecord> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return Vec::new(),
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = EventLog::in_village(dir.path());

        let record = EventRecord::transition(
            "bd-0001",
            Some(TaskState::Queued),
            TaskState::Claimed,
            BTreeMap::new(),
        );
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let records = log.read_all();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record);
    }

    #[test]
    fn test_keys_are_sorted() {
        let record = EventRecord::transition("bd-0001", None, TaskState::Queued, BTreeMap::new());
        let line = serde_json::to_string(&record).unwrap();

        let keys: Vec<&str> = ["cmd", "context", "error", "from_state", "result", "task_id", "to_state", "ts"]
            .to_vec();
        let mut last = 0;
        for key in keys {
            let pos = line.find(&format!("\"{key}\"")).unwrap();
            assert!(pos >= last, "key {key} out of order in {line}");
            last = pos;
        }
    }

    #[test]
    fn test_read_all_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let log = EventLog::in_village(dir.path());
        let record = EventRecord::transition("bd-0001", None, TaskState::Queued, BTreeMap::new());
        log.append(&record).unwrap();
        std::fs::write(
            log.path(),
            format!("not json\n{}\n", serde_json::to_string(&record).unwrap()),
        )
        .unwrap();
        assert_eq!(log.read_all().len(), 1);
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let log = EventLog::new("/nonexistent/events.log");
        assert!(log.read_all().is_empty());
    }
}
