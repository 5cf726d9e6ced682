// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock file storage.
//!
//! Lock files are newline-separated `key=value` lines. Required keys are
//! `id`, `pane`, `window`, `agent`, and `claimed_at` (ISO-8601). The state
//! machine appends two optional keys, `state` and `state_history`, without
//! disturbing the others.
//!
//! Writers always go through a temp-file-then-rename so a concurrent reader
//! never observes a half-written file. That rename is the only concurrency
//! primitive in the whole system; there is no advisory lock or lease, and
//! two racing writers resolve as last-writer-wins.
//!
//! Parsing is deliberately lenient: a missing file, a missing or empty
//! required field, or a garbage timestamp yields `None` with a log line,
//! never an error. Polling callers must survive corrupt or half-claimed
//! locks without crashing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::LockError;
use crate::state::{StateTransition, TaskState};

/// File extension for lock files.
const LOCK_EXT: &str = "lock";

/// Keys that must be present and non-empty for a lock to parse.
const REQUIRED_KEYS: &[&str] = &["id", "pane", "window", "agent", "claimed_at"];

/// On-disk record asserting that a worker owns a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    /// Task identifier (by convention `bd-xxxx`).
    pub task_id: String,
    /// Identifier of the tmux pane the worker runs in (e.g. `%12`).
    pub pane: String,
    /// Window/terminal label the pane belongs to.
    pub window: String,
    /// Name of the agent occupying the pane.
    pub agent: String,
    /// When the task was claimed (UTC).
    pub claimed_at: DateTime<Utc>,
    /// Current lifecycle state, if the state machine has recorded one.
    pub state: Option<TaskState>,
    /// Ordered transition history, if recorded.
    pub history: Vec<StateTransition>,
}

impl Lock {
    /// Create a lock claimed now, with no recorded state.
    pub fn new(
        task_id: impl Into<String>,
        pane: impl Into<String>,
        window: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            pane: pane.into(),
            window: window.into(),
            agent: agent.into(),
            claimed_at: Utc::now(),
            state: None,
            history: Vec::new(),
        }
    }

    /// Serialize to `key=value` lines.
    fn to_lines(&self) -> Result<String, LockError> {
        let mut out = String::new();
        out.push_str(&format!("id={}\n", self.task_id));
        out.push_str(&format!("pane={}\n", self.pane));
        out.push_str(&format!("window={}\n", self.window));
        out.push_str(&format!("agent={}\n", self.agent));
        out.push_str(&format!("claimed_at={}\n", self.claimed_at.to_rfc3339()));
        if let Some(state) = self.state {
            out.push_str(&format!("state={state}\n"));
        }
        if !self.history.is_empty() {
            let json = serde_json::to_string(&self.history).map_err(|e| {
                LockError::HistorySerialization {
                    task_id: self.task_id.clone(),
                    message: e.to_string(),
                }
            })?;
            out.push_str(&format!("state_history={json}\n"));
        }
        Ok(out)
    }
}

/// Lock storage rooted at a locks directory.
#[derive(Debug, Clone)]
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    /// Create a store over the given locks directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The locks directory this store reads and writes.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for a task.
    pub fn lock_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.{LOCK_EXT}"))
    }

    /// Write a lock, creating the locks directory if needed.
    ///
    /// The file is written to a temp sibling and atomically renamed into
    /// place so readers never see a partial lock.
    pub fn write(&self, lock: &Lock) -> Result<(), LockError> {
        let contents = lock.to_lines()?;
        std::fs::create_dir_all(&self.dir).map_err(|e| LockError::Io {
            task_id: lock.task_id.clone(),
            source: e,
        })?;
        let path = self.lock_path(&lock.task_id);
        write_atomic(&path, &contents).map_err(|e| LockError::Io {
            task_id: lock.task_id.clone(),
            source: e,
        })?;
        debug!(task_id = %lock.task_id, path = %path.display(), "lock written");
        Ok(())
    }

    /// Parse the lock for a task, or `None` if absent or corrupt.
    pub fn parse(&self, task_id: &str) -> Option<Lock> {
        parse_lock(&self.lock_path(task_id))
    }

    /// Enumerate all parsable locks in the directory, sorted by task id.
    ///
    /// Corrupt or half-written entries are skipped (and logged by `parse_lock`);
    /// a missing directory is an empty fleet, not an error.
    pub fn read_all(&self) -> Vec<Lock> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "locks directory not readable");
                return Vec::new();
            }
        };

        let mut locks: Vec<Lock> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(LOCK_EXT))
            .filter_map(|path| parse_lock(&path))
            .collect();
        locks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        locks
    }

    /// Read the raw ordered `key=value` lines of a task's lock file.
    ///
    /// Returns `None` if the file is missing or unreadable. Lines that do not
    /// contain `=` are preserved by [`LockStore::patch`] but not reported here.
    pub fn read_fields(&self, task_id: &str) -> Option<Vec<(String, String)>> {
        let contents = std::fs::read_to_string(self.lock_path(task_id)).ok()?;
        Some(
            contents
                .lines()
                .filter_map(|line| {
                    line.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect(),
        )
    }

    /// Update or append specific keys in a lock file, in place.
    ///
    /// All other lines, including keys this crate does not know about, are
    /// preserved verbatim. If no lock file exists yet one is created holding
    /// only the given keys. The rewrite is atomic.
    pub fn patch(&self, task_id: &str, updates: &[(&str, String)]) -> Result<(), LockError> {
        let path = self.lock_path(task_id);
        let mut lines: Vec<String> = match std::fs::read_to_string(&path) {
            Ok(contents) => contents.lines().map(|l| l.to_string()).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(LockError::Io {
                    task_id: task_id.to_string(),
                    source: e,
                })
            }
        };

        for (key, value) in updates {
            let prefix = format!("{key}=");
            match lines.iter_mut().find(|line| line.starts_with(&prefix)) {
                Some(line) => *line = format!("{key}={value}"),
                None => lines.push(format!("{key}={value}")),
            }
        }

        let mut contents = lines.join("\n");
        contents.push('\n');

        std::fs::create_dir_all(&self.dir).map_err(|e| LockError::Io {
            task_id: task_id.to_string(),
            source: e,
        })?;
        write_atomic(&path, &contents).map_err(|e| LockError::Io {
            task_id: task_id.to_string(),
            source: e,
        })
    }

    /// Remove a task's lock file. Missing files are fine (already cleaned up).
    pub fn remove(&self, task_id: &str) -> Result<bool, LockError> {
        match std::fs::remove_file(self.lock_path(task_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Io {
                task_id: task_id.to_string(),
                source: e,
            }),
        }
    }
}

/// Parse a lock file, or `None` if absent or corrupt.
///
/// Never returns an error: every failure mode (missing file, missing or
/// empty required field, bad timestamp) is logged and collapsed to `None`.
/// A bad optional field (`state`, `state_history`) degrades to absent on
/// its own without discarding the rest of the lock.
pub fn parse_lock(path: &Path) -> Option<Lock> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "lock file not readable");
            return None;
        }
    };

    let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key, value);
        }
    }

    for key in REQUIRED_KEYS {
        match fields.get(key) {
            Some(value) if !value.is_empty() => {}
            _ => {
                warn!(path = %path.display(), key, "lock missing required field");
                return None;
            }
        }
    }

    let claimed_at = match DateTime::parse_from_rfc3339(fields["claimed_at"]) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(
                path = %path.display(),
                claimed_at = fields["claimed_at"],
                error = %e,
                "lock has unparsable claim timestamp"
            );
            return None;
        }
    };

    let state = fields.get("state").and_then(|raw| match raw.parse() {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "lock has invalid state value");
            None
        }
    });

    let history = fields
        .get("state_history")
        .and_then(|raw| match serde_json::from_str(raw) {
            Ok(history) => Some(history),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lock has invalid state history");
                None
            }
        })
        .unwrap_or_default();

    Some(Lock {
        task_id: fields["id"].to_string(),
        pane: fields["pane"].to_string(),
        window: fields["window"].to_string(),
        agent: fields["agent"].to_string(),
        claimed_at,
        state,
        history,
    })
}

/// Write contents to a temp sibling then atomically rename into place.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("lock.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_lock() -> Lock {
        Lock {
            task_id: "bd-0042".to_string(),
            pane: "%12".to_string(),
            window: "village:3".to_string(),
            agent: "claude".to_string(),
            claimed_at: "2026-02-01T10:15:30.123456789Z".parse().unwrap(),
            state: Some(TaskState::Claimed),
            history: vec![StateTransition {
                ts: "2026-02-01T10:15:30.123456789Z".parse().unwrap(),
                from_state: None,
                to_state: TaskState::Claimed,
                context: [("pane_id".to_string(), "%12".to_string())].into(),
            }],
        }
    }

    #[test]
    fn test_write_parse_round_trip() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        let lock = sample_lock();

        store.write(&lock).unwrap();
        let parsed = store.parse("bd-0042").unwrap();
        assert_eq!(parsed, lock);
    }

    #[test]
    fn test_round_trip_preserves_timestamp_precision() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        let lock = sample_lock();

        store.write(&lock).unwrap();
        let parsed = store.parse("bd-0042").unwrap();
        assert_eq!(parsed.claimed_at, lock.claimed_at);
        assert_eq!(parsed.claimed_at.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_parse_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        assert!(store.parse("bd-9999").is_none());
    }

    #[test]
    fn test_parse_missing_required_field_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bd-0001.lock");
        std::fs::write(&path, "id=bd-0001\npane=%1\nwindow=w\n").unwrap();
        assert!(parse_lock(&path).is_none());
    }

    #[test]
    fn test_parse_empty_required_field_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bd-0001.lock");
        std::fs::write(
            &path,
            "id=bd-0001\npane=\nwindow=w\nagent=a\nclaimed_at=2026-02-01T10:00:00Z\n",
        )
        .unwrap();
        assert!(parse_lock(&path).is_none());
    }

    #[test]
    fn test_parse_garbage_timestamp_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bd-0001.lock");
        std::fs::write(
            &path,
            "id=bd-0001\npane=%1\nwindow=w\nagent=a\nclaimed_at=yesterday\n",
        )
        .unwrap();
        assert!(parse_lock(&path).is_none());
    }

    #[test]
    fn test_parse_bad_optional_state_degrades() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bd-0001.lock");
        std::fs::write(
            &path,
            "id=bd-0001\npane=%1\nwindow=w\nagent=a\nclaimed_at=2026-02-01T10:00:00Z\nstate=running\n",
        )
        .unwrap();
        let lock = parse_lock(&path).unwrap();
        assert_eq!(lock.state, None);
    }

    #[test]
    fn test_patch_preserves_unknown_lines() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        let path = store.lock_path("bd-0001");
        std::fs::write(
            &path,
            "id=bd-0001\npane=%1\nwindow=w\nagent=a\nclaimed_at=2026-02-01T10:00:00Z\ncustom=kept\n",
        )
        .unwrap();

        store
            .patch("bd-0001", &[("state", "claimed".to_string())])
            .unwrap();
        store
            .patch("bd-0001", &[("state", "in_progress".to_string())])
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("custom=kept"));
        assert!(contents.contains("state=in_progress"));
        assert_eq!(contents.matches("state=").count(), 1);
        assert!(contents.contains("pane=%1"));
    }

    #[test]
    fn test_patch_creates_missing_file() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        store
            .patch("bd-0002", &[("state", "queued".to_string())])
            .unwrap();
        let contents = std::fs::read_to_string(store.lock_path("bd-0002")).unwrap();
        assert_eq!(contents, "state=queued\n");
    }

    #[test]
    fn test_read_all_skips_corrupt_locks() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        store.write(&sample_lock()).unwrap();
        std::fs::write(dir.path().join("bd-bad.lock"), "id=bd-bad\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me\n").unwrap();

        let locks = store.read_all();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].task_id, "bd-0042");
    }

    #[test]
    fn test_read_all_missing_dir_is_empty() {
        let store = LockStore::new("/nonexistent/locks/dir");
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn test_remove_missing_is_false() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path());
        assert!(!store.remove("bd-0001").unwrap());
        store.write(&sample_lock()).unwrap();
        assert!(store.remove("bd-0042").unwrap());
    }
}
