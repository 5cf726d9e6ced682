// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pane probing and lock liveness classification.
//!
//! Whether a worker is "alive" is never tracked directly; it is inferred
//! from whether the tmux pane named in its lock still exists. The probe is
//! a trait so the oracle is testable without a real tmux server.
//!
//! The oracle caches one pane snapshot per session. The cache has no TTL
//! and never invalidates itself; a caller that needs a fresh answer must
//! pass `force_refresh`. A failed probe (absent session, tmux not running)
//! is a legitimate "no panes" answer and is cached like any other result.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::lock::store::Lock;

/// Default timeout for pane probe subprocess calls.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness classification of a lock's owning pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The owning pane currently exists in the session.
    Active,
    /// The owning pane is gone; the worker has died or been closed.
    Stale,
}

impl Liveness {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Stale => f.write_str("STALE"),
        }
    }
}

/// Source of "which panes exist in this session" answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaneProbe: Send + Sync {
    /// List the pane identifiers currently open in a session.
    ///
    /// An absent session is an error at this layer; the oracle above it
    /// degrades that to an empty set.
    async fn list_panes(&self, session: &str) -> Result<Vec<String>, ProbeError>;
}

/// Pane probe backed by the `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxProbe {
    timeout: Duration,
}

impl TmuxProbe {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the subprocess timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TmuxProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaneProbe for TmuxProbe {
    async fn list_panes(&self, session: &str) -> Result<Vec<String>, ProbeError> {
        let future = Command::new("tmux")
            .args(["list-panes", "-s", "-t", session, "-F", "#{pane_id}"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout.as_millis() as u64))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Command(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

/// Classifies locks as active or stale against cached pane snapshots.
///
/// The cache is owned by the instance, never process-global, so parallel
/// tests and independent drivers don't observe each other's snapshots.
pub struct LivenessOracle {
    probe: Box<dyn PaneProbe>,
    cache: RwLock<HashMap<String, HashSet<String>>>,
}

impl LivenessOracle {
    /// Create an oracle over a pane probe.
    pub fn new(probe: Box<dyn PaneProbe>) -> Self {
        Self {
            probe,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Oracle over the real tmux binary.
    pub fn tmux() -> Self {
        Self::new(Box::new(TmuxProbe::new()))
    }

    /// The set of panes open in a session.
    ///
    /// The first query per session hits the probe and caches the result;
    /// later queries return the cached snapshot unless `force_refresh` is
    /// set, in which case the probe runs again and overwrites the cache.
    /// Probe failure yields an empty set, which is cached too.
    pub async fn panes(&self, session: &str, force_refresh: bool) -> HashSet<String> {
        if !force_refresh {
            if let Some(cached) = self.cache.read().await.get(session) {
                return cached.clone();
            }
        }

        let panes: HashSet<String> = match self.probe.list_panes(session).await {
            Ok(panes) => panes.into_iter().collect(),
            Err(e) => {
                debug!(session, error = %e, "pane probe failed; treating session as empty");
                HashSet::new()
            }
        };

        self.cache
            .write()
            .await
            .insert(session.to_string(), panes.clone());
        debug!(session, count = panes.len(), "pane snapshot cached");
        panes
    }

    /// Whether a specific pane currently exists in a session (cached).
    pub async fn pane_exists(&self, session: &str, pane: &str) -> bool {
        self.panes(session, false).await.contains(pane)
    }

    /// Classify one lock against the session's cached pane snapshot.
    pub async fn is_active(&self, lock: &Lock, session: &str) -> Liveness {
        if self.pane_exists(session, &lock.pane).await {
            Liveness::Active
        } else {
            Liveness::Stale
        }
    }

    /// Classify many locks against a single pane snapshot.
    ///
    /// The snapshot is fetched (or taken from cache) once, so evaluating a
    /// whole fleet costs at most one probe invocation.
    pub async fn evaluate_locks(
        &self,
        locks: &[Lock],
        session: &str,
    ) -> Vec<(String, Liveness)> {
        let panes = self.panes(session, false).await;
        locks
            .iter()
            .map(|lock| {
                let liveness = if panes.contains(&lock.pane) {
                    Liveness::Active
                } else {
                    warn!(task_id = %lock.task_id, pane = %lock.pane, "lock owner pane is gone");
                    Liveness::Stale
                };
                (lock.task_id.clone(), liveness)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_on_pane(task_id: &str, pane: &str) -> Lock {
        Lock::new(task_id, pane, "village:1", "claude")
    }

    fn probe_returning(panes: Vec<&'static str>) -> MockPaneProbe {
        let mut probe = MockPaneProbe::new();
        probe.expect_list_panes().times(1).returning(move |_| {
            Ok(panes.iter().map(|p| p.to_string()).collect())
        });
        probe
    }

    #[tokio::test]
    async fn test_active_when_pane_present() {
        let oracle = LivenessOracle::new(Box::new(probe_returning(vec!["%12", "%13"])));
        let lock = lock_on_pane("bd-0001", "%12");
        assert_eq!(oracle.is_active(&lock, "village").await, Liveness::Active);
    }

    #[tokio::test]
    async fn test_stale_when_pane_missing() {
        let oracle = LivenessOracle::new(Box::new(probe_returning(vec!["%13"])));
        let lock = lock_on_pane("bd-0001", "%12");
        assert_eq!(oracle.is_active(&lock, "village").await, Liveness::Stale);
    }

    #[tokio::test]
    async fn test_cache_is_sticky_without_force_refresh() {
        // Probe answers differently on each call, but times(1) also proves
        // the second query never reaches it.
        let mut probe = MockPaneProbe::new();
        probe
            .expect_list_panes()
            .times(1)
            .returning(|_| Ok(vec!["%13".to_string()]));
        let oracle = LivenessOracle::new(Box::new(probe));
        let lock = lock_on_pane("bd-0001", "%12");

        assert_eq!(oracle.is_active(&lock, "village").await, Liveness::Stale);
        assert_eq!(oracle.is_active(&lock, "village").await, Liveness::Stale);
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites_cache() {
        let mut probe = MockPaneProbe::new();
        let mut answers = vec![Vec::new(), vec!["%12".to_string()]].into_iter();
        probe
            .expect_list_panes()
            .times(2)
            .returning(move |_| Ok(answers.next().unwrap()));
        let oracle = LivenessOracle::new(Box::new(probe));

        assert!(oracle.panes("village", false).await.is_empty());
        let refreshed = oracle.panes("village", true).await;
        assert!(refreshed.contains("%12"));
        // Refresh overwrote the cached snapshot.
        assert!(oracle.pane_exists("village", "%12").await);
    }

    #[tokio::test]
    async fn test_probe_failure_cached_as_empty() {
        let mut probe = MockPaneProbe::new();
        probe
            .expect_list_panes()
            .times(1)
            .returning(|_| Err(ProbeError::Command("no such session".to_string())));
        let oracle = LivenessOracle::new(Box::new(probe));

        assert!(oracle.panes("ghost", false).await.is_empty());
        // Second call served from cache; the mock's times(1) enforces it.
        assert!(oracle.panes("ghost", false).await.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_locks_single_snapshot() {
        let oracle = LivenessOracle::new(Box::new(probe_returning(vec!["%1", "%3"])));
        let locks = vec![
            lock_on_pane("bd-0001", "%1"),
            lock_on_pane("bd-0002", "%2"),
            lock_on_pane("bd-0003", "%3"),
        ];

        let report = oracle.evaluate_locks(&locks, "village").await;
        assert_eq!(
            report,
            vec![
                ("bd-0001".to_string(), Liveness::Active),
                ("bd-0002".to_string(), Liveness::Stale),
                ("bd-0003".to_string(), Liveness::Active),
            ]
        );
    }

    #[test]
    fn test_liveness_display() {
        assert_eq!(Liveness::Active.to_string(), "ACTIVE");
        assert_eq!(Liveness::Stale.to_string(), "STALE");
    }
}
