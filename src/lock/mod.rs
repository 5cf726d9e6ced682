// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task lock records and worker liveness.
//!
//! A lock is the on-disk assertion that a worker currently owns a task: one
//! `<task_id>.lock` file of `key=value` lines in the shared locks directory.
//! Ownership is classified as active or stale by probing the terminal
//! multiplexer for the owning pane, never by tracking processes directly.
//!
//! - [`store`] — reading, writing, and patching lock files.
//! - [`liveness`] — the pane probe and the per-session liveness oracle.

pub mod liveness;
pub mod store;

pub use liveness::{Liveness, LivenessOracle, PaneProbe, TmuxProbe};
pub use store::{parse_lock, Lock, LockStore};
