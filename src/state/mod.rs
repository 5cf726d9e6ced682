// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task lifecycle state machine.
//!
//! Each task claimed by a worker moves through a closed set of lifecycle
//! states, persisted as extra lines in the task's lock file and mirrored to
//! an append-only event log. Only transitions listed in the adjacency table
//! are accepted; `completed` and `failed` are terminal.
//!
//! ```text
//! queued ──> claimed ──> in_progress ──> completed
//!               │          │   ▲
//!               │          ▼   │
//!               │         paused
//!               │          │
//!               ▼          ▼
//!             failed <─────┘
//! ```
//!
//! The machine is driven by short-lived single-process callers; persistence
//! uses the lock store's atomic replace-on-write. There is no cross-process
//! mutual exclusion: two drivers racing the same task can both observe the
//! same prior state and the later write wins. That weak guarantee is part of
//! the contract, not an oversight.

pub mod event_log;
pub mod machine;
mod types;

pub use event_log::{EventLog, EventRecord, EVENT_LOG_FILE};
pub use machine::{valid_targets, TaskStateMachine};
pub use types::{StateTransition, TaskState};
