// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing initialization for driver processes.
//!
//! Drivers are short-lived CLI invocations, so this stays minimal: an
//! env-filtered fmt subscriber. `RUST_LOG` overrides the default level.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default log level if `RUST_LOG` is not set.
    pub default_level: Level,
    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,
    /// Whether to include target module path.
    pub include_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            ansi_colors: true,
            include_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Verbose output for debugging drivers.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            ansi_colors: true,
            include_target: true,
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call once per process; a second call reports the error from
/// the underlying subscriber instead of panicking.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))
}
