// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the warden core.
//!
//! Sources, merged in precedence order (CLI > workspace > global > defaults):
//! - Global config: `~/.warden/config.json`
//! - Workspace config: `.warden.json`, `.warden/config.json`, or
//!   `warden.config.json` in the workspace root
//! - CLI options
//!
//! The resolved [`WardenConfig`] is a read-only input to the core: the
//! `block_on_conflict` and `rollback_on_failure` policy flags plus the
//! filesystem roots (`locks_dir`, `worktrees_dir`, `village_dir`).

mod loader;
mod types;

use std::path::{Path, PathBuf};

pub use loader::{
    global_config_path, load_config_file, load_global_config, load_workspace_config, ConfigError,
    CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};
pub use types::{PartialConfig, WardenConfig, DEFAULT_SESSION, DEFAULT_VILLAGE_DIR};

/// Command-line overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub block_on_conflict: Option<bool>,
    pub rollback_on_failure: Option<bool>,
    pub session: Option<String>,
    pub village_dir: Option<PathBuf>,
    pub locks_dir: Option<PathBuf>,
    pub worktrees_dir: Option<PathBuf>,
}

impl From<CliOptions> for PartialConfig {
    fn from(cli: CliOptions) -> Self {
        Self {
            block_on_conflict: cli.block_on_conflict,
            rollback_on_failure: cli.rollback_on_failure,
            session: cli.session,
            village_dir: cli.village_dir,
            locks_dir: cli.locks_dir,
            worktrees_dir: cli.worktrees_dir,
        }
    }
}

/// Load and merge all configuration sources for a workspace.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<WardenConfig, ConfigError> {
    let mut merged = PartialConfig::default();
    if let Some(global) = load_global_config()? {
        merged = merged.overlay(global);
    }
    if let Some(workspace) = load_workspace_config(workspace_root)? {
        merged = merged.overlay(workspace);
    }
    merged = merged.overlay(cli_options.into());
    Ok(WardenConfig::resolve(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_overrides_workspace_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(".warden.json"),
            r#"{"blockOnConflict": false, "session": "from-file"}"#,
        )
        .unwrap();

        let cli = CliOptions {
            block_on_conflict: Some(true),
            ..Default::default()
        };
        let config = load_config(dir.path(), cli).unwrap();
        assert!(config.block_on_conflict);
        assert_eq!(config.session, "from-file");
    }

    #[test]
    fn test_defaults_without_any_source() {
        let dir = tempdir().unwrap();
        // Resolve from the workspace alone; the home-directory config (if
        // any) belongs to the environment, not this test.
        let workspace = load_workspace_config(dir.path()).unwrap();
        assert!(workspace.is_none());
        let config = WardenConfig::resolve(PartialConfig::default());
        assert_eq!(config, WardenConfig::default());
    }
}
