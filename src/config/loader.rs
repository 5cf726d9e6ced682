// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::PartialConfig;

/// Config file names to search for in the workspace root (in order).
pub const CONFIG_FILES: &[&str] = &[".warden.json", ".warden/config.json", "warden.config.json"];

/// Global config directory name under the home directory.
pub const GLOBAL_CONFIG_DIR: &str = ".warden";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Errors loading configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Get the global config file path (`~/.warden/config.json`).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration; `None` if no file exists.
pub fn load_global_config() -> Result<Option<PartialConfig>, ConfigError> {
    match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path).map(Some),
        _ => Ok(None),
    }
}

/// Load workspace configuration from the first matching config file name.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load one JSON configuration file.
pub fn load_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
