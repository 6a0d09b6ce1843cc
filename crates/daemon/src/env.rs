// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon binary.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the state directory: `RELAY_STATE_DIR` > `XDG_STATE_HOME/relay` >
/// `~/.local/state/relay`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("RELAY_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("relay"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/relay"))
}

/// Optional path to a pipeline config TOML file, overriding the bundled
/// defaults in [`relay_core::config::Config`].
pub fn pipeline_config_path() -> Option<PathBuf> {
    std::env::var("RELAY_CONFIG_PATH").ok().map(PathBuf::from)
}
