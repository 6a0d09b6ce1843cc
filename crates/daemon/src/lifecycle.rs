// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-level filesystem layout and startup errors around the pipeline
//! orchestrator.

use std::path::PathBuf;

use relay_core::config::{Config, ConfigError};

use crate::env;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("could not resolve a state directory: set RELAY_STATE_DIR or HOME")]
    NoStateDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] relay_storage::StoreError),
}

/// Filesystem layout and pipeline configuration for one daemon instance.
pub struct DaemonConfig {
    pub state_dir: PathBuf,
    pub log_path: PathBuf,
    pub store_path: PathBuf,
    pub pipeline: Config,
}

impl DaemonConfig {
    /// Resolve paths from the environment and load the pipeline config, if
    /// `RELAY_CONFIG_PATH` names one. A missing override is not an error —
    /// every pipeline field has a documented default.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        let pipeline = match env::pipeline_config_path() {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        Ok(Self {
            log_path: state_dir.join("relayd.log"),
            store_path: state_dir.join("store.wal"),
            state_dir,
            pipeline,
        })
    }
}
