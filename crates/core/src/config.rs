// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline configuration, loaded from a TOML file with defaults for every
//! field so a minimal or empty file still produces a working config.

use serde::Deserialize;
use std::path::Path;

fn default_warmup_timeout_ms() -> u64 {
    5_000
}
fn default_batcher_max_size() -> usize {
    100
}
fn default_batcher_flush_interval_ms() -> u64 {
    2_000
}
fn default_event_ring_capacity() -> usize {
    4_096
}
fn default_active_call_fuzzy_window_ms() -> u64 {
    5_000
}
fn default_active_call_expiry_ms() -> u64 {
    3_600_000
}
fn default_dedup_window_ms() -> u64 {
    5_000
}
fn default_affiliation_ttl_ms() -> u64 {
    86_400_000
}
fn default_transcribe_queue_size() -> usize {
    500
}
fn default_transcribe_workers() -> usize {
    2
}
fn default_transcribe_min_seconds() -> f64 {
    1.0
}
fn default_transcribe_max_seconds() -> f64 {
    300.0
}
fn default_shutdown_deadline_ms() -> u64 {
    10_000
}
fn default_raw_retention_ms() -> u64 {
    7 * 24 * 3_600_000
}
fn default_stale_recording_ms() -> u64 {
    3_600_000
}
fn default_provider_timeout_ms() -> u64 {
    60_000
}
fn default_audio_cache_retention_ms() -> u64 {
    24 * 3_600_000
}
fn default_audio_cache_size_cap_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}
fn default_audio_local_root() -> String {
    "./data/audio".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStoreMode {
    Local,
    Remote,
    Tiered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioUploadMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub raw_store_enabled: bool,
    #[serde(default)]
    pub raw_include_topics: Vec<String>,
    #[serde(default)]
    pub raw_exclude_topics: Vec<String>,

    #[serde(default = "default_warmup_timeout_ms")]
    pub warmup_timeout_ms: u64,

    #[serde(default = "default_batcher_max_size")]
    pub batcher_max_size: usize,
    #[serde(default = "default_batcher_flush_interval_ms")]
    pub batcher_flush_interval_ms: u64,

    #[serde(default = "default_event_ring_capacity")]
    pub event_ring_capacity: usize,

    #[serde(default = "default_active_call_fuzzy_window_ms")]
    pub active_call_fuzzy_window_ms: u64,
    #[serde(default = "default_active_call_expiry_ms")]
    pub active_call_expiry_ms: u64,

    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    #[serde(default = "default_affiliation_ttl_ms")]
    pub affiliation_ttl_ms: u64,

    #[serde(default = "default_transcribe_queue_size")]
    pub transcribe_queue_size: usize,
    #[serde(default = "default_transcribe_workers")]
    pub transcribe_workers: usize,
    #[serde(default = "default_transcribe_min_seconds")]
    pub transcribe_min_seconds: f64,
    #[serde(default = "default_transcribe_max_seconds")]
    pub transcribe_max_seconds: f64,

    #[serde(default)]
    pub audio_store_mode: Option<AudioStoreMode>,
    #[serde(default)]
    pub audio_upload_mode: Option<AudioUploadMode>,

    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,

    #[serde(default = "default_raw_retention_ms")]
    pub raw_retention_ms: u64,
    #[serde(default = "default_stale_recording_ms")]
    pub stale_recording_ms: u64,

    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    #[serde(default = "default_audio_local_root")]
    pub audio_local_root: String,
    #[serde(default = "default_audio_cache_retention_ms")]
    pub audio_cache_retention_ms: u64,
    #[serde(default = "default_audio_cache_size_cap_bytes")]
    pub audio_cache_size_cap_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty document deserializes with all defaults")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.warmup_timeout_ms, 5_000);
        assert_eq!(cfg.batcher_max_size, 100);
        assert_eq!(cfg.batcher_flush_interval_ms, 2_000);
        assert_eq!(cfg.event_ring_capacity, 4_096);
        assert_eq!(cfg.active_call_fuzzy_window_ms, 5_000);
        assert_eq!(cfg.active_call_expiry_ms, 3_600_000);
        assert_eq!(cfg.dedup_window_ms, 5_000);
        assert_eq!(cfg.affiliation_ttl_ms, 86_400_000);
        assert_eq!(cfg.transcribe_queue_size, 500);
        assert_eq!(cfg.transcribe_workers, 2);
        assert_eq!(cfg.shutdown_deadline_ms, 10_000);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let cfg: Config = toml::from_str("warmup_timeout_ms = 9999\n").unwrap();
        assert_eq!(cfg.warmup_timeout_ms, 9999);
        assert_eq!(cfg.batcher_max_size, 100);
    }
}
