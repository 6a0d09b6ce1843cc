// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boundary traits for downstream collaborators (the tiered audio store,
//! the transcription worker pool) that the dispatcher calls through without
//! pulling either crate in as a direct dependency.

use crate::transcription::TranscriptionJob;
use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AudioStoreError {
    #[error("audio store io error: {0}")]
    Io(String),
    #[error("remote audio backend error: {0}")]
    Remote(String),
    #[error("key escapes the configured store root: {0}")]
    InvalidKey(String),
}

/// The tiered audio store's external surface, as seen by the dispatcher and
/// the transcription worker pool. Concrete composition (local-only,
/// remote-only, tiered) is an implementation detail of whichever crate
/// provides it.
#[async_trait]
pub trait AudioStore: Send + Sync {
    async fn save(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<(), AudioStoreError>;

    /// Read an object, preferring the local tier and falling back to
    /// remote with a best-effort write-through.
    async fn open(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError>;

    /// The local filesystem path for `key`, if the object has a local copy.
    fn local_path(&self, key: &str) -> Option<std::path::PathBuf>;
}

/// The transcription worker pool's enqueue surface.
pub trait TranscriptionQueue: Send + Sync {
    /// Returns `false` if the bounded queue was full (the job is dropped,
    /// logged and counted by the caller).
    fn enqueue(&self, job: TranscriptionJob) -> bool;
}
