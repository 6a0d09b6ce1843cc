// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the ingest pipeline. Handler code maps failures into
//! one of these variants so the dispatcher can decide whether to log-and-drop,
//! retry, or count toward a metric without ever propagating a panic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store unavailable, retryable: {0}")]
    TransientStore(String),

    #[error("malformed message on topic {topic}: {reason}")]
    MalformedMessage { topic: String, reason: String },

    #[error("no handler for topic {0}")]
    UnknownTopic(String),

    #[error("subscriber queue full")]
    QueueFull,

    #[error("subscriber too slow, dropped")]
    SlowSubscriber,

    #[error("transcription provider error: {0}")]
    ProviderError(String),

    #[error("identity cache miss for {0}, resolution required")]
    CachedIdentityMiss(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl IngestError {
    /// Whether this error indicates the operation should be retried by the
    /// caller rather than treated as terminal for the message.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::TransientStore(_))
    }
}
