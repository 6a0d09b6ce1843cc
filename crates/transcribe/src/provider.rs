// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The external transcription provider boundary. A concrete client (HTTP
//! call to a hosted ASR service, or a local model runner) implements this
//! trait; nothing in this crate assumes a specific provider.

use async_trait::async_trait;
use relay_core::transcription::ProviderResult;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response could not be parsed: {0}")]
    InvalidResponse(String),
    #[error("provider call exceeded its deadline")]
    Timeout,
}

/// An external transcription provider. `name` and `model` identify the
/// provider/model pair for the persisted transcript row.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn transcribe(&self, audio: Vec<u8>) -> Result<ProviderResult, ProviderError>;
}
