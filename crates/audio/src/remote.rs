// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote blob-store boundary. A concrete client (S3, GCS, a trunk-
//! recorder-compatible HTTP upload endpoint) implements this trait; nothing
//! here assumes a specific backend.

use async_trait::async_trait;
use relay_core::ports::AudioStoreError;

/// The external remote object store, as seen by the tiered audio store.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<(), AudioStoreError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, AudioStoreError>;
}
