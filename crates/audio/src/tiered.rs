// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composes the local and remote tiers into the external [`AudioStore`]
//! surface, per the configured mode:
//!
//! | local | remote | effective store |
//! |---|---|---|
//! | yes | no  | local-only |
//! | no  | yes | remote-only |
//! | yes | yes | tiered: local authoritative for reads, remote for durability |

use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use crate::uploader::AsyncUploader;
use async_trait::async_trait;
use relay_core::ports::{AudioStore, AudioStoreError};
use relay_core::Metrics;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub struct TieredStore {
    local: Option<Arc<LocalBackend>>,
    remote: Option<Arc<dyn RemoteBackend>>,
    uploader: Option<AsyncUploader>,
    metrics: Arc<Metrics>,
}

impl TieredStore {
    pub fn local_only(root: impl Into<PathBuf>, metrics: Arc<Metrics>) -> Self {
        Self { local: Some(Arc::new(LocalBackend::new(root))), remote: None, uploader: None, metrics }
    }

    pub fn remote_only(remote: Arc<dyn RemoteBackend>, metrics: Arc<Metrics>) -> Self {
        Self { local: None, remote: Some(remote), uploader: None, metrics }
    }

    pub fn tiered_sync(root: impl Into<PathBuf>, remote: Arc<dyn RemoteBackend>, metrics: Arc<Metrics>) -> Self {
        Self { local: Some(Arc::new(LocalBackend::new(root))), remote: Some(remote), uploader: None, metrics }
    }

    pub fn tiered_async(root: impl Into<PathBuf>, remote: Arc<dyn RemoteBackend>, metrics: Arc<Metrics>) -> Self {
        let uploader = AsyncUploader::spawn(Arc::clone(&remote), Arc::clone(&metrics));
        Self { local: Some(Arc::new(LocalBackend::new(root))), remote: Some(remote), uploader: Some(uploader), metrics }
    }

    pub fn local_backend(&self) -> Option<&Arc<LocalBackend>> {
        self.local.as_ref()
    }

    pub fn remote_backend(&self) -> Option<&Arc<dyn RemoteBackend>> {
        self.remote.as_ref()
    }

    pub async fn shutdown(self) {
        if let Some(uploader) = self.uploader {
            uploader.shutdown().await;
        }
    }
}

#[async_trait]
impl AudioStore for TieredStore {
    async fn save(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<(), AudioStoreError> {
        match (&self.local, &self.remote) {
            (Some(local), None) => local.save(key, &bytes).await,
            (None, Some(remote)) => remote.put(key, bytes, content_type).await,
            (Some(local), Some(remote)) => {
                local.save(key, &bytes).await?;
                match &self.uploader {
                    Some(uploader) => {
                        if !uploader.enqueue(key.to_string(), bytes, content_type.map(str::to_string)) {
                            warn!(key, "async upload queue full, remote write dropped");
                        }
                        Ok(())
                    }
                    None => {
                        if let Err(err) = remote.put(key, bytes, content_type).await {
                            warn!(key, error = %err, "sync remote write failed, reconciler will retry");
                            Metrics::incr(&self.metrics.audio_upload_failures);
                        } else {
                            Metrics::incr(&self.metrics.audio_uploads);
                        }
                        Ok(())
                    }
                }
            }
            (None, None) => Err(AudioStoreError::Io("audio store has neither a local nor a remote tier configured".into())),
        }
    }

    async fn open(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
        match (&self.local, &self.remote) {
            (Some(local), None) => local.open(key).await,
            (None, Some(remote)) => remote.get(key).await,
            (Some(local), Some(remote)) => {
                if let Some(bytes) = local.open(key).await? {
                    return Ok(Some(bytes));
                }
                match remote.get(key).await? {
                    Some(bytes) => {
                        if let Err(err) = local.save(key, &bytes).await {
                            warn!(key, error = %err, "best-effort cache write-through failed");
                        }
                        Ok(Some(bytes))
                    }
                    None => Ok(None),
                }
            }
            (None, None) => Ok(None),
        }
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.local.as_ref().and_then(|l| l.local_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ports::AudioStoreError as Err_;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeRemote {
        objects: StdMutex<HashMap<String, Vec<u8>>>,
    }

    impl FakeRemote {
        fn new() -> Self {
            Self { objects: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl RemoteBackend for FakeRemote {
        async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: Option<&str>) -> Result<(), Err_> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Err_> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }
        async fn exists(&self, key: &str) -> Result<bool, Err_> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }
    }

    #[tokio::test]
    async fn local_only_never_touches_remote() {
        let dir = tempfile::tempdir().unwrap();
        let store = TieredStore::local_only(dir.path(), Arc::new(Metrics::default()));
        store.save("a.wav", vec![1, 2, 3], None).await.unwrap();
        assert_eq!(store.open("a.wav").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(store.local_path("a.wav").is_some());
    }

    #[tokio::test]
    async fn remote_only_has_no_local_path() {
        let remote = Arc::new(FakeRemote::new());
        let store = TieredStore::remote_only(remote, Arc::new(Metrics::default()));
        store.save("a.wav", vec![9], None).await.unwrap();
        assert_eq!(store.open("a.wav").await.unwrap(), Some(vec![9]));
        assert!(store.local_path("a.wav").is_none());
    }

    #[tokio::test]
    async fn tiered_sync_writes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::new());
        let store = TieredStore::tiered_sync(dir.path(), remote.clone(), Arc::new(Metrics::default()));
        store.save("a.wav", vec![4, 5], None).await.unwrap();
        assert!(remote.exists("a.wav").await.unwrap());
        assert_eq!(store.local_backend().unwrap().open("a.wav").await.unwrap(), Some(vec![4, 5]));
    }

    #[tokio::test]
    async fn open_falls_back_to_remote_and_caches_locally() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::new());
        remote.put("b.wav", vec![7, 7], None).await.unwrap();
        let store = TieredStore::tiered_sync(dir.path(), remote, Arc::new(Metrics::default()));

        assert_eq!(store.open("b.wav").await.unwrap(), Some(vec![7, 7]));
        // second read should now be served from local without remote
        assert_eq!(store.local_backend().unwrap().open("b.wav").await.unwrap(), Some(vec![7, 7]));
    }
}
