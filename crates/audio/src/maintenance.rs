// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered-mode background services: the cache pruner evicts local objects
//! that are safely durable elsewhere, the upload reconciler re-uploads
//! local objects the remote tier never received.

use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use relay_core::clock::Clock;
use relay_core::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const CACHE_PRUNER_INTERVAL: Duration = Duration::from_secs(3_600);
const UPLOAD_RECONCILER_INTERVAL: Duration = Duration::from_secs(5 * 60);
const UPLOAD_RECONCILER_INITIAL_DELAY: Duration = Duration::from_secs(2 * 60);

pub struct MaintenanceServices {
    shutdown: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceServices {
    pub fn spawn<C: Clock + 'static>(
        local: Arc<LocalBackend>,
        remote: Arc<dyn RemoteBackend>,
        metrics: Arc<Metrics>,
        clock: C,
        retention_ms: u64,
        size_cap_bytes: u64,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let mut tasks = Vec::with_capacity(2);

        tasks.push({
            let shutdown = Arc::clone(&shutdown);
            let local = Arc::clone(&local);
            let remote = Arc::clone(&remote);
            let clock = clock.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(CACHE_PRUNER_INTERVAL);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.notified() => break,
                        _ = ticker.tick() => prune_cache(&local, remote.as_ref(), clock.epoch_ms(), retention_ms, size_cap_bytes).await,
                    }
                }
            })
        });

        tasks.push({
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                tokio::time::sleep(UPLOAD_RECONCILER_INITIAL_DELAY).await;
                reconcile_uploads(&local, remote.as_ref(), &metrics).await;
                let mut ticker = tokio::time::interval(UPLOAD_RECONCILER_INTERVAL);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.notified() => break,
                        _ = ticker.tick() => reconcile_uploads(&local, remote.as_ref(), &metrics).await,
                    }
                }
            })
        });

        Self { shutdown, tasks }
    }

    pub async fn shutdown(self) {
        self.shutdown.notify_waiters();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn prune_cache(local: &LocalBackend, remote: &dyn RemoteBackend, now_ms: u64, retention_ms: u64, size_cap_bytes: u64) {
    let mut objects = match local.list().await {
        Ok(objects) => objects,
        Err(err) => {
            warn!(error = %err, "cache pruner failed to list local objects");
            return;
        }
    };

    let total_bytes: u64 = objects.iter().map(|o| o.size_bytes).sum();
    objects.sort_by_key(|o| o.modified_ms);

    let mut evicted = 0usize;
    let mut remaining_bytes = total_bytes;
    for object in &objects {
        let age_ms = now_ms.saturating_sub(object.modified_ms);
        let past_retention = age_ms > retention_ms;
        let over_cap = remaining_bytes > size_cap_bytes;
        if !past_retention && !over_cap {
            continue;
        }
        match remote.exists(&object.key).await {
            Ok(true) => {
                if let Err(err) = local.remove(&object.key).await {
                    warn!(key = %object.key, error = %err, "cache pruner failed to remove local object");
                    continue;
                }
                remaining_bytes = remaining_bytes.saturating_sub(object.size_bytes);
                evicted += 1;
            }
            Ok(false) => {
                warn!(key = %object.key, "cache pruner skipped object not yet durable remotely");
            }
            Err(err) => {
                warn!(key = %object.key, error = %err, "cache pruner failed to verify remote durability");
            }
        }
    }
    if evicted > 0 {
        info!(evicted, "cache pruner evicted local objects");
    }
}

async fn reconcile_uploads(local: &LocalBackend, remote: &dyn RemoteBackend, metrics: &Metrics) {
    let objects = match local.list().await {
        Ok(objects) => objects,
        Err(err) => {
            warn!(error = %err, "upload reconciler failed to list local objects");
            return;
        }
    };

    let mut reconciled = 0usize;
    for object in objects {
        match remote.exists(&object.key).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                warn!(key = %object.key, error = %err, "upload reconciler failed to check remote");
                continue;
            }
        }
        let bytes = match local.open(&object.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(err) => {
                warn!(key = %object.key, error = %err, "upload reconciler failed to read local object");
                continue;
            }
        };
        match remote.put(&object.key, bytes, None).await {
            Ok(()) => {
                Metrics::incr(&metrics.audio_reconciles);
                reconciled += 1;
            }
            Err(err) => warn!(key = %object.key, error = %err, "upload reconciler re-upload failed"),
        }
    }
    if reconciled > 0 {
        info!(reconciled, "upload reconciler re-uploaded local-only objects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::clock::FakeClock;
    use relay_core::ports::AudioStoreError;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeRemote {
        objects: StdMutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl RemoteBackend for FakeRemote {
        async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: Option<&str>) -> Result<(), AudioStoreError> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }
        async fn exists(&self, key: &str) -> Result<bool, AudioStoreError> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }
    }

    #[tokio::test]
    async fn prune_evicts_only_objects_verified_remote() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalBackend::new(dir.path());
        local.save("durable.wav", b"1").await.unwrap();
        local.save("orphan.wav", b"2").await.unwrap();

        let remote = FakeRemote { objects: StdMutex::new(HashMap::new()) };
        remote.objects.lock().unwrap().insert("durable.wav".to_string(), b"1".to_vec());

        prune_cache(&local, &remote, 100_000_000, 0, u64::MAX).await;

        assert!(local.open("durable.wav").await.unwrap().is_none());
        assert!(local.open("orphan.wav").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reconcile_reuploads_local_only_objects() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalBackend::new(dir.path());
        local.save("needs_upload.wav", b"abc").await.unwrap();

        let remote = FakeRemote { objects: StdMutex::new(HashMap::new()) };
        let metrics = Metrics::default();

        reconcile_uploads(&local, &remote, &metrics).await;

        assert!(remote.exists("needs_upload.wav").await.unwrap());
    }

    #[tokio::test]
    async fn services_spawn_and_shut_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalBackend::new(dir.path()));
        let remote: Arc<dyn RemoteBackend> = Arc::new(FakeRemote { objects: StdMutex::new(HashMap::new()) });
        let services = MaintenanceServices::spawn(local, remote, Arc::new(Metrics::default()), FakeClock::new(), 86_400_000, u64::MAX);
        services.shutdown().await;
    }
}
