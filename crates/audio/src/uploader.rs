// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async upload mode: `Save` writes the local copy synchronously and
//! enqueues the remote upload to a bounded queue drained by a small worker
//! pool, each upload bounded by a fixed deadline.

use crate::remote::RemoteBackend;
use relay_core::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

const UPLOAD_WORKERS: usize = 2;
const UPLOAD_QUEUE_SIZE: usize = 500;
const UPLOAD_DEADLINE: Duration = Duration::from_secs(30);

struct UploadJob {
    key: String,
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// A running async uploader. Dropping the sender (via [`AsyncUploader::shutdown`])
/// drains the in-flight queue before the workers exit.
pub struct AsyncUploader {
    tx: mpsc::Sender<UploadJob>,
    tasks: Vec<JoinHandle<()>>,
}

impl AsyncUploader {
    pub fn spawn(remote: Arc<dyn RemoteBackend>, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(UPLOAD_QUEUE_SIZE);
        let rx = Arc::new(Mutex::new(rx));

        let tasks = (0..UPLOAD_WORKERS)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let remote = Arc::clone(&remote);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else { break };
                        run_upload(remote.as_ref(), &metrics, job).await;
                    }
                })
            })
            .collect();

        Self { tx, tasks }
    }

    /// Returns `false` if the queue was full; the caller logs/counts the drop.
    pub fn enqueue(&self, key: String, bytes: Vec<u8>, content_type: Option<String>) -> bool {
        self.tx.try_send(UploadJob { key, bytes, content_type }).is_ok()
    }

    pub async fn shutdown(self) {
        drop(self.tx);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn run_upload(remote: &dyn RemoteBackend, metrics: &Metrics, job: UploadJob) {
    let result = tokio::time::timeout(UPLOAD_DEADLINE, remote.put(&job.key, job.bytes, job.content_type.as_deref())).await;
    match result {
        Ok(Ok(())) => Metrics::incr(&metrics.audio_uploads),
        Ok(Err(err)) => {
            warn!(key = %job.key, error = %err, "async remote upload failed");
            Metrics::incr(&metrics.audio_upload_failures);
        }
        Err(_) => {
            warn!(key = %job.key, "async remote upload timed out");
            Metrics::incr(&metrics.audio_upload_failures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::ports::AudioStoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRemote {
        puts: AtomicUsize,
    }

    #[async_trait]
    impl RemoteBackend for CountingRemote {
        async fn put(&self, _key: &str, _bytes: Vec<u8>, _content_type: Option<&str>) -> Result<(), AudioStoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
            Ok(None)
        }
        async fn exists(&self, _key: &str) -> Result<bool, AudioStoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn enqueued_upload_reaches_remote() {
        let remote = Arc::new(CountingRemote { puts: AtomicUsize::new(0) });
        let metrics = Arc::new(Metrics::default());
        let uploader = AsyncUploader::spawn(remote.clone(), metrics);

        assert!(uploader.enqueue("calls/1.wav".into(), vec![1, 2, 3], None));
        tokio::time::sleep(Duration::from_millis(50)).await;
        uploader.shutdown().await;

        assert_eq!(remote.puts.load(Ordering::SeqCst), 1);
    }
}
