// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bounded-queue transcription worker pool: `workers` concurrent tasks
//! pulling from a single shared queue, each running a job through
//! preprocessing, the provider, word attribution and persistence.

use crate::attribution::attribute_words;
use crate::preprocess::{preprocess_or_fallback, Preprocessor};
use crate::provider::Provider;
use relay_core::clock::Clock;
use relay_core::event::{BusEvent, EventKind};
use relay_core::ports::{AudioStore, TranscriptionQueue};
use relay_core::transcription::{Transcript, TranscriptionJob};
use relay_core::Metrics;
use relay_storage::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct WorkerPoolConfig {
    pub queue_size: usize,
    pub workers: usize,
    pub provider_timeout_ms: u64,
}

struct Shared<C> {
    store: Arc<dyn Store>,
    audio_store: Arc<dyn AudioStore>,
    provider: Arc<dyn Provider>,
    preprocessor: Arc<dyn Preprocessor>,
    bus: relay_bus::EventBus,
    metrics: Arc<Metrics>,
    provider_timeout: Duration,
    clock: C,
}

/// A running pool of transcription workers. Implements [`TranscriptionQueue`]
/// so the dispatcher can enqueue jobs without depending on this crate's
/// concrete types.
pub struct WorkerPool {
    tx: mpsc::Sender<TranscriptionJob>,
    tasks: Vec<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn spawn<C: Clock + 'static>(
        config: WorkerPoolConfig,
        store: Arc<dyn Store>,
        audio_store: Arc<dyn AudioStore>,
        provider: Arc<dyn Provider>,
        preprocessor: Arc<dyn Preprocessor>,
        bus: relay_bus::EventBus,
        metrics: Arc<Metrics>,
        clock: C,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            store,
            audio_store,
            provider,
            preprocessor,
            bus,
            metrics,
            provider_timeout: Duration::from_millis(config.provider_timeout_ms),
            clock,
        });

        let tasks = (0..config.workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(id, rx, shared))
            })
            .collect();

        Self { tx, tasks, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Stop accepting new jobs and wait for in-flight jobs to drain.
    pub async fn shutdown(self) {
        self.closed.store(true, Ordering::SeqCst);
        drop(self.tx);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl TranscriptionQueue for WorkerPool {
    fn enqueue(&self, job: TranscriptionJob) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.try_send(job).is_ok()
    }
}

async fn worker_loop<C: Clock>(id: usize, rx: Arc<Mutex<mpsc::Receiver<TranscriptionJob>>>, shared: Arc<Shared<C>>) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        process_job(id, &shared, job).await;
    }
}

async fn process_job<C: Clock>(worker_id: usize, shared: &Shared<C>, job: TranscriptionJob) {
    let call_id = job.call_id;

    let audio = match shared.audio_store.open(&job.audio_key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!(worker_id, %call_id, key = %job.audio_key, "audio object not found, skipping transcription");
            Metrics::incr(&shared.metrics.transcription_failure);
            return;
        }
        Err(err) => {
            warn!(worker_id, %call_id, error = %err, "failed to open call audio");
            Metrics::incr(&shared.metrics.transcription_failure);
            return;
        }
    };

    let audio = preprocess_or_fallback(shared.preprocessor.as_ref(), audio);

    let result = match tokio::time::timeout(shared.provider_timeout, shared.provider.transcribe(audio)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!(worker_id, %call_id, error = %err, "transcription provider error");
            Metrics::incr(&shared.metrics.transcription_failure);
            return;
        }
        Err(_) => {
            warn!(worker_id, %call_id, "transcription provider timed out");
            Metrics::incr(&shared.metrics.transcription_failure);
            return;
        }
    };

    let (words, segments) = attribute_words(&result.words, &job.transmissions, Some(&result.text));

    let transcript = Transcript {
        call_id,
        text: result.text,
        language: result.language,
        model: shared.provider.model().to_string(),
        provider: shared.provider.name().to_string(),
        duration_sec: result.duration_sec,
        word_count: words.len(),
        words,
        segments,
    };

    if let Err(err) = shared.store.insert_transcript(transcript.clone()).await {
        warn!(worker_id, %call_id, error = %err, "failed to persist transcript");
        Metrics::incr(&shared.metrics.transcription_failure);
        return;
    }

    Metrics::incr(&shared.metrics.transcription_success);
    info!(worker_id, %call_id, word_count = transcript.word_count, "transcription complete");

    shared.bus.publish(
        shared.clock.epoch_ms(),
        BusEvent {
            seq: String::new(),
            kind: EventKind::Transcription,
            subtype: None,
            system_id: None,
            site_id: None,
            tgid: None,
            unit_id: None,
            call_id: Some(call_id),
            emergency: false,
            payload: serde_json::json!({ "transcript": transcript }),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::config::Config;
    use relay_core::domain::CallId;
    use relay_core::ports::AudioStoreError;
    use relay_core::transcription::{ProviderResult, ProviderWord};
    use relay_storage::MemStore;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeAudioStore {
        objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl AudioStore for FakeAudioStore {
        async fn save(&self, _key: &str, _bytes: Vec<u8>, _content_type: Option<&str>) -> Result<(), AudioStoreError> {
            Ok(())
        }

        async fn open(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
            Ok(self.objects.get(key).cloned())
        }

        fn local_path(&self, _key: &str) -> Option<std::path::PathBuf> {
            None
        }
    }

    struct FakeProvider {
        calls: StdMutex<usize>,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        async fn transcribe(&self, _audio: Vec<u8>) -> Result<ProviderResult, crate::provider::ProviderError> {
            *self.calls.lock().unwrap() += 1;
            Ok(ProviderResult {
                text: "hello world".to_string(),
                language: Some("en".to_string()),
                duration_sec: 1.0,
                words: vec![ProviderWord { text: "hello".into(), start_sec: 0.0, duration_sec: 0.3 }],
            })
        }
    }

    fn pool_with(audio: HashMap<String, Vec<u8>>) -> (WorkerPool, Arc<MemStore>) {
        let store = Arc::new(MemStore::in_memory());
        let config = Config::default();
        let metrics = Arc::new(Metrics::default());
        let bus = relay_bus::EventBus::new(config.event_ring_capacity, Arc::clone(&metrics));
        let pool = WorkerPool::spawn(
            WorkerPoolConfig { queue_size: 4, workers: 1, provider_timeout_ms: 1_000 },
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(FakeAudioStore { objects: audio }),
            Arc::new(FakeProvider { calls: StdMutex::new(0) }),
            Arc::new(crate::preprocess::IdentityPreprocessor),
            bus,
            metrics,
            relay_core::clock::FakeClock::new(),
        );
        (pool, store)
    }

    #[tokio::test]
    async fn successful_job_persists_transcript() {
        let mut audio = HashMap::new();
        audio.insert("calls/1.wav".to_string(), vec![1, 2, 3]);
        let (pool, store) = pool_with(audio);

        let job = TranscriptionJob { call_id: CallId::new(), audio_key: "calls/1.wav".to_string(), transmissions: vec![] };
        let call_id = job.call_id;
        assert!(pool.enqueue(job));

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;

        let transcript = store.get_transcript(call_id).await.unwrap();
        assert!(transcript.is_some());
        assert_eq!(transcript.unwrap().text, "hello world");
    }

    #[tokio::test]
    async fn missing_audio_is_skipped_without_panic() {
        let (pool, store) = pool_with(HashMap::new());
        let job = TranscriptionJob { call_id: CallId::new(), audio_key: "missing.wav".to_string(), transmissions: vec![] };
        let call_id = job.call_id;
        assert!(pool.enqueue(job));

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;

        assert!(store.get_transcript(call_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_returns_false_once_queue_is_full() {
        let (pool, _store) = pool_with(HashMap::new());
        // queue_size is 4 and there is only 1 worker; flood it faster than
        // it can drain to exercise the drop-signal path.
        let mut dropped = false;
        for i in 0..50 {
            let job = TranscriptionJob { call_id: CallId::new(), audio_key: format!("k{i}"), transmissions: vec![] };
            if !pool.enqueue(job) {
                dropped = true;
                break;
            }
        }
        assert!(dropped);
        pool.shutdown().await;
    }
}
