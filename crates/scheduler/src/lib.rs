// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance Scheduler: periodic partition maintenance, stats refresh,
//! and TTL sweeps, each running as its own background task against a
//! shared [`Dispatcher`].
//!
//! One `tokio::spawn` + `tokio::time::interval` task per concern rather
//! than one loop multiplexing all of them, so a slow maintenance run never
//! delays the 10 s dedup sweep.

use relay_core::clock::Clock;
use relay_ingest::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const PARTITION_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 3_600);
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);
const TALKGROUP_STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const AFFILIATION_EVICT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Handle to the scheduler's background tasks. Dropping it does not stop
/// them; call [`MaintenanceScheduler::shutdown`] for an orderly stop.
pub struct MaintenanceScheduler {
    shutdown: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Spawn all periodic tasks. Partition maintenance and the paired
    /// active-call expiry reconciliation run once immediately, then on
    /// their interval.
    pub fn spawn<C: Clock + 'static>(dispatcher: Arc<Dispatcher<C>>, clock: C) -> Self {
        let shutdown = Arc::new(Notify::new());
        let mut tasks = Vec::with_capacity(5);

        tasks.push(spawn_loop(Arc::clone(&shutdown), PARTITION_MAINTENANCE_INTERVAL, true, {
            let dispatcher = Arc::clone(&dispatcher);
            let clock = clock.clone();
            move || run_partition_maintenance(Arc::clone(&dispatcher), clock.clone())
        }));

        tasks.push(spawn_loop(Arc::clone(&shutdown), STATS_LOG_INTERVAL, false, {
            let dispatcher = Arc::clone(&dispatcher);
            move || log_stats(Arc::clone(&dispatcher))
        }));

        tasks.push(spawn_loop(Arc::clone(&shutdown), TALKGROUP_STATS_INTERVAL, false, {
            let dispatcher = Arc::clone(&dispatcher);
            move || refresh_talkgroup_stats(Arc::clone(&dispatcher))
        }));

        tasks.push(spawn_loop(Arc::clone(&shutdown), DEDUP_SWEEP_INTERVAL, false, {
            let dispatcher = Arc::clone(&dispatcher);
            let clock = clock.clone();
            move || sweep_dedup(Arc::clone(&dispatcher), clock.clone())
        }));

        tasks.push(spawn_loop(Arc::clone(&shutdown), AFFILIATION_EVICT_INTERVAL, false, {
            let dispatcher = Arc::clone(&dispatcher);
            let clock = clock.clone();
            move || evict_affiliations(Arc::clone(&dispatcher), clock.clone())
        }));

        Self { shutdown, tasks }
    }

    /// Signal every task to stop and wait for them to finish their current
    /// cycle.
    pub async fn shutdown(self) {
        self.shutdown.notify_waiters();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Run `body` once immediately (if `run_immediately`), then every
/// `interval`, until `shutdown` fires.
fn spawn_loop<F, Fut>(shutdown: Arc<Notify>, interval: Duration, run_immediately: bool, mut body: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        if run_immediately {
            body().await;
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // interval's first tick fires immediately; consume it
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                _ = ticker.tick() => body().await,
            }
        }
    })
}

async fn run_partition_maintenance<C: Clock>(dispatcher: Arc<Dispatcher<C>>, clock: C) {
    let now_ms = clock.epoch_ms();
    match dispatcher.run_partition_maintenance(now_ms).await {
        Ok(report) => info!(?report, "partition maintenance complete"),
        Err(err) => {
            warn!(error = %err, "partition maintenance failed");
            return;
        }
    }
    let expired = dispatcher.expire_stale_active_calls(dispatcher.stale_recording_ms(), now_ms);
    if expired > 0 {
        info!(expired, "reconciled stale active-call entries");
    }
}

async fn log_stats<C: Clock>(dispatcher: Arc<Dispatcher<C>>) {
    info!(active_calls = dispatcher.active_call_count(), "scheduler stats tick");
}

async fn refresh_talkgroup_stats<C: Clock>(dispatcher: Arc<Dispatcher<C>>) {
    match dispatcher.refresh_talkgroup_stats().await {
        Ok(touched) => info!(touched, "talkgroup stats refreshed"),
        Err(err) => warn!(error = %err, "talkgroup stats refresh failed"),
    }
}

async fn sweep_dedup<C: Clock>(dispatcher: Arc<Dispatcher<C>>, clock: C) {
    let swept = dispatcher.sweep_dedup(clock.epoch_ms());
    if swept > 0 {
        info!(swept, "dedup sweep");
    }
}

async fn evict_affiliations<C: Clock>(dispatcher: Arc<Dispatcher<C>>, clock: C) {
    let evicted = dispatcher.evict_affiliations(clock.epoch_ms());
    if evicted > 0 {
        info!(evicted, "affiliation eviction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::clock::FakeClock;
    use relay_core::config::Config;
    use relay_core::metrics::Metrics;
    use relay_ingest::DispatcherDeps;
    use relay_storage::batch::FlushFn;
    use relay_storage::{spawn_batch_writer, BatchWriterConfig, MemStore, RecorderSnapshot, TrunkingMessageRow};
    use std::sync::Arc;

    fn noop_writer<T: Send + 'static>(name: &'static str, metrics: Arc<Metrics>) -> relay_storage::BatchWriterHandle<T> {
        let flush: FlushFn<T> = Arc::new(|_rows| Box::pin(async { Ok(()) }));
        spawn_batch_writer(BatchWriterConfig::new(name, 10, Duration::from_secs(60)), metrics, flush)
    }

    fn test_dispatcher() -> Arc<Dispatcher<FakeClock>> {
        let store: Arc<dyn relay_storage::Store> = Arc::new(MemStore::in_memory());
        let metrics = Arc::new(Metrics::default());
        let config = Arc::new(Config::default());
        let bus = relay_bus::EventBus::new(config.event_ring_capacity, Arc::clone(&metrics));
        let clock = FakeClock::new();

        let raw_writer = noop_writer::<relay_core::domain::RawMessage>("raw", Arc::clone(&metrics));
        let recorder_writer = noop_writer::<RecorderSnapshot>("recorder", Arc::clone(&metrics));
        let trunking_writer = noop_writer::<TrunkingMessageRow>("trunking", Arc::clone(&metrics));

        Arc::new(Dispatcher::new(DispatcherDeps {
            store,
            bus,
            warmup: Arc::new(relay_ingest::WarmupGate::new(10_000)),
            metrics,
            config,
            raw_writer,
            recorder_writer,
            trunking_writer,
            audio_store: None,
            transcription_queue: None,
            clock,
        }))
    }

    #[tokio::test]
    async fn partition_maintenance_runs_without_error() {
        let dispatcher = test_dispatcher();
        run_partition_maintenance(Arc::clone(&dispatcher), FakeClock::new()).await;
    }

    #[tokio::test]
    async fn talkgroup_stats_refresh_runs_without_error() {
        let dispatcher = test_dispatcher();
        refresh_talkgroup_stats(dispatcher).await;
    }

    #[tokio::test]
    async fn scheduler_spawns_and_shuts_down_cleanly() {
        let dispatcher = test_dispatcher();
        let scheduler = MaintenanceScheduler::spawn(dispatcher, FakeClock::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;
    }
}
