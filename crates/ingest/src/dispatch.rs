// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message dispatcher: the single entry point an inbound producer calls
//! for every message, wiring together routing, identity resolution,
//! active-call tracking, warmup gating, raw archival, and the typed
//! handlers.

use crate::active_calls::ActiveCallTable;
use crate::affiliation::AffiliationMap;
use crate::dedup::UnitEventDedup;
use crate::handlers::{self, HandlerCx};
use crate::identity::IdentityResolver;
use crate::router::{self, Route};
use crate::warmup::WarmupGate;
use relay_core::clock::Clock;
use relay_core::config::Config;
use relay_core::domain::{RawMessage, Topic};
use relay_core::envelope::extract_instance_id;
use relay_core::error::IngestError;
use relay_core::metrics::Metrics;
use relay_core::ports::{AudioStore, TranscriptionQueue};
use relay_bus::EventBus;
use relay_storage::{BatchWriterHandle, RecorderSnapshot, Store, TrunkingMessageRow};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Dispatcher<C: Clock> {
    store: Arc<dyn Store>,
    bus: EventBus,
    identity: IdentityResolver,
    active_calls: ActiveCallTable,
    warmup: Arc<WarmupGate>,
    dedup: UnitEventDedup,
    affiliation: AffiliationMap,
    metrics: Arc<Metrics>,
    config: Arc<Config>,
    raw_writer: BatchWriterHandle<RawMessage>,
    recorder_writer: BatchWriterHandle<RecorderSnapshot>,
    trunking_writer: BatchWriterHandle<TrunkingMessageRow>,
    audio_store: Option<Arc<dyn AudioStore>>,
    transcription_queue: Option<Arc<dyn TranscriptionQueue>>,
    clock: C,
}

/// Everything the dispatcher needs that the caller doesn't build itself.
pub struct DispatcherDeps<C: Clock> {
    pub store: Arc<dyn Store>,
    pub bus: EventBus,
    pub warmup: Arc<WarmupGate>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
    pub raw_writer: BatchWriterHandle<RawMessage>,
    pub recorder_writer: BatchWriterHandle<RecorderSnapshot>,
    pub trunking_writer: BatchWriterHandle<TrunkingMessageRow>,
    pub audio_store: Option<Arc<dyn AudioStore>>,
    pub transcription_queue: Option<Arc<dyn TranscriptionQueue>>,
    pub clock: C,
}

impl<C: Clock + 'static> Dispatcher<C> {
    pub fn new(deps: DispatcherDeps<C>) -> Self {
        Self {
            identity: IdentityResolver::new(Arc::clone(&deps.store)),
            active_calls: ActiveCallTable::new(),
            dedup: UnitEventDedup::new(deps.config.dedup_window_ms),
            affiliation: AffiliationMap::new(deps.config.affiliation_ttl_ms),
            store: deps.store,
            bus: deps.bus,
            warmup: deps.warmup,
            metrics: deps.metrics,
            config: deps.config,
            raw_writer: deps.raw_writer,
            recorder_writer: deps.recorder_writer,
            trunking_writer: deps.trunking_writer,
            audio_store: deps.audio_store,
            transcription_queue: deps.transcription_queue,
            clock: deps.clock,
        }
    }

    /// Prime the identity cache and Warmup Gate from whatever the store
    /// already holds. Call once at startup before accepting messages.
    pub async fn warm_up(&self) -> Result<(), relay_storage::StoreError> {
        let had_rows = self.identity.load_cache().await?;
        self.warmup.start(had_rows);
        Ok(())
    }

    pub fn active_call_count(&self) -> usize {
        self.active_calls.len()
    }

    pub fn stale_recording_ms(&self) -> u64 {
        self.config.stale_recording_ms
    }

    /// Expire active calls the store's own stale-recording sweep has
    /// already reconciled, keeping the in-memory table from drifting ahead
    /// of the persisted `EXPIRED` rows the Maintenance Scheduler produces.
    pub fn expire_stale_active_calls(&self, max_age_ms: u64, now_ms: u64) -> usize {
        let expired = self.active_calls.expire_older_than(max_age_ms, now_ms);
        for _ in &expired {
            Metrics::incr(&self.metrics.active_call_expirations);
        }
        expired.len()
    }

    pub fn sweep_dedup(&self, now_ms: u64) -> usize {
        self.dedup.sweep(now_ms)
    }

    pub fn evict_affiliations(&self, now_ms: u64) -> usize {
        self.affiliation.evict_expired(now_ms)
    }

    /// Run the partition-maintenance task (create-ahead partitions,
    /// decimation, retention purges, stale-recording expiry, empty-group
    /// cleanup), in the store-defined order.
    pub async fn run_partition_maintenance(
        &self,
        now_ms: u64,
    ) -> Result<relay_storage::MaintenanceReport, relay_storage::StoreError> {
        relay_storage::run_maintenance(
            self.store.as_ref(),
            now_ms,
            self.config.raw_retention_ms,
            self.config.stale_recording_ms,
        )
        .await
    }

    pub async fn refresh_talkgroup_stats(&self) -> Result<usize, relay_storage::StoreError> {
        self.store.refresh_talkgroup_stats().await
    }

    fn is_archival_eligible(&self, tag: &str) -> bool {
        if !self.config.raw_store_enabled {
            return false;
        }
        if !self.config.raw_include_topics.is_empty() {
            return self.config.raw_include_topics.iter().any(|t| t == tag);
        }
        !self.config.raw_exclude_topics.iter().any(|t| t == tag)
    }

    /// Strip base64 audio fields from the `audio` tag before archival; the
    /// blob itself is persisted separately by the typed handler.
    fn sanitize_for_archival(&self, tag: &str, payload: &serde_json::Value) -> serde_json::Value {
        if tag != "audio" {
            return payload.clone();
        }
        let mut sanitized = payload.clone();
        if let Some(obj) = sanitized.as_object_mut() {
            obj.remove("data_base64");
            obj.remove("audio");
        }
        sanitized
    }

    fn archive_raw(&self, tag: &str, raw: &RawMessage) {
        if !self.is_archival_eligible(tag) {
            return;
        }
        let mut row = raw.clone();
        row.payload = self.sanitize_for_archival(tag, &raw.payload);
        if self.raw_writer.add(row).is_err() {
            Metrics::incr(&self.metrics.messages_dropped_queue_full);
            debug!(tag, "raw archival queue full, message not archived");
        }
    }

    /// Entry point for an inbound producer: `OnMessage(topic, payload,
    /// receive_time)`. Implements the dispatcher's seven-step contract.
    pub async fn on_message(self: &Arc<Self>, topic: &str, payload: serde_json::Value, receive_time_ms: u64) {
        // 1. Increment global message counter.
        Metrics::incr(&self.metrics.messages_received);

        // 2. Route the topic. Unknown -> drop.
        let route = router::route(topic);
        if route.topic == Topic::Unknown {
            Metrics::incr(&self.metrics.messages_dropped_unknown_topic);
            debug!(topic, "unknown topic, dropping");
            return;
        }
        let tag = router::handler_tag(route.topic);

        // 3. Parse a thin envelope for instance_id (tolerant of absence).
        let instance_id = extract_instance_id(&payload).map(relay_core::domain::InstanceId::from);

        let raw = RawMessage {
            topic_raw: topic.to_string(),
            topic: route.topic,
            instance_id: instance_id.clone(),
            received_at_ms: receive_time_ms,
            payload,
        };

        // 4. Best-effort raw archival.
        self.archive_raw(tag, &raw);

        // 5. Update Instance last-seen/status.
        if let Some(id) = &instance_id {
            if let Err(err) = self.store.upsert_instance(id, receive_time_ms).await {
                warn!(error = %err, "failed to update instance last-seen");
            }
        }

        // 6. Warmup Gate check: may buffer and return.
        let Some(batch) = self.warmup.admit(raw) else { return };

        // 7. Dispatch each message (the one just admitted, plus anything
        // the gate opening drained) to its typed handler, each isolated in
        // its own task so a handler panic can't take the dispatcher down.
        for msg in batch {
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move { this.dispatch_one(msg).await });
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    Metrics::incr(&self.metrics.messages_dropped_malformed);
                    tracing::error!("handler task panicked, message dropped");
                }
            }
        }
    }

    async fn dispatch_one(&self, msg: RawMessage) {
        // The buffered path only carries the classified Topic; recover the
        // full route (system name, unit-event kind) from the original
        // topic string so buffered and fast-path messages share one code
        // path.
        let route = router::route(&msg.topic_raw);
        let cx = HandlerCx {
            store: self.store.as_ref(),
            bus: &self.bus,
            identity: &self.identity,
            active_calls: &self.active_calls,
            dedup: &self.dedup,
            affiliation: &self.affiliation,
            metrics: &self.metrics,
            config: &self.config,
            recorder_writer: &self.recorder_writer,
            trunking_writer: &self.trunking_writer,
            audio_store: self.audio_store.as_ref(),
            transcription_queue: self.transcription_queue.as_ref(),
            clock: &self.clock,
            instance_id: msg.instance_id.clone(),
            received_at_ms: msg.received_at_ms,
        };

        let result = self.invoke_handler(&cx, &route, &msg.payload).await;
        if let Err(err) = result {
            self.record_handler_error(&route, err);
        }
    }

    async fn invoke_handler(
        &self,
        cx: &HandlerCx<'_, C>,
        route: &Route,
        payload: &serde_json::Value,
    ) -> Result<(), IngestError> {
        match route.topic {
            Topic::Systems => handlers::handle_systems(cx, payload).await,
            Topic::CallStart => handlers::handle_call_start(cx, payload).await,
            Topic::CallEnd => handlers::handle_call_end(cx, payload).await,
            Topic::Recorders => handlers::handle_recorders(cx, payload).await,
            Topic::UnitEvent => handlers::handle_unit_event(cx, route, payload).await,
            Topic::TrunkingMessage => handlers::handle_trunking_message(cx, route, payload).await,
            Topic::ConsoleRates => handlers::handle_rates(cx, payload).await,
            Topic::ConsoleLog | Topic::ConsoleStatus | Topic::ConsoleConfig => {
                handlers::handle_passive_telemetry(cx, payload).await
            }
            Topic::Audio => handlers::handle_audio(cx, payload).await,
            Topic::Unknown => Ok(()),
        }
    }

    fn record_handler_error(&self, route: &Route, err: IngestError) {
        match err {
            IngestError::MalformedMessage { topic, reason } => {
                Metrics::incr(&self.metrics.messages_dropped_malformed);
                debug!(topic, reason, "malformed message, dropped");
            }
            IngestError::TransientStore(reason) => {
                warn!(tag = router::handler_tag(route.topic), reason, "store error, message dropped");
            }
            other => {
                warn!(tag = router::handler_tag(route.topic), error = %other, "handler error, message dropped");
            }
        }
    }

    /// Drain the Warmup Gate's hard deadline, dispatching whatever it
    /// forces open. Spawn this once at startup alongside [`Self::warm_up`].
    pub async fn run_warmup_deadline(self: &Arc<Self>, timeout_ms: u64) {
        let drained = self.warmup.run_deadline(self.clock.clone(), std::time::Duration::from_millis(timeout_ms)).await;
        for msg in drained {
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move { this.dispatch_one(msg).await });
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    Metrics::incr(&self.metrics.messages_dropped_malformed);
                    tracing::error!("handler task panicked, message dropped");
                }
            }
        }
    }

    /// Flush and stop every batch writer. Call during the shutdown sequence.
    pub async fn shutdown(self) {
        self.raw_writer.stop().await;
        self.recorder_writer.stop().await;
        self.trunking_writer.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::FakeClock;
    use relay_storage::batch::BatchWriterHandle;
    use relay_storage::{spawn_batch_writer, BatchWriterConfig, MemStore, RecorderSnapshot, TrunkingMessageRow};
    use serde_json::json;
    use std::time::Duration;

    fn raw_writer_for(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> BatchWriterHandle<RawMessage> {
        let flush: relay_storage::batch::FlushFn<RawMessage> = Arc::new(move |rows| {
            let store = Arc::clone(&store);
            Box::pin(async move { store.insert_raw_messages(rows).await.map_err(|e| e.to_string()) })
        });
        spawn_batch_writer(BatchWriterConfig::new("raw", 100, Duration::from_secs(2)), metrics, flush)
    }

    fn recorder_writer_for(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> BatchWriterHandle<RecorderSnapshot> {
        let flush: relay_storage::batch::FlushFn<RecorderSnapshot> = Arc::new(move |rows| {
            let store = Arc::clone(&store);
            Box::pin(async move { store.insert_recorder_snapshots(rows).await.map_err(|e| e.to_string()) })
        });
        spawn_batch_writer(BatchWriterConfig::new("recorders", 100, Duration::from_secs(2)), metrics, flush)
    }

    fn trunking_writer_for(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> BatchWriterHandle<TrunkingMessageRow> {
        let flush: relay_storage::batch::FlushFn<TrunkingMessageRow> = Arc::new(move |rows| {
            let store = Arc::clone(&store);
            Box::pin(async move { store.insert_trunking_messages(rows).await.map_err(|e| e.to_string()) })
        });
        spawn_batch_writer(BatchWriterConfig::new("trunking", 100, Duration::from_secs(2)), metrics, flush)
    }

    fn dispatcher() -> Arc<Dispatcher<FakeClock>> {
        let metrics = Arc::new(Metrics::default());
        let store: Arc<dyn Store> = Arc::new(MemStore::in_memory());
        let config = Arc::new(Config { raw_store_enabled: true, ..Config::default() });

        let raw_writer = raw_writer_for(Arc::clone(&store), Arc::clone(&metrics));
        let recorder_writer = recorder_writer_for(Arc::clone(&store), Arc::clone(&metrics));
        let trunking_writer = trunking_writer_for(Arc::clone(&store), Arc::clone(&metrics));

        Arc::new(Dispatcher::new(DispatcherDeps {
            store,
            bus: EventBus::new(config.event_ring_capacity, Arc::clone(&metrics)),
            warmup: Arc::new(WarmupGate::new(10_000)),
            metrics,
            config,
            raw_writer,
            recorder_writer,
            trunking_writer,
            audio_store: None,
            transcription_queue: None,
            clock: FakeClock::new(),
        }))
    }

    #[tokio::test]
    async fn unknown_topic_increments_counter_and_drops() {
        let d = dispatcher();
        d.on_message("nothing/recognizable", json!({}), 0).await;
        assert_eq!(d.metrics.messages_dropped_unknown_topic(), 1);
    }

    #[tokio::test]
    async fn systems_then_call_start_then_call_end_round_trips() {
        let d = dispatcher();
        d.warm_up().await.unwrap();

        d.on_message(
            "rdio/site-a/systems",
            json!({ "instance_id": "site-a", "systems": [{ "sys_name": "metro" }] }),
            1_000,
        )
        .await;

        d.on_message(
            "rdio/site-a/call_start",
            json!({
                "instance_id": "site-a",
                "sys_name": "metro",
                "call_id": "c1",
                "talkgroup": 100,
                "start_time": 1_000,
            }),
            1_000,
        )
        .await;
        assert_eq!(d.active_call_count(), 1);

        d.on_message(
            "rdio/site-a/call_end",
            json!({
                "instance_id": "site-a",
                "sys_name": "metro",
                "call_id": "c1",
                "talkgroup": 100,
                "start_time": 1_000,
                "end_time": 1_010,
            }),
            1_010,
        )
        .await;
        assert_eq!(d.active_call_count(), 0);
    }

    #[tokio::test]
    async fn unit_event_topic_is_routed_and_deduped() {
        let d = dispatcher();
        d.warm_up().await.unwrap();
        d.on_message(
            "rdio/site-a/systems",
            json!({ "instance_id": "site-a", "systems": [{ "sys_name": "metro" }] }),
            0,
        )
        .await;

        let payload = json!({ "instance_id": "site-a", "unit": 42, "talkgroup": 100 });
        d.on_message("rdio/metro/join", payload.clone(), 1_000).await;
        d.on_message("rdio/metro/join", payload, 1_001).await;

        assert_eq!(d.metrics.messages_dropped_malformed(), 0);
    }
}
