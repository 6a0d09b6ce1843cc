// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed per-topic handlers. Each takes a [`HandlerCx`] bundling the
//! collaborators it needs and the already-parsed thin envelope fields; the
//! dispatcher owns routing, raw archival, and panic containment around
//! these calls.

pub mod payload;

use crate::active_calls::ActiveCallTable;
use crate::affiliation::AffiliationMap;
use crate::dedup::{UnitEventDedup, DEDUP_BUCKET_WIDTH_MS};
use crate::identity::IdentityResolver;
use crate::router::Route;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use payload::{
    AudioTopicPayload, CallEndPayload, CallStartPayload, RecordersPayload, SystemsPayload, UnitEventPayload,
};
use relay_core::clock::Clock;
use relay_core::config::Config;
use relay_core::domain::{
    ActiveCallEntry, AffiliationKey, CallSourceEntry, InstanceId, Source, SystemKind, Tgid, UnitEventKind, UnitNum,
};
use relay_core::error::IngestError;
use relay_core::event::{BusEvent, EventKind};
use relay_core::metrics::Metrics;
use relay_core::ports::{AudioStore, TranscriptionQueue};
use relay_core::transcription::{derive_transmissions, TranscriptionJob};
use relay_bus::EventBus;
use relay_storage::{CallEndParams, CallStartParams, RecorderSnapshot, Store, TrunkingMessageRow, UnitEventRow};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Bucket width for the `(system, tgid, start_time)` call-group key. Wide
/// enough to absorb the same fuzzy drift the Active Call Table tolerates.
const CALL_GROUP_BUCKET_WIDTH_MS: u64 = 5_000;

fn malformed(topic: &str, reason: impl ToString) -> IngestError {
    IngestError::MalformedMessage { topic: topic.to_string(), reason: reason.to_string() }
}

fn parse<T: serde::de::DeserializeOwned>(topic: &str, payload: &Value) -> Result<T, IngestError> {
    serde_json::from_value(payload.clone()).map_err(|e| malformed(topic, e))
}

fn require_instance(topic: &str, instance_id: &Option<InstanceId>) -> Result<InstanceId, IngestError> {
    instance_id.clone().ok_or_else(|| malformed(topic, "missing instance_id"))
}

fn system_kind(sysid: Option<u32>, wacn: Option<u32>) -> SystemKind {
    if sysid.is_some() || wacn.is_some() {
        SystemKind::P25Trunked { sysid, wacn }
    } else {
        SystemKind::Conventional
    }
}

fn map_store_err(err: relay_storage::StoreError) -> IngestError {
    IngestError::TransientStore(err.to_string())
}

/// Collaborators a handler needs, borrowed for the duration of one dispatch.
pub struct HandlerCx<'a, C: Clock> {
    pub store: &'a dyn Store,
    pub bus: &'a EventBus,
    pub identity: &'a IdentityResolver,
    pub active_calls: &'a ActiveCallTable,
    pub dedup: &'a UnitEventDedup,
    pub affiliation: &'a AffiliationMap,
    pub metrics: &'a Metrics,
    pub config: &'a Config,
    pub recorder_writer: &'a relay_storage::BatchWriterHandle<RecorderSnapshot>,
    pub trunking_writer: &'a relay_storage::BatchWriterHandle<TrunkingMessageRow>,
    pub audio_store: Option<&'a Arc<dyn AudioStore>>,
    pub transcription_queue: Option<&'a Arc<dyn TranscriptionQueue>>,
    pub clock: &'a C,
    pub instance_id: Option<InstanceId>,
    pub received_at_ms: u64,
}

impl<'a, C: Clock> HandlerCx<'a, C> {
    fn publish(&self, event: BusEvent) {
        self.bus.publish(self.clock.epoch_ms(), event);
    }
}

pub async fn handle_systems<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    let instance_id = require_instance("systems", &cx.instance_id)?;
    let body: SystemsPayload = parse("systems", payload)?;

    for entry in body.systems {
        let kind = system_kind(entry.sysid, entry.wacn);
        let (system_id, site_id) = cx.identity.resolve(&instance_id, &entry.sys_name, kind).await.map_err(map_store_err)?;
        cx.publish(BusEvent {
            seq: String::new(),
            kind: EventKind::SystemUpdate,
            subtype: None,
            system_id: Some(system_id),
            site_id: Some(site_id),
            tgid: None,
            unit_id: None,
            call_id: None,
            emergency: false,
            payload: serde_json::json!({ "sys_name": entry.sys_name }),
        });
    }
    Ok(())
}

pub async fn handle_call_start<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    let instance_id = require_instance("call_start", &cx.instance_id)?;
    let body: CallStartPayload = parse("call_start", payload)?;
    let kind = system_kind(body.sysid, body.wacn);
    let (system_id, site_id) = cx.identity.resolve(&instance_id, &body.sys_name, kind).await.map_err(map_store_err)?;
    let tgid = Tgid(body.talkgroup);

    let call_id = cx
        .store
        .call_start(CallStartParams {
            instance_id: instance_id.clone(),
            external_id: body.call_id.clone(),
            system_id,
            site_id,
            tgid,
            start_time_ms: body.start_time,
            freq: body.freq,
        })
        .await
        .map_err(map_store_err)?;

    cx.active_calls.set(
        instance_id,
        body.call_id.clone(),
        ActiveCallEntry {
            call_id,
            external_id: body.call_id,
            system_id,
            tgid,
            start_time_ms: body.start_time,
            source: Source::Recorder,
            freq: body.freq,
            inserted_at_ms: cx.received_at_ms,
        },
    );

    cx.publish(BusEvent {
        seq: String::new(),
        kind: EventKind::CallStart,
        subtype: None,
        system_id: Some(system_id),
        site_id: Some(site_id),
        tgid: Some(tgid),
        unit_id: None,
        call_id: Some(call_id),
        emergency: false,
        payload: serde_json::json!({ "start_time": body.start_time }),
    });
    Ok(())
}

fn ordered_sources(mut sources: Vec<payload::CallSourcePayload>) -> Vec<CallSourceEntry> {
    let ordered = sources.windows(2).all(|w| w[0].pos <= w[1].pos);
    if !ordered {
        sources.sort_by(|a, b| a.pos.partial_cmp(&b.pos).unwrap_or(std::cmp::Ordering::Equal));
    }
    sources
        .into_iter()
        .map(|s| CallSourceEntry { unit: s.unit, pos_sec: s.pos, tag: s.tag, emergency: s.emergency })
        .collect()
}

async fn persist_call_end_audio<C: Clock>(
    cx: &HandlerCx<'_, C>,
    call_id: relay_core::domain::CallId,
    audio: Option<payload::AudioPayload>,
) -> Option<String> {
    let audio = audio?;
    let bytes = match BASE64.decode(audio.data_base64) {
        Ok(b) => b,
        Err(err) => {
            warn!(error = %err, "call_end audio field was not valid base64, treating as no audio");
            return None;
        }
    };
    if bytes.is_empty() {
        return None;
    }
    let Some(store) = cx.audio_store else { return None };
    let key = format!("calls/{call_id}");
    match store.save(&key, bytes, audio.content_type.as_deref()).await {
        Ok(()) => {
            Metrics::incr(&cx.metrics.audio_uploads);
            Some(key)
        }
        Err(err) => {
            Metrics::incr(&cx.metrics.audio_upload_failures);
            warn!(error = %err, "audio save failed for completed call");
            None
        }
    }
}

pub async fn handle_call_end<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    let instance_id = require_instance("call_end", &cx.instance_id)?;
    let body: CallEndPayload = parse("call_end", payload)?;
    let kind = system_kind(body.sysid, body.wacn);
    let (system_id, site_id) = cx.identity.resolve(&instance_id, &body.sys_name, kind).await.map_err(map_store_err)?;
    let tgid = Tgid(body.talkgroup);

    let active = cx
        .active_calls
        .get(&instance_id, &body.call_id)
        .or_else(|| cx.active_calls.find_by_tgid_and_time(system_id, tgid, body.start_time));

    // No matching `call_start` was ever seen for this call (e.g. the
    // pipeline restarted mid-call): create the row directly rather than
    // drop a `call_end` we have no other record of.
    let call_id = match &active {
        Some(entry) => entry.call_id,
        None => cx
            .store
            .call_start(CallStartParams {
                instance_id: instance_id.clone(),
                external_id: body.call_id.clone(),
                system_id,
                site_id,
                tgid,
                start_time_ms: body.start_time,
                freq: body.freqs.first().copied(),
            })
            .await
            .map_err(map_store_err)?,
    };

    let duration_ms = body.duration.unwrap_or_else(|| body.end_time.saturating_sub(body.start_time));
    let sources = ordered_sources(body.sources);
    let audio_path = persist_call_end_audio(cx, call_id, body.audio).await;

    cx.store
        .call_end(CallEndParams {
            call_id,
            end_time_ms: body.end_time,
            duration_ms: Some(duration_ms),
            freqs: body.freqs,
            audio_path: audio_path.clone(),
            sources: sources.clone(),
        })
        .await
        .map_err(map_store_err)?;

    // A fuzzy match came from a `call_start` with its own external ID,
    // distinct from this `call_end` payload's — delete by the entry's own
    // key, not the payload's, or a fuzzy-matched active entry never clears.
    let delete_key = active.as_ref().map(|e| e.external_id.as_str()).unwrap_or(&body.call_id);
    cx.active_calls.delete(&instance_id, delete_key);

    let bucket = body.start_time - (body.start_time % CALL_GROUP_BUCKET_WIDTH_MS);
    cx.store.assign_call_group(system_id, tgid, bucket, call_id).await.map_err(map_store_err)?;

    if let (Some(queue), Some(audio_key)) = (cx.transcription_queue, &audio_path) {
        let duration_sec = duration_ms as f64 / 1000.0;
        if duration_sec >= cx.config.transcribe_min_seconds && duration_sec <= cx.config.transcribe_max_seconds {
            let transmissions = derive_transmissions(&sources, duration_sec);
            let job = TranscriptionJob { call_id, audio_key: audio_key.clone(), transmissions };
            if !queue.enqueue(job) {
                Metrics::incr(&cx.metrics.messages_dropped_queue_full);
                warn!(%call_id, "transcription queue full, call will not be transcribed");
            }
        }
    }

    cx.publish(BusEvent {
        seq: String::new(),
        kind: EventKind::CallEnd,
        subtype: None,
        system_id: Some(system_id),
        site_id: Some(site_id),
        tgid: Some(tgid),
        unit_id: None,
        call_id: Some(call_id),
        emergency: false,
        payload: serde_json::json!({ "duration_ms": duration_ms }),
    });
    Ok(())
}

pub async fn handle_recorders<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    let instance_id = require_instance("recorders", &cx.instance_id)?;
    let body: RecordersPayload = parse("recorders", payload)?;

    let mut last_system_id = None;
    for entry in &body.recorders {
        let system_id = match &entry.sys_name {
            Some(name) => {
                let kind = system_kind(entry.sysid, entry.wacn);
                let (id, _site) = cx.identity.resolve(&instance_id, name, kind).await.map_err(map_store_err)?;
                Some(id)
            }
            None => None,
        };
        last_system_id = system_id.or(last_system_id);

        if cx
            .recorder_writer
            .add(RecorderSnapshot {
                instance_id: instance_id.clone(),
                system_id,
                recorder_num: entry.recorder_num,
                rec_type: entry.rec_type.clone(),
                freq: entry.freq,
                squelched: entry.squelched,
                recording: entry.recording,
                time_ms: cx.received_at_ms,
            })
            .is_err()
        {
            Metrics::incr(&cx.metrics.messages_dropped_queue_full);
        }
    }

    cx.publish(BusEvent {
        seq: String::new(),
        kind: EventKind::RecorderUpdate,
        subtype: None,
        system_id: last_system_id,
        site_id: None,
        tgid: None,
        unit_id: None,
        call_id: None,
        emergency: false,
        payload: serde_json::json!({ "count": body.recorders.len() }),
    });
    Ok(())
}

pub async fn handle_unit_event<C: Clock>(
    cx: &HandlerCx<'_, C>,
    route: &Route,
    payload: &Value,
) -> Result<(), IngestError> {
    let instance_id = require_instance("unit_event", &cx.instance_id)?;
    let sys_name = route.system_name.clone().ok_or_else(|| malformed("unit_event", "router did not extract sys_name"))?;
    let event_kind = route.unit_event_kind.ok_or_else(|| malformed("unit_event", "router did not extract event kind"))?;
    let body: UnitEventPayload = parse("unit_event", payload)?;

    let kind = system_kind(body.sysid, body.wacn);
    let (system_id, site_id) = cx.identity.resolve(&instance_id, &sys_name, kind).await.map_err(map_store_err)?;
    let tgid = body.talkgroup.map(Tgid);
    let time_ms = body.time.unwrap_or(cx.received_at_ms);
    let unit = UnitNum(body.unit);

    let dedup_key =
        relay_core::domain::UnitEventDedupKey::new(system_id, unit, event_kind, tgid, time_ms, DEDUP_BUCKET_WIDTH_MS);
    if !cx.dedup.observe(dedup_key, cx.received_at_ms) {
        return Ok(());
    }

    cx.store
        .insert_unit_event(UnitEventRow { system_id, unit, kind: event_kind, tgid, time_ms })
        .await
        .map_err(map_store_err)?;

    if matches!(event_kind, UnitEventKind::Join | UnitEventKind::Call) {
        if let Some(tgid) = tgid {
            cx.affiliation.update(AffiliationKey { system_id, unit }, tgid, cx.received_at_ms);
        }
    }

    cx.publish(BusEvent {
        seq: String::new(),
        kind: EventKind::UnitEvent,
        subtype: Some(event_kind),
        system_id: Some(system_id),
        site_id: Some(site_id),
        tgid,
        unit_id: None,
        call_id: None,
        emergency: false,
        payload: serde_json::json!({ "unit": body.unit }),
    });
    Ok(())
}

pub async fn handle_trunking_message<C: Clock>(
    cx: &HandlerCx<'_, C>,
    route: &Route,
    payload: &Value,
) -> Result<(), IngestError> {
    let instance_id = require_instance("trunking_message", &cx.instance_id)?;
    let sys_name = route
        .system_name
        .clone()
        .ok_or_else(|| malformed("trunking_message", "router did not extract sys_name"))?;
    let (system_id, _site_id) =
        cx.identity.resolve(&instance_id, &sys_name, SystemKind::Conventional).await.map_err(map_store_err)?;

    if cx
        .trunking_writer
        .add(TrunkingMessageRow { system_id, time_ms: cx.received_at_ms, payload: payload.clone() })
        .is_err()
    {
        Metrics::incr(&cx.metrics.messages_dropped_queue_full);
    }
    Ok(())
}

pub async fn handle_rates<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    cx.publish(BusEvent {
        seq: String::new(),
        kind: EventKind::RateUpdate,
        subtype: None,
        system_id: None,
        site_id: None,
        tgid: None,
        unit_id: None,
        call_id: None,
        emergency: false,
        payload: payload.clone(),
    });
    Ok(())
}

/// `console`, `status`, and `config` telemetry carry no active-call
/// interaction and no dedicated store sink beyond raw archival, which the
/// dispatcher already performs before routing here.
pub async fn handle_passive_telemetry<C: Clock>(_cx: &HandlerCx<'_, C>, _payload: &Value) -> Result<(), IngestError> {
    Ok(())
}

pub async fn handle_audio<C: Clock>(cx: &HandlerCx<'_, C>, payload: &Value) -> Result<(), IngestError> {
    let Some(store) = cx.audio_store else { return Ok(()) };
    let body: AudioTopicPayload = parse("audio", payload)?;
    let bytes = BASE64.decode(&body.data_base64).map_err(|e| malformed("audio", e))?;
    if bytes.is_empty() {
        return Ok(());
    }
    let key = format!("calls/{}", body.call_id);
    match store.save(&key, bytes, body.content_type.as_deref()).await {
        Ok(()) => Metrics::incr(&cx.metrics.audio_uploads),
        Err(err) => {
            Metrics::incr(&cx.metrics.audio_upload_failures);
            warn!(error = %err, call_id = %body.call_id, "standalone audio save failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_sources_sorts_when_out_of_order() {
        let input = vec![
            payload::CallSourcePayload { unit: 2, pos: 5.0, tag: None, emergency: false },
            payload::CallSourcePayload { unit: 1, pos: 0.0, tag: None, emergency: false },
        ];
        let out = ordered_sources(input);
        assert_eq!(out[0].unit, 1);
        assert_eq!(out[1].unit, 2);
    }

    #[test]
    fn ordered_sources_leaves_already_ordered_list_untouched() {
        let input = vec![
            payload::CallSourcePayload { unit: 1, pos: 0.0, tag: None, emergency: false },
            payload::CallSourcePayload { unit: 2, pos: 5.0, tag: None, emergency: false },
        ];
        let out = ordered_sources(input);
        assert_eq!(out[0].unit, 1);
        assert_eq!(out[1].unit, 2);
    }
}
