// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process reference [`Store`] implementation: a write-ahead log of
//! [`StoreEvent`]s plus a [`MaterializedState`] built by replaying them.
//! Durable across restarts when constructed with a WAL path; purely
//! in-memory otherwise. Suitable for tests and small single-node
//! deployments — a production deployment backed by a relational database
//! is an external concern.

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::domain::{
    Call, CallId, CallStatus, InstanceId, RawMessage, Site, SiteId, Source, System, SystemId,
    SystemKind, Talkgroup, TalkgroupId, Tgid, Unit, UnitEventKind, UnitId, UnitNum,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex as StdMutex;

use crate::error::StoreError;
use crate::recorder::RecorderSnapshot;
use crate::store::{
    CallEndParams, CallStartParams, IdentityCacheRow, MaintenanceReport, Store,
    TrunkingMessageRow, UnitEventRow,
};
use crate::wal::Wal;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoreEvent {
    UpsertInstance { id: InstanceId, now_ms: u64 },
    UpsertSystem { instance_id: InstanceId, short_name: String, kind: SystemKind, id: SystemId },
    UpsertSite { system_id: SystemId, instance_id: InstanceId, short_name: String, id: SiteId },
    UpsertTalkgroup { system_id: SystemId, tgid: Tgid, alpha_tag: Option<String>, description: Option<String> },
    UpsertUnit { system_id: SystemId, unit: UnitNum, alpha_tag: Option<String> },
    CallStart { params: CallStartParamsOwned, id: CallId },
    CallEnd { params: CallEndParamsOwned },
    InsertUnitEvent { row: UnitEventRowOwned },
    ExpireStaleCalls { older_than_ms: u64, now_ms: u64 },
    AssignCallGroup { system_id: SystemId, tgid: Tgid, start_time_bucket_ms: u64, call_id: CallId },
    InsertTranscript { transcript: relay_core::transcription::Transcript },
}

// CallStartParams/CallEndParams/UnitEventRow don't derive Serialize; owned
// mirrors keep the WAL wire format independent of the Store trait's API
// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CallStartParamsOwned {
    instance_id: InstanceId,
    external_id: String,
    system_id: SystemId,
    site_id: SiteId,
    tgid: Tgid,
    start_time_ms: u64,
    freq: Option<u64>,
}

fn freq_to_freqs(freq: Option<u64>) -> Vec<u64> {
    freq.into_iter().collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CallEndParamsOwned {
    call_id: CallId,
    end_time_ms: u64,
    duration_ms: Option<u64>,
    freqs: Vec<u64>,
    audio_path: Option<String>,
    sources: Vec<relay_core::domain::CallSourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnitEventRowOwned {
    system_id: SystemId,
    unit: UnitNum,
    kind: UnitEventKind,
    tgid: Option<Tgid>,
    time_ms: u64,
}

#[derive(Default)]
struct MaterializedState {
    instances: HashMap<InstanceId, u64>,
    systems: HashMap<SystemId, System>,
    system_by_p25: HashMap<(u32, u32), SystemId>,
    system_by_name: HashMap<(InstanceId, String), SystemId>,
    sites: HashMap<SiteId, Site>,
    site_by_key: HashMap<(SystemId, InstanceId, String), SiteId>,
    talkgroups: HashMap<(SystemId, Tgid), Talkgroup>,
    units: HashMap<(SystemId, UnitNum), Unit>,
    calls: HashMap<CallId, Call>,
    call_by_external: HashMap<(InstanceId, String), CallId>,
    unit_events: Vec<UnitEventRowOwned>,
    recorder_snapshots: Vec<RecorderSnapshot>,
    trunking_messages: Vec<TrunkingMessageRow>,
    raw_messages: Vec<RawMessage>,
    call_groups: HashMap<(SystemId, Tgid, u64), Vec<CallId>>,
    /// Derived, recomputed by [`Store::refresh_talkgroup_stats`]; not part
    /// of the WAL since it's fully recoverable from `calls`.
    talkgroup_call_counts: HashMap<(SystemId, Tgid), (usize, u64)>,
    transcripts: HashMap<CallId, relay_core::transcription::Transcript>,
}

impl MaterializedState {
    fn apply(&mut self, event: &StoreEvent) {
        match event.clone() {
            StoreEvent::UpsertInstance { id, now_ms } => {
                self.instances.insert(id, now_ms);
            }
            StoreEvent::UpsertSystem { instance_id, short_name, kind, id } => {
                if let Some((sysid, wacn)) = kind.p25_identity() {
                    self.system_by_p25.insert((sysid, wacn), id);
                }
                self.system_by_name.insert((instance_id, short_name.clone()), id);
                self.systems.entry(id).or_insert(System { id, short_name, kind });
            }
            StoreEvent::UpsertSite { system_id, instance_id, short_name, id } => {
                self.site_by_key.insert((system_id, instance_id.clone(), short_name.clone()), id);
                self.sites.entry(id).or_insert(Site { id, system_id, instance_id, short_name });
            }
            StoreEvent::UpsertTalkgroup { system_id, tgid, alpha_tag, description } => {
                let key = (system_id, tgid);
                let next_id = TalkgroupId((self.talkgroups.len() as i64) + 1);
                let entry = self.talkgroups.entry(key).or_insert(Talkgroup {
                    id: next_id,
                    system_id,
                    tgid,
                    alpha_tag: None,
                    description: None,
                });
                if alpha_tag.is_some() {
                    entry.alpha_tag = alpha_tag;
                }
                if description.is_some() {
                    entry.description = description;
                }
            }
            StoreEvent::UpsertUnit { system_id, unit, alpha_tag } => {
                let key = (system_id, unit);
                let next_id = UnitId((self.units.len() as i64) + 1);
                let entry = self.units.entry(key).or_insert(Unit { id: next_id, system_id, unit, alpha_tag: None });
                if alpha_tag.is_some() {
                    entry.alpha_tag = alpha_tag;
                }
            }
            StoreEvent::CallStart { params, id } => {
                let key = (params.instance_id.clone(), params.external_id.clone());
                if let Some(existing_id) = self.call_by_external.get(&key).copied() {
                    if let Some(call) = self.calls.get_mut(&existing_id) {
                        call.start_time_ms = params.start_time_ms;
                        call.freqs = freq_to_freqs(params.freq);
                        call.status = CallStatus::Recording;
                    }
                    return;
                }
                self.call_by_external.insert(key, id);
                self.calls.insert(
                    id,
                    Call {
                        id,
                        external_id: params.external_id,
                        system_id: params.system_id,
                        site_id: params.site_id,
                        tgid: params.tgid,
                        start_time_ms: params.start_time_ms,
                        end_time_ms: None,
                        status: CallStatus::Recording,
                        source: Source::Recorder,
                        freqs: freq_to_freqs(params.freq),
                        audio_path: None,
                        sources: Vec::new(),
                    },
                );
            }
            StoreEvent::CallEnd { params } => {
                if let Some(call) = self.calls.get_mut(&params.call_id) {
                    call.end_time_ms = Some(params.end_time_ms);
                    call.status = CallStatus::Completed;
                    call.audio_path = params.audio_path;
                    call.sources = params.sources;
                    if !params.freqs.is_empty() {
                        call.freqs = params.freqs;
                    }
                }
            }
            StoreEvent::InsertUnitEvent { row } => {
                self.unit_events.push(row);
            }
            StoreEvent::ExpireStaleCalls { older_than_ms, now_ms } => {
                for call in self.calls.values_mut() {
                    if call.status == CallStatus::Recording
                        && now_ms.saturating_sub(call.start_time_ms) > older_than_ms
                    {
                        call.status = CallStatus::Expired;
                        call.end_time_ms.get_or_insert(call.start_time_ms);
                    }
                }
            }
            StoreEvent::AssignCallGroup { system_id, tgid, start_time_bucket_ms, call_id } => {
                let members = self.call_groups.entry((system_id, tgid, start_time_bucket_ms)).or_default();
                if !members.contains(&call_id) {
                    members.push(call_id);
                }
            }
            StoreEvent::InsertTranscript { transcript } => {
                self.transcripts.insert(transcript.call_id, transcript);
            }
        }
    }
}

/// In-process [`Store`]. Durable when opened with a WAL path (via
/// [`MemStore::open`]); call [`MemStore::in_memory`] for a throwaway store
/// with no backing file, e.g. in unit tests.
pub struct MemStore {
    state: RwLock<MaterializedState>,
    wal: Option<StdMutex<Wal<StoreEvent>>>,
    next_call_seq: AtomicI64,
}

impl MemStore {
    pub fn in_memory() -> Self {
        Self { state: RwLock::new(MaterializedState::default()), wal: None, next_call_seq: AtomicI64::new(0) }
    }

    /// Open (or create and replay) a WAL-backed store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut wal: Wal<StoreEvent> = Wal::open(path, 0)?;
        let mut state = MaterializedState::default();
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply(&entry.event);
            wal.mark_processed(entry.seq);
        }
        Ok(Self { state: RwLock::new(state), wal: Some(StdMutex::new(wal)), next_call_seq: AtomicI64::new(0) })
    }

    fn record(&self, event: StoreEvent) -> Result<(), StoreError> {
        if let Some(wal) = &self.wal {
            let mut wal = wal.lock().expect("wal mutex poisoned");
            let seq = wal.append(&event)?;
            if wal.needs_flush() {
                wal.flush()?;
            }
            wal.mark_processed(seq);
        }
        self.state.write().apply(&event);
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn load_identity_cache(&self) -> Result<Vec<IdentityCacheRow>, StoreError> {
        let state = self.state.read();
        Ok(state
            .system_by_name
            .iter()
            .filter_map(|((instance_id, name), system_id)| {
                state
                    .site_by_key
                    .iter()
                    .find(|((sid, iid, _), _)| sid == system_id && iid == instance_id)
                    .map(|(_, site_id)| IdentityCacheRow {
                        instance_id: instance_id.clone(),
                        system_name: name.clone(),
                        system_id: *system_id,
                        site_id: *site_id,
                    })
            })
            .collect())
    }

    async fn upsert_instance(&self, id: &InstanceId, now_ms: u64) -> Result<(), StoreError> {
        self.record(StoreEvent::UpsertInstance { id: id.clone(), now_ms })
    }

    async fn resolve_system(
        &self,
        instance_id: &InstanceId,
        short_name: &str,
        kind: SystemKind,
    ) -> Result<SystemId, StoreError> {
        {
            let state = self.state.read();
            if let Some((sysid, wacn)) = kind.p25_identity() {
                if let Some(id) = state.system_by_p25.get(&(sysid, wacn)) {
                    return Ok(*id);
                }
            }
            if let Some(id) = state.system_by_name.get(&(instance_id.clone(), short_name.to_string())) {
                return Ok(*id);
            }
        }
        let id = SystemId({
            let state = self.state.read();
            (state.systems.len() as i64) + 1
        });
        self.record(StoreEvent::UpsertSystem {
            instance_id: instance_id.clone(),
            short_name: short_name.to_string(),
            kind,
            id,
        })?;
        Ok(id)
    }

    async fn resolve_site(
        &self,
        system_id: SystemId,
        instance_id: &InstanceId,
        short_name: &str,
    ) -> Result<SiteId, StoreError> {
        let key = (system_id, instance_id.clone(), short_name.to_string());
        {
            let state = self.state.read();
            if let Some(id) = state.site_by_key.get(&key) {
                return Ok(*id);
            }
        }
        let id = SiteId({
            let state = self.state.read();
            (state.sites.len() as i64) + 1
        });
        self.record(StoreEvent::UpsertSite {
            system_id,
            instance_id: instance_id.clone(),
            short_name: short_name.to_string(),
            id,
        })?;
        Ok(id)
    }

    async fn upsert_talkgroup(
        &self,
        system_id: SystemId,
        tgid: Tgid,
        alpha_tag: Option<String>,
        description: Option<String>,
    ) -> Result<(), StoreError> {
        self.record(StoreEvent::UpsertTalkgroup { system_id, tgid, alpha_tag, description })
    }

    async fn upsert_unit(
        &self,
        system_id: SystemId,
        unit: UnitNum,
        alpha_tag: Option<String>,
    ) -> Result<(), StoreError> {
        self.record(StoreEvent::UpsertUnit { system_id, unit, alpha_tag })
    }

    async fn get_system(&self, id: SystemId) -> Result<Option<System>, StoreError> {
        Ok(self.state.read().systems.get(&id).cloned())
    }

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.state.read().sites.get(&id).cloned())
    }

    async fn get_talkgroup(&self, system_id: SystemId, tgid: Tgid) -> Result<Option<Talkgroup>, StoreError> {
        Ok(self.state.read().talkgroups.get(&(system_id, tgid)).cloned())
    }

    async fn get_unit(&self, system_id: SystemId, unit: UnitNum) -> Result<Option<Unit>, StoreError> {
        Ok(self.state.read().units.get(&(system_id, unit)).cloned())
    }

    async fn call_start(&self, params: CallStartParams) -> Result<CallId, StoreError> {
        let key = (params.instance_id.clone(), params.external_id.clone());
        if let Some(existing) = self.state.read().call_by_external.get(&key).copied() {
            self.record(StoreEvent::CallStart {
                params: CallStartParamsOwned {
                    instance_id: params.instance_id,
                    external_id: params.external_id,
                    system_id: params.system_id,
                    site_id: params.site_id,
                    tgid: params.tgid,
                    start_time_ms: params.start_time_ms,
                    freq: params.freq,
                },
                id: existing,
            })?;
            return Ok(existing);
        }
        self.next_call_seq.fetch_add(1, Ordering::Relaxed);
        let id = CallId::new();
        self.record(StoreEvent::CallStart {
            params: CallStartParamsOwned {
                instance_id: params.instance_id,
                external_id: params.external_id,
                system_id: params.system_id,
                site_id: params.site_id,
                tgid: params.tgid,
                start_time_ms: params.start_time_ms,
                freq: params.freq,
            },
            id,
        })?;
        Ok(id)
    }

    async fn call_end(&self, params: CallEndParams) -> Result<(), StoreError> {
        self.record(StoreEvent::CallEnd {
            params: CallEndParamsOwned {
                call_id: params.call_id,
                end_time_ms: params.end_time_ms,
                duration_ms: params.duration_ms,
                freqs: params.freqs,
                audio_path: params.audio_path,
                sources: params.sources,
            },
        })
    }

    async fn get_call(&self, id: CallId) -> Result<Option<Call>, StoreError> {
        Ok(self.state.read().calls.get(&id).cloned())
    }

    async fn assign_call_group(
        &self,
        system_id: SystemId,
        tgid: Tgid,
        start_time_bucket_ms: u64,
        call_id: CallId,
    ) -> Result<(), StoreError> {
        self.record(StoreEvent::AssignCallGroup { system_id, tgid, start_time_bucket_ms, call_id })
    }

    async fn expire_stale_recording_calls(&self, older_than_ms: u64, now_ms: u64) -> Result<usize, StoreError> {
        let count = self
            .state
            .read()
            .calls
            .values()
            .filter(|c| {
                c.status == CallStatus::Recording && now_ms.saturating_sub(c.start_time_ms) > older_than_ms
            })
            .count();
        if count > 0 {
            self.record(StoreEvent::ExpireStaleCalls { older_than_ms, now_ms })?;
        }
        Ok(count)
    }

    async fn insert_unit_event(&self, row: UnitEventRow) -> Result<(), StoreError> {
        self.record(StoreEvent::InsertUnitEvent {
            row: UnitEventRowOwned {
                system_id: row.system_id,
                unit: row.unit,
                kind: row.kind,
                tgid: row.tgid,
                time_ms: row.time_ms,
            },
        })
    }

    async fn insert_transcript(&self, transcript: relay_core::transcription::Transcript) -> Result<(), StoreError> {
        self.record(StoreEvent::InsertTranscript { transcript })
    }

    async fn get_transcript(&self, call_id: CallId) -> Result<Option<relay_core::transcription::Transcript>, StoreError> {
        Ok(self.state.read().transcripts.get(&call_id).cloned())
    }

    async fn insert_recorder_snapshots(&self, rows: Vec<RecorderSnapshot>) -> Result<(), StoreError> {
        self.state.write().recorder_snapshots.extend(rows);
        Ok(())
    }

    async fn insert_trunking_messages(&self, rows: Vec<TrunkingMessageRow>) -> Result<(), StoreError> {
        self.state.write().trunking_messages.extend(rows);
        Ok(())
    }

    async fn insert_raw_messages(&self, rows: Vec<RawMessage>) -> Result<(), StoreError> {
        self.state.write().raw_messages.extend(rows);
        Ok(())
    }

    async fn create_monthly_partitions(&self, _months_ahead: u32, _now_ms: u64) -> Result<usize, StoreError> {
        // Partitioning is a relational-store concept with no analog in the
        // in-memory reference store; report nothing created.
        Ok(0)
    }

    async fn create_weekly_partitions(&self, _weeks_ahead: u32, _now_ms: u64) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn decimate_snapshots(&self, now_ms: u64) -> Result<usize, StoreError> {
        const WEEK_MS: u64 = 7 * 24 * 3_600_000;
        let mut state = self.state.write();
        let before = state.recorder_snapshots.len();
        state.recorder_snapshots.retain(|s| now_ms.saturating_sub(s.time_ms) < WEEK_MS || s.time_ms % 60_000 == 0);
        Ok(before.saturating_sub(state.recorder_snapshots.len()))
    }

    async fn purge_expired_telemetry(&self, now_ms: u64) -> Result<usize, StoreError> {
        const THIRTY_DAYS_MS: u64 = 30 * 24 * 3_600_000;
        let mut state = self.state.write();
        let before = state.trunking_messages.len();
        state.trunking_messages.retain(|m| now_ms.saturating_sub(m.time_ms) < THIRTY_DAYS_MS);
        Ok(before.saturating_sub(state.trunking_messages.len()))
    }

    async fn drop_old_raw_partitions(&self, retention_ms: u64, now_ms: u64) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let before = state.raw_messages.len();
        state.raw_messages.retain(|m| now_ms.saturating_sub(m.received_at_ms) < retention_ms);
        Ok(before.saturating_sub(state.raw_messages.len()))
    }

    async fn delete_empty_call_groups(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let MaterializedState { calls, call_groups, .. } = &mut *state;
        for members in call_groups.values_mut() {
            members.retain(|id| calls.contains_key(id));
        }
        let before = call_groups.len();
        call_groups.retain(|_, members| !members.is_empty());
        Ok(before.saturating_sub(call_groups.len()))
    }

    async fn refresh_talkgroup_stats(&self) -> Result<usize, StoreError> {
        let mut counts: HashMap<(SystemId, Tgid), (usize, u64)> = HashMap::new();
        for call in self.state.read().calls.values() {
            let entry = counts.entry((call.system_id, call.tgid)).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.max(call.start_time_ms);
        }
        let touched = counts.len();
        self.state.write().talkgroup_call_counts = counts;
        Ok(touched)
    }
}

/// Run the full partition-maintenance task in a fixed order, returning a
/// summary for logging.
pub async fn run_maintenance(
    store: &dyn Store,
    now_ms: u64,
    raw_retention_ms: u64,
    stale_recording_ms: u64,
) -> Result<MaintenanceReport, StoreError> {
    let monthly = store.create_monthly_partitions(3, now_ms).await?;
    let weekly = store.create_weekly_partitions(3, now_ms).await?;
    let decimated = store.decimate_snapshots(now_ms).await?;
    let purged = store.purge_expired_telemetry(now_ms).await?;
    let raw_dropped = store.drop_old_raw_partitions(raw_retention_ms, now_ms).await?;
    let expired = store.expire_stale_recording_calls(stale_recording_ms, now_ms).await?;
    let groups_deleted = store.delete_empty_call_groups().await?;
    Ok(MaintenanceReport {
        monthly_partitions_created: monthly,
        weekly_partitions_created: weekly,
        rows_decimated: decimated,
        telemetry_rows_purged: purged,
        raw_partitions_dropped: raw_dropped,
        calls_expired: expired,
        call_groups_deleted: groups_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> InstanceId {
        InstanceId::from("site-a")
    }

    #[tokio::test]
    async fn resolve_system_is_idempotent_by_p25_identity() {
        let store = MemStore::in_memory();
        let kind = SystemKind::P25Trunked { sysid: Some(10), wacn: Some(20) };
        let id1 = store.resolve_system(&instance(), "metro", kind.clone()).await.unwrap();
        let id2 = store.resolve_system(&instance(), "metro-renamed", kind).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn call_start_with_same_external_id_updates_in_place() {
        let store = MemStore::in_memory();
        let params = CallStartParams {
            instance_id: instance(),
            external_id: "ext-1".into(),
            system_id: SystemId(1),
            site_id: SiteId(1),
            tgid: Tgid(100),
            start_time_ms: 1_000,
            freq: Some(851_000_000),
        };
        let id1 = store.call_start(params.clone()).await.unwrap();
        let mut params2 = params;
        params2.start_time_ms = 1_100;
        let id2 = store.call_start(params2).await.unwrap();
        assert_eq!(id1, id2);
        let call = store.get_call(id1).await.unwrap().unwrap();
        assert_eq!(call.start_time_ms, 1_100);
    }

    #[tokio::test]
    async fn expire_stale_recording_calls_marks_expired() {
        let store = MemStore::in_memory();
        let params = CallStartParams {
            instance_id: instance(),
            external_id: "ext-2".into(),
            system_id: SystemId(1),
            site_id: SiteId(1),
            tgid: Tgid(200),
            start_time_ms: 0,
            freq: None,
        };
        let id = store.call_start(params).await.unwrap();
        let expired = store.expire_stale_recording_calls(3_600_000, 4_000_000).await.unwrap();
        assert_eq!(expired, 1);
        let call = store.get_call(id).await.unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Expired);
    }

    #[tokio::test]
    async fn wal_backed_store_replays_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let params = CallStartParams {
            instance_id: instance(),
            external_id: "ext-3".into(),
            system_id: SystemId(1),
            site_id: SiteId(1),
            tgid: Tgid(300),
            start_time_ms: 5_000,
            freq: None,
        };
        let id = {
            let store = MemStore::open(&path).unwrap();
            store.call_start(params).await.unwrap()
        };
        let store = MemStore::open(&path).unwrap();
        let call = store.get_call(id).await.unwrap().unwrap();
        assert_eq!(call.start_time_ms, 5_000);
    }
}
