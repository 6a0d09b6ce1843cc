// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage boundary: every durable mutation the ingest pipeline makes
//! goes through this trait. A production implementation (e.g. Postgres) is
//! an external concern; [`crate::mem_store::MemStore`] is the in-process
//! reference implementation used for tests and small deployments.

use crate::recorder::RecorderSnapshot;
use async_trait::async_trait;
use relay_core::domain::{
    Call, CallId, InstanceId, RawMessage, Site, SiteId, System, SystemId, SystemKind, Talkgroup,
    Tgid, Unit, UnitEventKind, UnitNum,
};

use crate::error::StoreError;

/// One row of the identity cache, as loaded at startup by
/// [`Store::load_identity_cache`].
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityCacheRow {
    pub instance_id: InstanceId,
    pub system_name: String,
    pub system_id: SystemId,
    pub site_id: SiteId,
}

#[derive(Debug, Clone)]
pub struct CallStartParams {
    pub instance_id: InstanceId,
    pub external_id: String,
    pub system_id: SystemId,
    pub site_id: SiteId,
    pub tgid: Tgid,
    pub start_time_ms: u64,
    pub freq: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CallEndParams {
    pub call_id: CallId,
    pub end_time_ms: u64,
    pub duration_ms: Option<u64>,
    pub freqs: Vec<u64>,
    pub audio_path: Option<String>,
    pub sources: Vec<relay_core::domain::CallSourceEntry>,
}

#[derive(Debug, Clone)]
pub struct UnitEventRow {
    pub system_id: SystemId,
    pub unit: UnitNum,
    pub kind: UnitEventKind,
    pub tgid: Option<Tgid>,
    pub time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TrunkingMessageRow {
    pub system_id: SystemId,
    pub time_ms: u64,
    pub payload: serde_json::Value,
}

/// Counts produced by one run of the partition-maintenance task, for
/// logging.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub monthly_partitions_created: usize,
    pub weekly_partitions_created: usize,
    pub rows_decimated: usize,
    pub telemetry_rows_purged: usize,
    pub raw_partitions_dropped: usize,
    pub calls_expired: usize,
    pub call_groups_deleted: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Load every `(instance, system_name) -> (system_id, site_id)` row
    /// known to the store. An empty result tells the Warmup Gate this is a
    /// fresh install.
    async fn load_identity_cache(&self) -> Result<Vec<IdentityCacheRow>, StoreError>;

    async fn upsert_instance(&self, id: &InstanceId, now_ms: u64) -> Result<(), StoreError>;

    /// Resolve or create a system. `kind` carries the `(sysid, wacn)` pair
    /// when the payload supplied one; P25 systems match on that pair first,
    /// falling back to `(instance_id, short_name)` like conventional
    /// systems.
    async fn resolve_system(
        &self,
        instance_id: &InstanceId,
        short_name: &str,
        kind: SystemKind,
    ) -> Result<SystemId, StoreError>;

    async fn resolve_site(
        &self,
        system_id: SystemId,
        instance_id: &InstanceId,
        short_name: &str,
    ) -> Result<SiteId, StoreError>;

    async fn upsert_talkgroup(
        &self,
        system_id: SystemId,
        tgid: Tgid,
        alpha_tag: Option<String>,
        description: Option<String>,
    ) -> Result<(), StoreError>;

    async fn upsert_unit(
        &self,
        system_id: SystemId,
        unit: UnitNum,
        alpha_tag: Option<String>,
    ) -> Result<(), StoreError>;

    async fn get_system(&self, id: SystemId) -> Result<Option<System>, StoreError>;
    async fn get_site(&self, id: SiteId) -> Result<Option<Site>, StoreError>;
    async fn get_talkgroup(&self, system_id: SystemId, tgid: Tgid) -> Result<Option<Talkgroup>, StoreError>;
    async fn get_unit(&self, system_id: SystemId, unit: UnitNum) -> Result<Option<Unit>, StoreError>;

    /// Insert a new `RECORDING` call, or update the existing row if one
    /// already exists for `(instance, external_id)`. Returns the row's ID.
    async fn call_start(&self, params: CallStartParams) -> Result<CallId, StoreError>;

    /// Finalize a call: set duration/frequencies/audio reference and move
    /// status to `COMPLETED`.
    async fn call_end(&self, params: CallEndParams) -> Result<(), StoreError>;

    async fn get_call(&self, id: CallId) -> Result<Option<Call>, StoreError>;

    /// Assign `call_id` to the call-group keyed by `(system_id, tgid,
    /// start_time_bucket_ms)`, used to merge the same call observed from
    /// multiple sites. Idempotent.
    async fn assign_call_group(
        &self,
        system_id: SystemId,
        tgid: Tgid,
        start_time_bucket_ms: u64,
        call_id: CallId,
    ) -> Result<(), StoreError>;

    /// Mark calls stuck `RECORDING` past `older_than_ms` as `EXPIRED`.
    /// Returns the number of rows updated.
    async fn expire_stale_recording_calls(&self, older_than_ms: u64, now_ms: u64) -> Result<usize, StoreError>;

    async fn insert_unit_event(&self, row: UnitEventRow) -> Result<(), StoreError>;

    /// Persist a completed transcript, replacing any prior transcript for
    /// the same call.
    async fn insert_transcript(&self, transcript: relay_core::transcription::Transcript) -> Result<(), StoreError>;
    async fn get_transcript(&self, call_id: CallId) -> Result<Option<relay_core::transcription::Transcript>, StoreError>;

    async fn insert_recorder_snapshots(&self, rows: Vec<RecorderSnapshot>) -> Result<(), StoreError>;
    async fn insert_trunking_messages(&self, rows: Vec<TrunkingMessageRow>) -> Result<(), StoreError>;
    async fn insert_raw_messages(&self, rows: Vec<RawMessage>) -> Result<(), StoreError>;

    async fn create_monthly_partitions(&self, months_ahead: u32, now_ms: u64) -> Result<usize, StoreError>;
    async fn create_weekly_partitions(&self, weeks_ahead: u32, now_ms: u64) -> Result<usize, StoreError>;
    async fn decimate_snapshots(&self, now_ms: u64) -> Result<usize, StoreError>;
    async fn purge_expired_telemetry(&self, now_ms: u64) -> Result<usize, StoreError>;
    async fn drop_old_raw_partitions(&self, retention_ms: u64, now_ms: u64) -> Result<usize, StoreError>;
    async fn delete_empty_call_groups(&self) -> Result<usize, StoreError>;

    /// Recompute per-talkgroup call counts and last-heard times from the
    /// calls table. Returns the number of talkgroups touched.
    async fn refresh_talkgroup_stats(&self) -> Result<usize, StoreError>;
}
