// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory index of in-flight calls, keyed by external call ID with a
//! secondary `(tgid, start_time)` index for fuzzy lookup at `call_end`.

use parking_lot::RwLock;
use relay_core::domain::{ActiveCallEntry, InstanceId, SystemId, Tgid};
use std::collections::HashMap;

type ExternalKey = (InstanceId, String);

#[derive(Default)]
struct Inner {
    by_external: HashMap<ExternalKey, ActiveCallEntry>,
}

/// An entry exists in the table iff the corresponding persisted row has
/// status `RECORDING`; the Maintenance Scheduler reconciles drift from the
/// store side.
pub struct ActiveCallTable {
    inner: RwLock<Inner>,
}

impl ActiveCallTable {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    pub fn set(&self, instance_id: InstanceId, external_id: String, entry: ActiveCallEntry) {
        self.inner.write().by_external.insert((instance_id, external_id), entry);
    }

    pub fn get(&self, instance_id: &InstanceId, external_id: &str) -> Option<ActiveCallEntry> {
        self.inner.read().by_external.get(&(instance_id.clone(), external_id.to_string())).cloned()
    }

    /// Find the entry with matching `(system_id, tgid)` whose start time is
    /// within the fuzzy window of `observed_start_ms`, smallest difference
    /// wins.
    pub fn find_by_tgid_and_time(
        &self,
        system_id: SystemId,
        tgid: Tgid,
        observed_start_ms: u64,
    ) -> Option<ActiveCallEntry> {
        self.inner
            .read()
            .by_external
            .values()
            .filter(|e| e.system_id == system_id && e.tgid == tgid && e.fuzzy_matches(observed_start_ms))
            .min_by_key(|e| e.start_time_ms.abs_diff(observed_start_ms))
            .cloned()
    }

    pub fn delete(&self, instance_id: &InstanceId, external_id: &str) -> Option<ActiveCallEntry> {
        self.inner.write().by_external.remove(&(instance_id.clone(), external_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries older than `max_age_ms` (by insertion time), returning
    /// them for accounting/event emission by the caller.
    pub fn expire_older_than(&self, max_age_ms: u64, now_ms: u64) -> Vec<ActiveCallEntry> {
        let mut inner = self.inner.write();
        let expired_keys: Vec<ExternalKey> = inner
            .by_external
            .iter()
            .filter(|(_, e)| now_ms.saturating_sub(e.inserted_at_ms) > max_age_ms)
            .map(|(k, _)| k.clone())
            .collect();

        expired_keys.iter().filter_map(|k| inner.by_external.remove(k)).collect()
    }
}

impl Default for ActiveCallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::{CallId, Source};

    fn entry(start_ms: u64) -> ActiveCallEntry {
        ActiveCallEntry {
            call_id: CallId::new(),
            external_id: "ext".into(),
            system_id: SystemId(1),
            tgid: Tgid(100),
            start_time_ms: start_ms,
            source: Source::Recorder,
            freq: None,
            inserted_at_ms: start_ms,
        }
    }

    #[test]
    fn exact_lookup_roundtrips() {
        let table = ActiveCallTable::new();
        let instance = InstanceId::from("site-a");
        table.set(instance.clone(), "ext-1".into(), entry(1_000));
        assert!(table.get(&instance, "ext-1").is_some());
        assert!(table.get(&instance, "ext-2").is_none());
    }

    #[test]
    fn fuzzy_lookup_picks_closest_match() {
        let table = ActiveCallTable::new();
        let instance = InstanceId::from("site-a");
        table.set(instance.clone(), "ext-1".into(), entry(10_000));
        table.set(instance, "ext-2".into(), entry(10_500));

        let found = table.find_by_tgid_and_time(SystemId(1), Tgid(100), 10_400).unwrap();
        assert_eq!(found.start_time_ms, 10_500);
    }

    #[test]
    fn expire_older_than_removes_stale_entries() {
        let table = ActiveCallTable::new();
        let instance = InstanceId::from("site-a");
        table.set(instance, "ext-1".into(), entry(0));

        let expired = table.expire_older_than(3_600_000, 4_000_000);
        assert_eq!(expired.len(), 1);
        assert!(table.is_empty());
    }
}
