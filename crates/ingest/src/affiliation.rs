// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-to-talkgroup affiliation map, evicted on a 24h silence timer by the
//! Maintenance Scheduler.

use parking_lot::Mutex;
use relay_core::domain::{Affiliation, AffiliationKey, Tgid};
use std::collections::HashMap;

pub struct AffiliationMap {
    entries: Mutex<HashMap<AffiliationKey, Affiliation>>,
    ttl_ms: u64,
}

impl AffiliationMap {
    pub fn new(ttl_ms: u64) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl_ms }
    }

    pub fn update(&self, key: AffiliationKey, tgid: Tgid, now_ms: u64) {
        self.entries.lock().insert(key, Affiliation { tgid, last_updated_ms: now_ms });
    }

    pub fn get(&self, key: &AffiliationKey) -> Option<Affiliation> {
        self.entries.lock().get(key).copied()
    }

    /// Evict entries silent for longer than the configured TTL.
    pub fn evict_expired(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, a| now_ms.saturating_sub(a.last_updated_ms) < self.ttl_ms);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::{SystemId, UnitNum};

    #[test]
    fn update_then_get_roundtrips() {
        let map = AffiliationMap::new(86_400_000);
        let key = AffiliationKey { system_id: SystemId(1), unit: UnitNum(42) };
        map.update(key, Tgid(100), 1_000);
        assert_eq!(map.get(&key).unwrap().tgid, Tgid(100));
    }

    #[test]
    fn evict_expired_removes_stale_entries() {
        let map = AffiliationMap::new(1_000);
        let key = AffiliationKey { system_id: SystemId(1), unit: UnitNum(42) };
        map.update(key, Tgid(100), 0);
        assert_eq!(map.evict_expired(5_000), 1);
        assert!(map.get(&key).is_none());
    }
}
