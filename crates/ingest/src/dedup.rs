// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-TTL dedup map for unit events, swept periodically by the
//! Maintenance Scheduler so repeated control-channel chatter produces one
//! row instead of several.

use parking_lot::Mutex;
use relay_core::domain::UnitEventDedupKey;
use std::collections::HashMap;

/// Bucket width used when building [`UnitEventDedupKey`]s here. Not part of
/// any external contract — callers must not rely on its exact value.
pub const DEDUP_BUCKET_WIDTH_MS: u64 = 1_000;

pub struct UnitEventDedup {
    seen: Mutex<HashMap<UnitEventDedupKey, u64>>,
    window_ms: u64,
}

impl UnitEventDedup {
    pub fn new(window_ms: u64) -> Self {
        Self { seen: Mutex::new(HashMap::new()), window_ms }
    }

    /// Returns `true` if this is the first time `key` has been seen within
    /// the dedup window (and records it); `false` if it's a repeat.
    pub fn observe(&self, key: UnitEventDedupKey, now_ms: u64) -> bool {
        let mut seen = self.seen.lock();
        match seen.get(&key) {
            Some(&last_ms) if now_ms.saturating_sub(last_ms) < self.window_ms => false,
            _ => {
                seen.insert(key, now_ms);
                true
            }
        }
    }

    /// Remove entries older than the dedup window.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, &mut last_ms| now_ms.saturating_sub(last_ms) < self.window_ms);
        before - seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::{SystemId, Tgid, UnitEventKind, UnitNum};

    fn key(bucket: u64) -> UnitEventDedupKey {
        UnitEventDedupKey::new(SystemId(1), UnitNum(100), UnitEventKind::Join, Some(Tgid(1)), bucket, DEDUP_BUCKET_WIDTH_MS)
    }

    #[test]
    fn repeated_event_within_window_is_not_novel() {
        let dedup = UnitEventDedup::new(5_000);
        assert!(dedup.observe(key(0), 1_000));
        assert!(!dedup.observe(key(0), 1_500));
    }

    #[test]
    fn event_after_window_elapses_is_novel_again() {
        let dedup = UnitEventDedup::new(5_000);
        assert!(dedup.observe(key(0), 1_000));
        assert!(dedup.observe(key(0), 10_000));
    }

    #[test]
    fn sweep_removes_entries_past_window() {
        let dedup = UnitEventDedup::new(5_000);
        dedup.observe(key(0), 1_000);
        let removed = dedup.sweep(10_000);
        assert_eq!(removed, 1);
    }
}
