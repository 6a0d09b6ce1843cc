// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory entries tracked by the active-call table while a call is recording.

use super::call::{CallId, Source};
use super::system::SystemId;
use super::talkgroup::Tgid;

/// Fuzzy-match window, in milliseconds, for matching a late-arriving
/// `call_end`/recorder message against a `call_start` with a slightly
/// different reported start time.
pub const FUZZY_MATCH_WINDOW_MS: u64 = 5_000;

/// One entry in the active-call table: a call that has started but has not
/// yet been matched with an end event.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCallEntry {
    pub call_id: CallId,
    /// The `call_start` payload's own external call ID — the key this entry
    /// is actually stored under. A `call_end` that matches via the fuzzy
    /// `(tgid, start_time)` path carries a different external ID of its own,
    /// so deleting this entry on a fuzzy match must use this field, not the
    /// `call_end` payload's ID.
    pub external_id: String,
    pub system_id: SystemId,
    pub tgid: Tgid,
    pub start_time_ms: u64,
    pub source: Source,
    pub freq: Option<u64>,
    /// Wall-clock time (ingest-side, not radio-side) this entry was inserted.
    /// Used for time-based expiry independent of the radio's own start time.
    pub inserted_at_ms: u64,
}

impl ActiveCallEntry {
    /// True if `other_start_ms` falls within [`FUZZY_MATCH_WINDOW_MS`] of
    /// this entry's start time, in either direction.
    pub fn fuzzy_matches(&self, other_start_ms: u64) -> bool {
        let diff = self.start_time_ms.abs_diff(other_start_ms);
        diff <= FUZZY_MATCH_WINDOW_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn fuzzy_match_within_window_either_direction() {
        let e = entry(10_000);
        assert!(e.fuzzy_matches(10_000 + FUZZY_MATCH_WINDOW_MS));
        assert!(e.fuzzy_matches(10_000 - FUZZY_MATCH_WINDOW_MS));
        assert!(!e.fuzzy_matches(10_000 + FUZZY_MATCH_WINDOW_MS + 1));
    }
}
