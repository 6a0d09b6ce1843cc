// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dedup key for high-frequency unit events, which P25 control channels can
//! repeat several times per second for the same physical event.

use super::system::SystemId;
use super::talkgroup::Tgid;
use super::unit::{UnitEventKind, UnitNum};

/// Identifies a unit event for deduplication purposes. Two events that
/// produce an equal key within the dedup TTL are treated as the same event;
/// the exact time-bucket granularity is an implementation detail callers
/// must not rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitEventDedupKey {
    pub system_id: SystemId,
    pub unit: UnitNum,
    pub kind: UnitEventKind,
    pub tgid: Option<Tgid>,
    pub time_bucket_ms: u64,
}

impl UnitEventDedupKey {
    pub fn new(
        system_id: SystemId,
        unit: UnitNum,
        kind: UnitEventKind,
        tgid: Option<Tgid>,
        event_time_ms: u64,
        bucket_width_ms: u64,
    ) -> Self {
        let time_bucket_ms = if bucket_width_ms == 0 {
            event_time_ms
        } else {
            event_time_ms - (event_time_ms % bucket_width_ms)
        };
        Self { system_id, unit, kind, tgid, time_bucket_ms }
    }
}
