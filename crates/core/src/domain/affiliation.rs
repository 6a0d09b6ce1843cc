// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-to-talkgroup affiliation tracking, as maintained from `join`/`on`/`off`
//! unit events.

use super::system::SystemId;
use super::talkgroup::Tgid;
use super::unit::UnitNum;

/// Current talkgroup a unit is affiliated with, per system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffiliationKey {
    pub system_id: SystemId,
    pub unit: UnitNum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affiliation {
    pub tgid: Tgid,
    pub last_updated_ms: u64,
}
