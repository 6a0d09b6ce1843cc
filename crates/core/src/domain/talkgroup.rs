// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Talkgroups and units, keyed by their on-air numeric identifiers.

use super::system::SystemId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Talkgroup ID as broadcast on the air. Scoped to a system, not globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tgid(pub u32);

impl fmt::Display for Tgid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TalkgroupId(pub i64);

impl fmt::Display for TalkgroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A talkgroup, scoped to a system and keyed by its on-air [`Tgid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talkgroup {
    pub id: TalkgroupId,
    pub system_id: SystemId,
    pub tgid: Tgid,
    pub alpha_tag: Option<String>,
    pub description: Option<String>,
}
