// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calls: the persisted record of a single transmission group on a talkgroup.

use super::site::SiteId;
use super::system::SystemId;
use super::talkgroup::Tgid;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Internally minted identifier for a call row.
    pub struct CallId("cal-");
}

/// Where a call's audio and metadata arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Recorder,
    Trunking,
}

crate::simple_display! {
    Source {
        Recorder => "recorder",
        Trunking => "trunking",
    }
}

/// Lifecycle status of a call row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// `call_start` seen, no `call_end` yet.
    Recording,
    /// `call_end` seen, row is final.
    Completed,
    /// Stuck `Recording` past the stale-recording threshold at a
    /// maintenance tick; closed without ever observing a `call_end`.
    Expired,
}

crate::simple_display! {
    CallStatus {
        Recording => "recording",
        Completed => "completed",
        Expired => "expired",
    }
}

/// One `(unit, position_in_audio)` entry from a call's reported source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSourceEntry {
    pub unit: u32,
    pub pos_sec: f64,
    pub tag: Option<String>,
    pub emergency: bool,
}

/// A single transmission group on a talkgroup.
///
/// `end_time_ms`, when present, is always >= `start_time_ms`; callers that
/// construct a [`Call`] directly (rather than through the active-call table)
/// must uphold this invariant themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub external_id: String,
    pub system_id: SystemId,
    pub site_id: SiteId,
    pub tgid: Tgid,
    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,
    pub status: CallStatus,
    pub source: Source,
    pub freqs: Vec<u64>,
    pub audio_path: Option<String>,
    pub sources: Vec<CallSourceEntry>,
}

impl Call {
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time_ms.map(|end| end.saturating_sub(self.start_time_ms))
    }
}
