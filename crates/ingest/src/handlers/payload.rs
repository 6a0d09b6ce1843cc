// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-topic payload shapes. Deliberately permissive (`#[serde(default)]`
//! everywhere a producer might omit a field) since the core does not
//! control the wire format of any one trunk-recorder version.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SystemEntry {
    pub sys_name: String,
    #[serde(default)]
    pub sys_num: Option<u32>,
    #[serde(default)]
    pub sysid: Option<u32>,
    #[serde(default)]
    pub wacn: Option<u32>,
    #[serde(default)]
    pub system_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemsPayload {
    #[serde(default)]
    pub systems: Vec<SystemEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallStartPayload {
    pub sys_name: String,
    #[serde(default)]
    pub sysid: Option<u32>,
    #[serde(default)]
    pub wacn: Option<u32>,
    pub call_id: String,
    pub talkgroup: u32,
    pub start_time: u64,
    #[serde(default)]
    pub freq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallSourcePayload {
    pub unit: u32,
    pub pos: f64,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub emergency: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioPayload {
    pub data_base64: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallEndPayload {
    pub sys_name: String,
    #[serde(default)]
    pub sysid: Option<u32>,
    #[serde(default)]
    pub wacn: Option<u32>,
    pub call_id: String,
    pub talkgroup: u32,
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub freqs: Vec<u64>,
    #[serde(default)]
    pub sources: Vec<CallSourcePayload>,
    #[serde(default)]
    pub audio: Option<AudioPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderEntry {
    pub sys_name: Option<String>,
    #[serde(default)]
    pub sysid: Option<u32>,
    #[serde(default)]
    pub wacn: Option<u32>,
    pub recorder_num: u32,
    pub rec_type: String,
    #[serde(default)]
    pub freq: Option<u64>,
    #[serde(default)]
    pub squelched: bool,
    #[serde(default)]
    pub recording: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordersPayload {
    #[serde(default)]
    pub recorders: Vec<RecorderEntry>,
}

/// Body of a standalone `…/audio` message, as distinct from the audio
/// object embedded in a `call_end` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioTopicPayload {
    pub call_id: String,
    pub data_base64: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitEventPayload {
    pub unit: u32,
    #[serde(default)]
    pub talkgroup: Option<u32>,
    #[serde(default)]
    pub sysid: Option<u32>,
    #[serde(default)]
    pub wacn: Option<u32>,
    #[serde(default)]
    pub time: Option<u64>,
}
