// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The raw, unparsed telemetry message as it arrives at the boundary, and the
//! topic classification assigned to it by the router.

use super::instance::InstanceId;
use serde::{Deserialize, Serialize};

/// Coarse classification of an inbound message's trailing topic segment.
/// See the topic router for the matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Systems,
    CallStart,
    CallEnd,
    Recorders,
    UnitEvent,
    TrunkingMessage,
    ConsoleLog,
    ConsoleStatus,
    ConsoleConfig,
    ConsoleRates,
    Audio,
    Unknown,
}

crate::simple_display! {
    Topic {
        Systems => "systems",
        CallStart => "call_start",
        CallEnd => "call_end",
        Recorders => "recorders",
        UnitEvent => "unit",
        TrunkingMessage => "trunking_message",
        ConsoleLog => "log",
        ConsoleStatus => "status",
        ConsoleConfig => "config",
        ConsoleRates => "rates",
        Audio => "audio",
        Unknown => "unknown",
    }
}

/// A message as received at the ingest boundary, before full deserialization.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// The original, unclassified topic string, kept so a buffered message
    /// can be re-routed once the Warmup Gate drains.
    pub topic_raw: String,
    pub topic: Topic,
    pub instance_id: Option<InstanceId>,
    pub received_at_ms: u64,
    pub payload: serde_json::Value,
}
