// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-bus payloads published for downstream subscribers (e.g. an SSE
//! fan-out layer), independent of the internal dispatch path.

use crate::domain::{Call, CallId, SiteId, SystemId, Tgid, UnitEventKind, UnitId};
use serde::{Deserialize, Serialize};

/// Event-type discriminant, used both as the wire `type` tag and for
/// subscriber-side filtering. `unit_event` carries a subtype (the unit-event
/// kind) in [`BusEvent::subtype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CallStart,
    CallEnd,
    UnitEvent,
    RecorderUpdate,
    RateUpdate,
    Transcription,
    SystemUpdate,
}

crate::simple_display! {
    EventKind {
        CallStart => "call_start",
        CallEnd => "call_end",
        UnitEvent => "unit_event",
        RecorderUpdate => "recorder_update",
        RateUpdate => "rate_update",
        Transcription => "transcription",
        SystemUpdate => "system_update",
    }
}

/// A filter a subscriber registers at subscribe time. Dimensions are AND-ed
/// together; within a dimension, an empty list means "any value passes",
/// otherwise the event's value must be one of the listed values. An unset
/// dimension on the *event* (e.g. no site ID on a system-level event)
/// always passes, regardless of what the filter asks for.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kinds: Vec<EventKind>,
    pub subtypes: Vec<UnitEventKind>,
    pub system_ids: Vec<SystemId>,
    pub site_ids: Vec<SiteId>,
    pub tgids: Vec<Tgid>,
    pub unit_ids: Vec<UnitId>,
    pub emergency_only: bool,
}

fn dim_matches<T: PartialEq>(allowed: &[T], value: Option<T>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match value {
        Some(v) => allowed.contains(&v),
        None => true,
    }
}

impl EventFilter {
    pub fn matches(&self, event: &BusEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !dim_matches(&self.subtypes, event.subtype) {
            return false;
        }
        if !dim_matches(&self.system_ids, event.system_id) {
            return false;
        }
        if !dim_matches(&self.site_ids, event.site_id) {
            return false;
        }
        if !dim_matches(&self.tgids, event.tgid) {
            return false;
        }
        if !dim_matches(&self.unit_ids, event.unit_id) {
            return false;
        }
        if self.emergency_only && !event.emergency {
            return false;
        }
        true
    }
}

/// An event published onto the bus.
///
/// `seq` is assigned by the bus at publish time in the form
/// `"{unix_ms}-{seq}"` and is unique and monotonically increasing within a
/// process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub seq: String,
    pub kind: EventKind,
    pub subtype: Option<UnitEventKind>,
    pub system_id: Option<SystemId>,
    pub site_id: Option<SiteId>,
    pub tgid: Option<Tgid>,
    pub unit_id: Option<UnitId>,
    pub call_id: Option<CallId>,
    pub emergency: bool,
    pub payload: serde_json::Value,
}

impl BusEvent {
    pub fn for_call(kind: EventKind, call: &Call) -> Self {
        Self {
            seq: String::new(),
            kind,
            subtype: None,
            system_id: Some(call.system_id),
            site_id: None,
            tgid: Some(call.tgid),
            unit_id: None,
            call_id: Some(call.id),
            emergency: false,
            payload: serde_json::json!({ "call": call }),
        }
    }
}
