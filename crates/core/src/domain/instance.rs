// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A trunk-recorder process instance.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque identifier for a trunk-recorder process, supplied by the producer
/// (not minted internally — unlike [`crate::call::CallId`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection status of a trunk-recorder instance, as last observed by the
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

crate::simple_display! {
    ConnectionStatus {
        Connected => "connected",
        Disconnected => "disconnected",
    }
}

/// An instance record, created on first sighting and never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub last_seen_ms: u64,
    pub status: ConnectionStatus,
}

impl Instance {
    pub fn new_connected(id: InstanceId, now_ms: u64) -> Self {
        Self { id, last_seen_ms: now_ms, status: ConnectionStatus::Connected }
    }

    /// Update last-seen time and mark connected. Idempotent.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = now_ms;
        self.status = ConnectionStatus::Connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_updates_last_seen_and_status() {
        let mut inst = Instance::new_connected(InstanceId::from("x"), 100);
        inst.status = ConnectionStatus::Disconnected;
        inst.touch(200);
        assert_eq!(inst.last_seen_ms, 200);
        assert_eq!(inst.status, ConnectionStatus::Connected);
    }
}
