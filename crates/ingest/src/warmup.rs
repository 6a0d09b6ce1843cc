// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffers non-identity messages until the identity cache is primed (or a
//! deadline fires), so data-carrying messages can't race ahead of the
//! `systems` message that teaches the resolver about `(sysid, wacn)`.

use parking_lot::Mutex;
use relay_core::domain::{RawMessage, Topic};
use relay_core::clock::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BUFFER_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Buffered,
    Open,
    Bypass,
}

fn passes_while_buffered(topic: Topic) -> bool {
    matches!(topic, Topic::Systems | Topic::ConsoleConfig | Topic::ConsoleStatus)
}

/// Three-state gate: `buffered` (queue everything but identity-priming
/// messages), `open` (drain and pass everything), `bypass` (the store
/// already had identity rows at startup, so there's nothing to warm up).
pub struct WarmupGate {
    state: Mutex<GateState>,
    buffer: Mutex<Vec<RawMessage>>,
    buffer_cap: usize,
    opened: AtomicBool,
}

impl WarmupGate {
    pub fn new(buffer_cap: usize) -> Self {
        Self {
            state: Mutex::new(GateState::Buffered),
            buffer: Mutex::new(Vec::new()),
            buffer_cap,
            opened: AtomicBool::new(false),
        }
    }

    /// Call once at startup with the result of [`crate::identity::IdentityResolver::load_cache`].
    pub fn start(&self, cache_had_rows: bool) {
        if cache_had_rows {
            *self.state.lock() = GateState::Bypass;
            self.opened.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Relaxed)
    }

    /// Never re-closes once opened (invariant 6): a `systems` message or the
    /// deadline moves `buffered -> open` and it stays there.
    fn open(&self) -> Vec<RawMessage> {
        let mut state = self.state.lock();
        if *state == GateState::Open || *state == GateState::Bypass {
            return Vec::new();
        }
        *state = GateState::Open;
        self.opened.store(true, Ordering::Relaxed);
        std::mem::take(&mut *self.buffer.lock())
    }

    /// Admit a message. Returns `Some(messages)` to dispatch immediately
    /// (the message itself, plus anything drained by this call opening the
    /// gate); `None` means the message was buffered.
    pub fn admit(&self, message: RawMessage) -> Option<Vec<RawMessage>> {
        let opens = message.topic == Topic::Systems;
        let state = *self.state.lock();

        match state {
            GateState::Open | GateState::Bypass => Some(vec![message]),
            GateState::Buffered => {
                if opens {
                    let mut drained = self.open();
                    drained.push(message);
                    return Some(drained);
                }
                if passes_while_buffered(message.topic) {
                    return Some(vec![message]);
                }
                let mut buffer = self.buffer.lock();
                if buffer.len() >= self.buffer_cap {
                    warn!("warmup buffer full, dropping message");
                    return None;
                }
                buffer.push(message);
                None
            }
        }
    }

    /// Spawn the 5s hard-deadline task. If the gate is still `buffered` when
    /// it fires, force it open and return the drained buffer to the caller
    /// for dispatch.
    pub async fn run_deadline<C: Clock>(self: &Arc<Self>, clock: C, timeout: Duration) -> Vec<RawMessage> {
        let start = clock.now();
        loop {
            if self.is_open() {
                return Vec::new();
            }
            if clock.now().duration_since(start) >= timeout {
                return self.open();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(topic: Topic) -> RawMessage {
        RawMessage { topic_raw: String::new(), topic, instance_id: None, received_at_ms: 0, payload: json!({}) }
    }

    #[test]
    fn buffers_non_identity_messages_until_systems_arrives() {
        let gate = WarmupGate::new(10);
        gate.start(false);

        assert!(gate.admit(msg(Topic::CallStart)).is_none());
        assert!(!gate.is_open());

        let drained = gate.admit(msg(Topic::Systems)).unwrap();
        assert_eq!(drained.len(), 2);
        assert!(gate.is_open());
    }

    #[test]
    fn identity_adjacent_topics_pass_while_buffered() {
        let gate = WarmupGate::new(10);
        gate.start(false);
        assert!(gate.admit(msg(Topic::ConsoleConfig)).is_some());
        assert!(gate.admit(msg(Topic::ConsoleStatus)).is_some());
    }

    #[test]
    fn bypass_when_cache_had_rows() {
        let gate = WarmupGate::new(10);
        gate.start(true);
        assert!(gate.is_open());
        assert!(gate.admit(msg(Topic::CallStart)).is_some());
    }

    #[test]
    fn never_recloses_once_open() {
        let gate = WarmupGate::new(10);
        gate.start(false);
        gate.admit(msg(Topic::Systems));
        assert!(gate.is_open());
        gate.admit(msg(Topic::CallStart));
        assert!(gate.is_open());
    }

    #[test]
    fn drops_with_log_when_buffer_full() {
        let gate = WarmupGate::new(1);
        gate.start(false);
        assert!(gate.admit(msg(Topic::CallStart)).is_none());
        assert!(gate.admit(msg(Topic::CallEnd)).is_none());
    }
}
