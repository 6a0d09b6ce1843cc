// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event fan-out: a sequenced ring buffer for short-term replay
//! plus a subscriber table of bounded queues. Publish never blocks; a slow
//! subscriber loses events instead of stalling the publisher.

use parking_lot::RwLock;
use relay_core::event::{BusEvent, EventFilter};
use relay_core::Metrics;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<BusEvent>,
}

struct Ring {
    capacity: usize,
    buf: VecDeque<BusEvent>,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { capacity, buf: VecDeque::with_capacity(capacity) }
    }

    fn push(&mut self, event: BusEvent) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(event);
    }
}

fn seq_value(seq: &str) -> u64 {
    seq.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// The event bus. Cheap to clone — internals are `Arc`-shared.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    ring: RwLock<Ring>,
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    next_sub_id: AtomicU64,
    next_seq: AtomicU64,
    metrics: Arc<Metrics>,
}

impl EventBus {
    pub fn new(ring_capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ring: RwLock::new(Ring::new(ring_capacity)),
                subscribers: RwLock::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    /// Assign a sequence number, write into the ring, then fan out to every
    /// subscriber whose filter matches. Never blocks: a subscriber with a
    /// full queue simply does not receive this event.
    pub fn publish(&self, unix_ms: u64, mut event: BusEvent) -> String {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        event.seq = format!("{unix_ms}-{seq}");

        self.inner.ring.write().push(event.clone());

        let subscribers = self.inner.subscribers.read();
        for sub in subscribers.values() {
            if !sub.filter.matches(&event) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => Metrics::incr(&self.inner.metrics.bus_publishes),
                Err(_) => {
                    Metrics::incr(&self.inner.metrics.bus_drops);
                    debug!("subscriber queue full, event dropped");
                }
            }
        }
        event.seq
    }

    /// Register a new subscriber. Returns a receiver for matching events and
    /// the ID to pass to [`EventBus::unsubscribe`].
    pub fn subscribe(&self, filter: EventFilter) -> (SubscriptionId, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = SubscriptionId(self.inner.next_sub_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().insert(id, Subscriber { filter, tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.write().remove(&id);
    }

    /// Events with sequence strictly greater than `last_seen_id` that match
    /// `filter`, oldest retained event first. If `last_seen_id` is not found
    /// in the ring (it has wrapped past it), every retained event that
    /// matches is returned.
    pub fn replay_since(&self, last_seen_id: &str, filter: &EventFilter) -> Vec<BusEvent> {
        let ring = self.inner.ring.read();
        let last_seq = seq_value(last_seen_id);
        let found = ring.buf.iter().any(|e| e.seq == last_seen_id);

        ring.buf
            .iter()
            .filter(|e| if found { seq_value(&e.seq) > last_seq } else { true })
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }
}
