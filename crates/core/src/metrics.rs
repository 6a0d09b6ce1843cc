// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process counters for pipeline health. Not wired to an external sink;
//! a caller (e.g. a status endpoint) reads [`Metrics::snapshot`] on demand.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub messages_received: AtomicU64,
    pub messages_dropped_malformed: AtomicU64,
    pub messages_dropped_unknown_topic: AtomicU64,
    pub messages_dropped_queue_full: AtomicU64,
    pub messages_dropped_slow_subscriber: AtomicU64,
    pub batch_flushes: AtomicU64,
    pub batch_flush_failures: AtomicU64,
    pub bus_publishes: AtomicU64,
    pub bus_drops: AtomicU64,
    pub active_call_expirations: AtomicU64,
    pub transcription_success: AtomicU64,
    pub transcription_failure: AtomicU64,
    pub audio_uploads: AtomicU64,
    pub audio_upload_failures: AtomicU64,
    pub audio_reconciles: AtomicU64,
}

macro_rules! counter_field {
    ($name:ident) => {
        pub fn $name(&self) -> u64 {
            self.$name.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    counter_field!(messages_received);
    counter_field!(messages_dropped_malformed);
    counter_field!(messages_dropped_unknown_topic);
    counter_field!(messages_dropped_queue_full);
    counter_field!(messages_dropped_slow_subscriber);
    counter_field!(batch_flushes);
    counter_field!(batch_flush_failures);
    counter_field!(bus_publishes);
    counter_field!(bus_drops);
    counter_field!(active_call_expirations);
    counter_field!(transcription_success);
    counter_field!(transcription_failure);
    counter_field!(audio_uploads);
    counter_field!(audio_upload_failures);
    counter_field!(audio_reconciles);
}
