// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcription domain types shared between the provider boundary and the
//! word-attribution algorithm.

use crate::domain::{CallId, CallSourceEntry, Source};
use serde::{Deserialize, Serialize};

/// One of a call's constituent transmissions, as recorded from the call's
/// source list (recorder segments or trunking messages).
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub source_id: u32,
    pub source: Source,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl Transmission {
    pub fn contains(&self, t_sec: f64) -> bool {
        t_sec >= self.start_sec && t_sec < self.end_sec
    }
}

/// A single transcribed word as returned by a provider, before attribution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderWord {
    pub text: String,
    pub start_sec: f64,
    pub duration_sec: f64,
}

/// Raw provider output for one transcription call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderResult {
    pub text: String,
    pub language: Option<String>,
    pub duration_sec: f64,
    pub words: Vec<ProviderWord>,
}

/// A word after attribution: which transmission source it belongs to.
///
/// `source_id` of `0` means "unknown" — the word could not be matched to
/// any transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedWord {
    pub text: String,
    pub start_sec: f64,
    pub duration_sec: f64,
    pub source_id: u32,
}

/// A contiguous run of words sharing the same `source_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub source_id: u32,
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// The fully attributed transcript, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: CallId,
    pub text: String,
    pub language: Option<String>,
    pub model: String,
    pub provider: String,
    pub duration_sec: f64,
    pub word_count: usize,
    pub words: Vec<AttributedWord>,
    pub segments: Vec<Segment>,
}

/// A unit of work enqueued to the transcription worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionJob {
    pub call_id: CallId,
    pub audio_key: String,
    pub transmissions: Vec<Transmission>,
}

/// Derive a call's `Transmission`s from its source list by consecutive
/// differencing: each source's end is the next source's start, and the
/// last source runs to `call_duration_sec`. `sources` must already be in
/// time order (the caller sorts by `pos_sec` first if needed).
pub fn derive_transmissions(sources: &[CallSourceEntry], call_duration_sec: f64) -> Vec<Transmission> {
    let mut out = Vec::with_capacity(sources.len());
    for (i, src) in sources.iter().enumerate() {
        let end_sec = sources.get(i + 1).map(|next| next.pos_sec).unwrap_or(call_duration_sec).max(src.pos_sec);
        out.push(Transmission {
            source_id: src.unit,
            source: Source::Recorder,
            start_sec: src.pos_sec,
            end_sec,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallSourceEntry;

    fn src(unit: u32, pos_sec: f64) -> CallSourceEntry {
        CallSourceEntry { unit, pos_sec, tag: None, emergency: false }
    }

    #[test]
    fn last_transmission_runs_to_call_duration() {
        let sources = vec![src(100, 0.0), src(200, 5.0), src(100, 8.0)];
        let transmissions = derive_transmissions(&sources, 12.0);
        assert_eq!(transmissions.len(), 3);
        assert_eq!(transmissions[0].start_sec, 0.0);
        assert_eq!(transmissions[0].end_sec, 5.0);
        assert_eq!(transmissions[2].start_sec, 8.0);
        assert_eq!(transmissions[2].end_sec, 12.0);
    }

    #[test]
    fn transmission_source_id_is_the_radio_unit_not_a_position_index() {
        let sources = vec![src(100, 0.0), src(200, 5.0)];
        let transmissions = derive_transmissions(&sources, 10.0);
        assert_eq!(transmissions[0].source_id, 100);
        assert_eq!(transmissions[1].source_id, 200);
    }

    #[test]
    fn single_source_spans_whole_call() {
        let transmissions = derive_transmissions(&[src(100, 0.0)], 9.5);
        assert_eq!(transmissions, vec![Transmission { source_id: 100, source: Source::Recorder, start_sec: 0.0, end_sec: 9.5 }]);
    }

    #[test]
    fn empty_source_list_yields_no_transmissions() {
        assert!(derive_transmissions(&[], 10.0).is_empty());
    }
}
