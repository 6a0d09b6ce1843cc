// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-word unit attribution: assigns each transcribed word to the
//! transmission (and therefore the radio unit) that most likely spoke it,
//! then groups words into text segments.

use relay_core::transcription::{AttributedWord, ProviderWord, Segment, Transmission};

const BOUNDARY_GAP_SEC: f64 = 0.3;
const SHORT_WORD_DURATION_SEC: f64 = 0.05;
const BOUNDARY_REASSIGN_WINDOW_SEC: f64 = 0.5;
const CLUSTER_INTERNAL_GAP_SEC: f64 = 0.15;

/// Unknown source: the word could not be matched to any transmission.
const UNKNOWN_SOURCE: u32 = 0;

fn home_transmission(word: &ProviderWord, transmissions: &[Transmission]) -> u32 {
    if let Some(t) = transmissions.iter().find(|t| t.contains(word.start_sec)) {
        return t.source_id;
    }
    transmissions
        .iter()
        .min_by(|a, b| {
            (a.start_sec - word.start_sec)
                .abs()
                .partial_cmp(&(b.start_sec - word.start_sec).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|t| t.source_id)
        .unwrap_or(UNKNOWN_SOURCE)
}

/// Boundary correction for P25 control-channel lag: when a speaker change is
/// marked by a silence gap, walk backward from the boundary word reassigning
/// very short words that sit right at the edge of the old transmission to
/// the new speaker.
fn correct_boundaries(words: &[ProviderWord], sources: &mut [u32], transmissions: &[Transmission]) {
    if words.len() < 2 {
        return;
    }
    for i in 0..words.len() - 1 {
        let gap = words[i + 1].start_sec - (words[i].start_sec + words[i].duration_sec);
        if gap <= BOUNDARY_GAP_SEC || sources[i + 1] == sources[i] {
            continue;
        }
        let next_source = sources[i + 1];
        let mut j = i;
        loop {
            if words[j].duration_sec >= SHORT_WORD_DURATION_SEC {
                break;
            }
            let current_end = transmissions.iter().find(|t| t.source_id == sources[j]).map(|t| t.end_sec);
            let within_boundary = match current_end {
                Some(end) => (words[j].start_sec - end).abs() <= BOUNDARY_REASSIGN_WINDOW_SEC,
                None => false,
            };
            if !within_boundary {
                break;
            }
            if j < i {
                let inner_gap = words[j + 1].start_sec - (words[j].start_sec + words[j].duration_sec);
                if inner_gap > CLUSTER_INTERNAL_GAP_SEC {
                    break;
                }
            }
            sources[j] = next_source;
            if j == 0 {
                break;
            }
            j -= 1;
        }
    }
}

/// Sequentially match each word's text against `full_text`, case-insensitive,
/// never revisiting text already consumed. Returns the byte span in
/// `full_text` for each word that was found.
fn match_word_spans(words: &[ProviderWord], full_text: &str) -> Vec<Option<(usize, usize)>> {
    let lower_full = full_text.to_lowercase();
    let mut cursor = 0usize;
    let mut spans = Vec::with_capacity(words.len());
    for word in words {
        let token = word.text.to_lowercase();
        if token.is_empty() {
            spans.push(None);
            continue;
        }
        match lower_full[cursor..].find(token.as_str()) {
            Some(rel) => {
                let start = cursor + rel;
                let end = start + token.len();
                cursor = end;
                spans.push(Some((start, end)));
            }
            None => spans.push(None),
        }
    }
    spans
}

fn segment_text(words: &[AttributedWord], spans: &[Option<(usize, usize)>], full_text: Option<&str>) -> String {
    if let Some(full_text) = full_text {
        let first = spans.iter().find_map(|s| *s);
        let last = spans.iter().rev().find_map(|s| *s);
        if let (Some((start, _)), Some((_, end))) = (first, last) {
            return full_text[start..end].to_string();
        }
    }
    words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
}

/// Run word attribution: assign each word a source transmission, correct
/// boundary artifacts, then group consecutive same-source words into
/// segments.
pub fn attribute_words(
    words: &[ProviderWord],
    transmissions: &[Transmission],
    full_text: Option<&str>,
) -> (Vec<AttributedWord>, Vec<Segment>) {
    let mut sources: Vec<u32> = words.iter().map(|w| home_transmission(w, transmissions)).collect();
    correct_boundaries(words, &mut sources, transmissions);

    let attributed: Vec<AttributedWord> = words
        .iter()
        .zip(sources.iter())
        .map(|(w, &source_id)| AttributedWord {
            text: w.text.clone(),
            start_sec: w.start_sec,
            duration_sec: w.duration_sec,
            source_id,
        })
        .collect();

    let spans = match full_text {
        Some(text) => match_word_spans(words, text),
        None => vec![None; words.len()],
    };

    let mut segments = Vec::new();
    let mut start = 0usize;
    while start < attributed.len() {
        let mut end = start + 1;
        while end < attributed.len() && attributed[end].source_id == attributed[start].source_id {
            end += 1;
        }
        let group = &attributed[start..end];
        let group_spans = &spans[start..end];
        segments.push(Segment {
            source_id: group[0].source_id,
            start_sec: group[0].start_sec,
            end_sec: group.iter().map(|w| w.start_sec + w.duration_sec).fold(f64::MIN, f64::max),
            text: segment_text(group, group_spans, full_text),
        });
        start = end;
    }

    (attributed, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::Source;

    fn word(text: &str, start_sec: f64, duration_sec: f64) -> ProviderWord {
        ProviderWord { text: text.to_string(), start_sec, duration_sec }
    }

    fn transmission(source_id: u32, start_sec: f64, end_sec: f64) -> Transmission {
        Transmission { source_id, source: Source::Recorder, start_sec, end_sec }
    }

    #[test]
    fn words_are_assigned_to_the_containing_transmission() {
        let words = vec![word("hello", 0.5, 0.2), word("world", 6.0, 0.3)];
        let transmissions = vec![transmission(1, 0.0, 5.0), transmission(2, 5.0, 10.0)];
        let (attributed, segments) = attribute_words(&words, &transmissions, None);
        assert_eq!(attributed[0].source_id, 1);
        assert_eq!(attributed[1].source_id, 2);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn word_outside_any_transmission_goes_to_nearest_start() {
        let words = vec![word("late", 11.0, 0.2)];
        let transmissions = vec![transmission(1, 0.0, 5.0), transmission(2, 5.0, 10.0)];
        let (attributed, _) = attribute_words(&words, &transmissions, None);
        assert_eq!(attributed[0].source_id, 2);
    }

    #[test]
    fn no_transmissions_yields_unknown_source() {
        let words = vec![word("x", 0.0, 0.1)];
        let (attributed, _) = attribute_words(&words, &[], None);
        assert_eq!(attributed[0].source_id, UNKNOWN_SOURCE);
    }

    #[test]
    fn short_boundary_word_is_reassigned_to_new_speaker() {
        // Two words right at the 5.0s boundary: "uh" is a 0.02s artifact
        // assigned to transmission 1 by its raw timestamp, but the next
        // word starts after a clear silence gap on transmission 2.
        let words = vec![word("uh", 4.98, 0.02), word("roger", 5.4, 0.3)];
        let transmissions = vec![transmission(1, 0.0, 5.0), transmission(2, 5.0, 10.0)];
        let (attributed, _) = attribute_words(&words, &transmissions, None);
        assert_eq!(attributed[1].source_id, 2);
        assert_eq!(attributed[0].source_id, 2);
    }

    #[test]
    fn segment_text_is_sliced_from_full_text_preserving_punctuation() {
        let words = vec![word("hello,", 0.0, 0.3), word("world!", 0.5, 0.3)];
        let transmissions = vec![transmission(1, 0.0, 5.0)];
        let (_, segments) = attribute_words(&words, &transmissions, Some("hello, world!"));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello, world!");
    }

    #[test]
    fn missing_full_text_joins_tokens_with_spaces() {
        let words = vec![word("hello", 0.0, 0.3), word("world", 0.5, 0.3)];
        let transmissions = vec![transmission(1, 0.0, 5.0)];
        let (_, segments) = attribute_words(&words, &transmissions, None);
        assert_eq!(segments[0].text, "hello world");
    }
}
