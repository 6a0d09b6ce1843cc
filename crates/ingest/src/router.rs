// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless topic classification by trailing segment. Prefix segments
//! (site/instance path components before the suffix) are not significant.

use relay_core::domain::{Topic, UnitEventKind};

/// Classification result: the handler tag plus whatever the trailing
/// segments extracted (a system name, a unit-event kind).
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub topic: Topic,
    pub system_name: Option<String>,
    pub unit_event_kind: Option<UnitEventKind>,
}

impl Route {
    fn plain(topic: Topic) -> Self {
        Self { topic, system_name: None, unit_event_kind: None }
    }
}

fn unit_event_kind(segment: &str) -> Option<UnitEventKind> {
    Some(match segment {
        "on" => UnitEventKind::On,
        "off" => UnitEventKind::Off,
        "join" => UnitEventKind::Join,
        "call" => UnitEventKind::Call,
        "data" => UnitEventKind::Data,
        "ackresp" => UnitEventKind::Ackresp,
        "location" => UnitEventKind::Location,
        "end" => UnitEventKind::End,
        _ => return None,
    })
}

/// The handler tag named in the topic table, used for raw-archival
/// allow/deny-list matching and logging. Distinct from [`Topic`]'s `Display`
/// impl, which favors shorter names for a couple of variants.
pub fn handler_tag(topic: Topic) -> &'static str {
    match topic {
        Topic::Systems => "systems",
        Topic::CallStart => "call_start",
        Topic::CallEnd => "call_end",
        Topic::Recorders => "recorders",
        Topic::UnitEvent => "unit_event",
        Topic::TrunkingMessage => "trunking_message",
        Topic::ConsoleLog => "console",
        Topic::ConsoleStatus => "status",
        Topic::ConsoleConfig => "config",
        Topic::ConsoleRates => "rates",
        Topic::Audio => "audio",
        Topic::Unknown => "unknown",
    }
}

/// Classify `topic` (a `/`-separated path) into a [`Route`].
pub fn route(topic: &str) -> Route {
    let segments: Vec<&str> = topic.split('/').filter(|s| !s.is_empty()).collect();
    let Some(&last) = segments.last() else {
        return Route::plain(Topic::Unknown);
    };

    match last {
        "status" => return Route::plain(Topic::ConsoleStatus),
        "systems" => return Route::plain(Topic::Systems),
        "config" => return Route::plain(Topic::ConsoleConfig),
        "rates" => return Route::plain(Topic::ConsoleRates),
        "call_start" => return Route::plain(Topic::CallStart),
        "call_end" => return Route::plain(Topic::CallEnd),
        "recorders" => return Route::plain(Topic::Recorders),
        "console" => return Route::plain(Topic::ConsoleLog),
        "audio" => return Route::plain(Topic::Audio),
        _ => {}
    }

    // Two-segment trailing patterns: `{sys}/message` and `{sys}/{event}`.
    if segments.len() >= 2 {
        let sys_name = segments[segments.len() - 2].to_string();
        if last == "message" {
            return Route { topic: Topic::TrunkingMessage, system_name: Some(sys_name), unit_event_kind: None };
        }
        if let Some(kind) = unit_event_kind(last) {
            return Route {
                topic: Topic::UnitEvent,
                system_name: Some(sys_name),
                unit_event_kind: Some(kind),
            };
        }
    }

    Route::plain(Topic::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_plain_trailing_patterns_regardless_of_prefix() {
        assert_eq!(route("rdio/site-a/systems").topic, Topic::Systems);
        assert_eq!(route("a/b/c/call_start").topic, Topic::CallStart);
        assert_eq!(route("call_end").topic, Topic::CallEnd);
    }

    #[test]
    fn extracts_system_name_from_trunking_message() {
        let r = route("rdio/metro/message");
        assert_eq!(r.topic, Topic::TrunkingMessage);
        assert_eq!(r.system_name.as_deref(), Some("metro"));
    }

    #[test]
    fn extracts_system_name_and_kind_from_unit_event() {
        let r = route("rdio/metro/join");
        assert_eq!(r.topic, Topic::UnitEvent);
        assert_eq!(r.system_name.as_deref(), Some("metro"));
        assert_eq!(r.unit_event_kind, Some(UnitEventKind::Join));
    }

    #[test]
    fn matches_audio_topic() {
        assert_eq!(route("rdio/site-a/audio").topic, Topic::Audio);
    }

    #[test]
    fn unrecognized_topic_is_unknown() {
        assert_eq!(route("rdio/metro/bogus").topic, Topic::Unknown);
        assert_eq!(route("").topic, Topic::Unknown);
    }

    #[test]
    fn handler_tag_uses_table_names_not_display_names() {
        assert_eq!(handler_tag(Topic::UnitEvent), "unit_event");
        assert_eq!(handler_tag(Topic::ConsoleLog), "console");
    }
}
