// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain entities: the things the ingest pipeline resolves, tracks, and persists.

pub mod active_call;
pub mod affiliation;
pub mod call;
pub mod dedup;
pub mod instance;
pub mod raw_message;
pub mod site;
pub mod system;
pub mod talkgroup;
pub mod unit;

pub use active_call::{ActiveCallEntry, FUZZY_MATCH_WINDOW_MS};
pub use affiliation::{Affiliation, AffiliationKey};
pub use call::{Call, CallId, CallSourceEntry, CallStatus, Source};
pub use dedup::UnitEventDedupKey;
pub use instance::{ConnectionStatus, Instance, InstanceId};
pub use raw_message::{RawMessage, Topic};
pub use site::{Site, SiteId};
pub use system::{System, SystemId, SystemKind};
pub use talkgroup::{Talkgroup, TalkgroupId, Tgid};
pub use unit::{Unit, UnitEventKind, UnitId, UnitNum};
