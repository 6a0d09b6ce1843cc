// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Radio units and their affiliation state.

use super::system::SystemId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit/radio ID as broadcast on the air. Scoped to a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitNum(pub u32);

impl fmt::Display for UnitNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub i64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A radio unit, scoped to a system and keyed by its on-air [`UnitNum`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub system_id: SystemId,
    pub unit: UnitNum,
    pub alpha_tag: Option<String>,
}

/// Kinds of unit event reported by a trunk-recorder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitEventKind {
    On,
    Off,
    Ackresp,
    Join,
    Call,
    Data,
    End,
    Location,
}

crate::simple_display! {
    UnitEventKind {
        On => "on",
        Off => "off",
        Ackresp => "ackresp",
        Join => "join",
        Call => "call",
        Data => "data",
        End => "end",
        Location => "location",
    }
}
