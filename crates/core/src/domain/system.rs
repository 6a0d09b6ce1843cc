// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A logical radio system, lazily created and resolved by the Identity Resolver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal numeric identifier, assigned by the store on first sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemId(pub i64);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// System flavor, determining which identity-matching rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemKind {
    /// P25 trunked system — matched first by `(sysid, wacn)` when both are
    /// present, else by `(instance_id, name)`.
    P25Trunked { sysid: Option<u32>, wacn: Option<u32> },
    /// Conventional (non-trunked) system — matched only by `(instance_id, name)`.
    Conventional,
    /// Anything the producer reports that doesn't fit the above.
    Other(String),
}

impl SystemKind {
    /// The `(sysid, wacn)` pair this kind was observed with, if any.
    pub fn p25_identity(&self) -> Option<(u32, u32)> {
        match self {
            SystemKind::P25Trunked { sysid: Some(s), wacn: Some(w) } => Some((*s, *w)),
            _ => None,
        }
    }
}

/// A logical radio system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub short_name: String,
    pub kind: SystemKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p25_identity_requires_both_fields() {
        let both = SystemKind::P25Trunked { sysid: Some(1), wacn: Some(2) };
        assert_eq!(both.p25_identity(), Some((1, 2)));

        let partial = SystemKind::P25Trunked { sysid: Some(1), wacn: None };
        assert_eq!(partial.p25_identity(), None);

        assert_eq!(SystemKind::Conventional.p25_identity(), None);
    }
}
