// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The target partition for a time-partitioned table does not exist
    /// yet. Callers retry once after the scheduler creates it on demand.
    #[error("no partition for timestamp {0}")]
    NoPartition(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}
