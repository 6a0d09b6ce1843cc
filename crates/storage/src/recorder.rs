// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recorder state snapshots, batched through the recorder [`crate::batch::BatchWriter`].

use relay_core::domain::{InstanceId, SystemId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderSnapshot {
    pub instance_id: InstanceId,
    pub system_id: Option<SystemId>,
    pub recorder_num: u32,
    pub rec_type: String,
    pub freq: Option<u64>,
    pub squelched: bool,
    pub recording: bool,
    pub time_ms: u64,
}
