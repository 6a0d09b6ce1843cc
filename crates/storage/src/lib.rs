// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage boundary and its in-process reference implementation.

pub mod batch;
pub mod error;
pub mod mem_store;
pub mod recorder;
pub mod store;
pub mod wal;

pub use batch::{spawn as spawn_batch_writer, BatchWriterConfig, BatchWriterHandle, QueueFull};
pub use error::StoreError;
pub use mem_store::{run_maintenance, MemStore};
pub use recorder::RecorderSnapshot;
pub use store::{
    CallEndParams, CallStartParams, IdentityCacheRow, MaintenanceReport, Store,
    TrunkingMessageRow, UnitEventRow,
};
pub use wal::{Wal, WalEntry, WalError};
