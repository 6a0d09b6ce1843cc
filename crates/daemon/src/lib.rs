// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process orchestrator: wires the dispatcher, maintenance scheduler,
//! transcription pool, and tiered audio store into a single component with
//! one inbound entry point and one shutdown sequence.

pub mod env;
pub mod lifecycle;
pub mod orchestrator;

pub use lifecycle::{DaemonConfig, LifecycleError};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
