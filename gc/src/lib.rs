/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! Unreferenced-File/Blob reclamation (spec.md §4.5): a process-wide
//! reader-writer lease shared with mutating RPCs, an in-memory-vs-batched
//! sweep strategy chosen by File-row count, and CI run log retention.

mod collector;
mod error;
mod lock;
mod triggers;

pub use collector::{
    GarbageCollector, GcReport, DEFAULT_CI_RUN_RETENTION_HOURS, DEFAULT_GC_MEMORY_THRESHOLD,
};
pub use error::GcError;
pub use lock::GcLock;
pub use triggers::spawn_daily_trigger;
