// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The sync engine: executor, event processor, manual triggers, and the
//! specification lifecycle handler.

pub mod active;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod lifecycle;
pub mod processor;
mod regex_sync;
pub mod sinks;
pub mod trigger;

pub use active::ActiveSyncs;
pub use error::{Result, SyncError};
pub use executor::{SyncClients, SyncExecutor};
pub use jobs::{build_sync_jobs, needs_sync, SyncJob};
pub use lifecycle::LifecycleHandler;
pub use processor::{EventProcessor, DEFAULT_NUM_SUBSCRIPTIONS, DEFAULT_WORKER_POOL_SIZE};
pub use sinks::{
	EventSeverity, EventSink, MemoryEventSink, MemoryStatusSink, RecordedEvent, SinkError,
	StatusSink, SyncStatus,
};
pub use trigger::manual_trigger;
