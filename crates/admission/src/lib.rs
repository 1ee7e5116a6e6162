// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Admission control and resource accounting for storage-shard reads.
//!
//! Long-running reads compete for two scarce shared resources: a bounded
//! count of concurrently active readers and a bounded pool of memory
//! attributable to read buffers. [`ReaderSemaphore`] arbitrates admission
//! over that `(count, memory)` vector with a FIFO wait queue, per-waiter
//! deadlines and a cap on queue length. Each read operation accounts its
//! consumption through a [`ReadPermit`], whose [`ResourceUnits`] guards
//! guarantee release on every exit path. Readers that temporarily step
//! aside park themselves in the semaphore's eviction pool
//! ([`ReaderSemaphore::register_inactive_read`]) and are evicted to unblock
//! waiters, on TTL expiry, or on demand.
//!
//! One semaphore guards one shard; there is no cross-shard or cross-process
//! coordination.

mod config;
mod diagnostics;
mod error;
mod inactive;
pub mod metric_definitions;
mod permit;
mod resources;
mod semaphore;
mod tracking_file;
mod wait_queue;

pub use config::SemaphoreConfig;
pub use error::AdmissionError;
pub use inactive::{EvictReason, EvictableRead, EvictionNotify, InactiveReadHandle};
pub use permit::{PermitState, ReadPermit, ResourceUnits, TableSchema};
pub use resources::ReadResources;
pub use semaphore::{Admission, PrethrowAction, ReaderSemaphore, SemaphoreStats};
pub use tracking_file::{StorageFile, TrackedBuffer, TrackedFile};
