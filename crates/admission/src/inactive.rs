// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::AbortHandle;

use crate::permit::ReadPermit;
use crate::semaphore::SemaphoreShared;

/// Why an inactive read was evicted from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EvictReason {
    /// Evicted to free resources for a pending waiter.
    Permit,
    /// The read's time-to-live elapsed.
    Time,
    /// Evicted on demand.
    Manual,
}

impl EvictReason {
    pub fn as_static_str(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

/// Callback invoked when a parked reader is evicted, with the reason.
///
/// Best-effort: the semaphore calls it after detaching the entry and before
/// closing the reader; a panicking handler propagates.
pub type EvictionNotify = Box<dyn FnOnce(EvictReason) + Send>;

/// A reader that can be parked in the semaphore's eviction pool.
///
/// The semaphore treats the reader as opaque: it only needs the permit (to
/// flip its state on registration) and an asynchronous close that releases
/// whatever the reader still holds.
pub trait EvictableRead: Send + 'static {
    fn permit(&self) -> &ReadPermit;

    /// Close the reader, releasing any resources it holds.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;

    /// Recover the concrete reader type after
    /// [`unregister_inactive_read`](crate::ReaderSemaphore::unregister_inactive_read).
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

pub(crate) struct InactiveEntry {
    pub(crate) reader: Box<dyn EvictableRead>,
    pub(crate) notify: Option<EvictionNotify>,
    pub(crate) ttl_timer: Option<AbortHandle>,
}

impl InactiveEntry {
    pub(crate) fn new(reader: Box<dyn EvictableRead>) -> Self {
        Self {
            reader,
            notify: None,
            ttl_timer: None,
        }
    }

    pub(crate) fn abort_ttl(&self) {
        if let Some(timer) = &self.ttl_timer {
            timer.abort();
        }
    }
}

/// Registry of parked readers, iterated oldest-first for eviction.
///
/// Same id-map-plus-order-ring shape as the wait queue; the monotonic id
/// doubles as the staleness token of the handles given out to callers.
#[derive(Default)]
pub(crate) struct InactiveRegistry {
    entries: HashMap<u64, InactiveEntry>,
    order: VecDeque<u64>,
    next_id: u64,
}

impl InactiveRegistry {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, entry: InactiveEntry) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        self.order.push_back(id);
        id
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut InactiveEntry> {
        self.entries.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<InactiveEntry> {
        self.entries.remove(&id)
    }

    /// Id of the oldest parked read.
    pub(crate) fn front_id(&mut self) -> Option<u64> {
        while let Some(id) = self.order.front() {
            if self.entries.contains_key(id) {
                return Some(*id);
            }
            self.order.pop_front();
        }
        None
    }
}

/// Move-only token for a parked reader.
///
/// Obtained from [`register_inactive_read`](crate::ReaderSemaphore::register_inactive_read);
/// redeemed with [`unregister_inactive_read`](crate::ReaderSemaphore::unregister_inactive_read).
/// Dropping the handle abandons the read: the reader is closed
/// asynchronously and the entry dropped. A handle goes stale when its read
/// is evicted or cleared.
pub struct InactiveReadHandle {
    pub(crate) shared: Arc<SemaphoreShared>,
    pub(crate) id: Option<u64>,
}

impl InactiveReadHandle {
    pub(crate) fn linked(shared: Arc<SemaphoreShared>, id: u64) -> Self {
        Self {
            shared,
            id: Some(id),
        }
    }

    pub(crate) fn empty(shared: Arc<SemaphoreShared>) -> Self {
        Self { shared, id: None }
    }

    /// Whether the handle still refers to a parked reader. Empty handles
    /// and handles whose read was evicted or cleared report false.
    pub fn is_linked(&self) -> bool {
        self.id.is_some_and(|id| self.shared.inactive_contains(id))
    }
}

impl Drop for InactiveReadHandle {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.shared.abandon_inactive_read(id);
        }
    }
}

impl fmt::Debug for InactiveReadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InactiveReadHandle")
            .field("semaphore", &self.shared.name())
            .field("linked", &self.is_linked())
            .finish()
    }
}
