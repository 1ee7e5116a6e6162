// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, trace};

use crate::config::SemaphoreConfig;
use crate::diagnostics;
use crate::error::AdmissionError;
use crate::inactive::{
    EvictReason, EvictableRead, EvictionNotify, InactiveEntry, InactiveReadHandle,
    InactiveRegistry,
};
use crate::metric_definitions::{
    ADMISSIONS_IMMEDIATE, ADMISSIONS_QUEUED, INACTIVE_READS_REGISTERED, INACTIVE_READS_REJECTED,
    READS_EVICTED, READS_SHED, REASON_LABEL, SEMAPHORE_LABEL, WAITERS,
};
use crate::permit::{PermitEntry, PermitState, ReadPermit, ResourceUnits, TableSchema};
use crate::resources::ReadResources;
use crate::wait_queue::{AdmissionResult, WaitEntry, WaitQueue};

/// Callback invoked just before an admission is rejected due to queue
/// overflow; hosts use it to flush counters or dump extra context.
pub type PrethrowAction = Box<dyn Fn() + Send + Sync>;

/// Statistics counters of one semaphore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreStats {
    /// Reads currently parked in the eviction pool.
    pub inactive_reads: u64,
    /// Evictions performed to unblock waiters, including reads refused
    /// parking at the gate.
    pub permit_based_evictions: u64,
    /// Evictions performed because a read's time-to-live elapsed.
    pub time_based_evictions: u64,
    /// Admissions rejected because the wait queue was full.
    pub total_reads_shed_due_to_overload: u64,
    /// Reads currently waiting for admission.
    pub waiters: usize,
}

struct State {
    resources: ReadResources,
    wait_queue: WaitQueue,
    inactive: InactiveRegistry,
    permits: HashMap<u64, PermitEntry>,
    next_permit_key: u64,
    stats: SemaphoreStats,
    stopped: bool,
    broken: Option<AdmissionError>,
}

/// State shared between the semaphore and everything it handed out
/// (permits, admission futures, inactive-read handles, timer tasks).
///
/// All mutable state sits behind one mutex; the lock is never held across
/// an await point, and nothing whose drop re-enters the semaphore (permits,
/// units, readers, wait entries) is dropped while it is held.
pub(crate) struct SemaphoreShared {
    name: String,
    initial: ReadResources,
    max_queue_length: usize,
    prethrow: Option<PrethrowAction>,
    tracker: TaskTracker,
    state: Mutex<State>,
}

struct Grant {
    tx: oneshot::Sender<AdmissionResult>,
    permit: ReadPermit,
    resources: ReadResources,
}

impl SemaphoreShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Whether `requested` can be admitted right now. Special case: when no
    /// permit holds any count, the front waiter is admitted regardless of
    /// memory, so a single read larger than the pool can still make
    /// progress.
    fn has_available_units(&self, current: ReadResources, requested: &ReadResources) -> bool {
        (current.is_nonzero() && current.covers(requested)) || current.count == self.initial.count
    }

    fn update_waiters_gauge(&self, waiters: usize) {
        gauge!(WAITERS, SEMAPHORE_LABEL => self.name.clone()).set(waiters as f64);
    }

    pub(crate) fn make_permit(
        self: &Arc<Self>,
        schema: Option<Arc<TableSchema>>,
        op_name: Cow<'static, str>,
    ) -> ReadPermit {
        let key = {
            let mut st = self.state.lock();
            let key = st.next_permit_key;
            st.next_permit_key += 1;
            st.permits.insert(key, PermitEntry::new(schema, op_name));
            key
        };
        ReadPermit::new(self.clone(), key)
    }

    pub(crate) fn unlink_permit(&self, key: u64) {
        let (leaked, description) = {
            let mut st = self.state.lock();
            match st.permits.remove(&key) {
                Some(entry) if entry.consumed.is_nonzero() => {
                    (entry.consumed, entry.description())
                }
                _ => return,
            }
        };
        error!(
            "permit {description} destroyed while still holding {leaked} resources, reclaiming them"
        );
        // The entry is already unlinked, so the credit carries no permit key.
        self.do_signal(vec![(None, leaked)]);
    }

    pub(crate) fn permit_consumed(&self, key: u64) -> ReadResources {
        self.state
            .lock()
            .permits
            .get(&key)
            .expect("live permits are always registered")
            .consumed
    }

    pub(crate) fn permit_description(&self, key: u64) -> String {
        self.state
            .lock()
            .permits
            .get(&key)
            .expect("live permits are always registered")
            .description()
    }

    pub(crate) fn consume_for_permit(&self, key: u64, res: ReadResources) {
        let mut st = self.state.lock();
        if let Some(entry) = st.permits.get_mut(&key) {
            entry.consumed += res;
        }
        st.resources -= res;
    }

    pub(crate) fn signal_for_permit(&self, key: u64, res: ReadResources) {
        self.do_signal(vec![(Some(key), res)]);
    }

    pub(crate) fn consume_raw(&self, res: ReadResources) {
        self.state.lock().resources -= res;
    }

    pub(crate) fn signal_raw(&self, res: ReadResources) {
        self.do_signal(vec![(None, res)]);
    }

    /// Returns `res` credits to the pool and admits every waiter the new
    /// level covers, strictly in FIFO order.
    ///
    /// Grants are delivered outside the lock. A grant whose receiver is
    /// gone (the caller dropped the admission future) is dismantled and its
    /// credit folded back into the next round, so delivery can never
    /// recurse.
    fn do_signal(&self, mut credits: Vec<(Option<u64>, ReadResources)>) {
        while !credits.is_empty() {
            let grants = {
                let mut st = self.state.lock();
                for (key, res) in credits.drain(..) {
                    if let Some(key) = key {
                        if let Some(entry) = st.permits.get_mut(&key) {
                            entry.consumed -= res;
                        }
                    }
                    st.resources += res;
                }
                let grants = self.drain_admissible(&mut st);
                if !grants.is_empty() {
                    self.update_waiters_gauge(st.wait_queue.len());
                }
                grants
            };
            for grant in grants {
                let units = ResourceUnits::preaccounted(grant.permit, grant.resources);
                if let Err(Ok(units)) = grant.tx.send(Ok(units)) {
                    credits.push((Some(units.permit().key()), units.dismantle()));
                }
            }
        }
    }

    fn drain_admissible(&self, st: &mut State) -> Vec<Grant> {
        let mut grants = Vec::new();
        while let Some(requested) = st.wait_queue.front_requested() {
            if !self.has_available_units(st.resources, &requested) {
                break;
            }
            let entry = st
                .wait_queue
                .pop_front()
                .expect("front_requested guarantees a front entry");
            let (tx, permit, requested) = entry.complete();
            if let Some(permit_entry) = st.permits.get_mut(&permit.key()) {
                permit_entry.state = PermitState::Active;
                permit_entry.consumed += requested;
            }
            st.resources -= requested;
            grants.push(Grant {
                tx,
                permit,
                resources: requested,
            });
        }
        grants
    }

    pub(crate) fn do_wait_admission(
        self: &Arc<Self>,
        permit: &ReadPermit,
        memory: u64,
        deadline: Option<Instant>,
    ) -> Admission {
        let requested = ReadResources::new(1, memory as i64);

        let (id, kick_eviction, rx) = {
            let mut st = self.state.lock();

            if let Some(broken) = &st.broken {
                return Admission::ready(Err(broken.clone()));
            }

            let first = st.wait_queue.is_empty();
            if first && self.has_available_units(st.resources, &requested) {
                if let Some(entry) = st.permits.get_mut(&permit.key()) {
                    entry.state = PermitState::Active;
                    entry.consumed += requested;
                }
                st.resources -= requested;
                drop(st);
                counter!(ADMISSIONS_IMMEDIATE, SEMAPHORE_LABEL => self.name.clone()).increment(1);
                return Admission::ready(Ok(ResourceUnits::preaccounted(
                    permit.clone(),
                    requested,
                )));
            }

            if st.wait_queue.len() >= self.max_queue_length {
                st.stats.total_reads_shed_due_to_overload += 1;
                let dump = self.render_internal_dump(&st, "wait queue overloaded");
                drop(st);
                counter!(READS_SHED, SEMAPHORE_LABEL => self.name.clone()).increment(1);
                if let Some(prethrow) = &self.prethrow {
                    prethrow();
                }
                if let Some(dump) = dump {
                    info!("{dump}");
                }
                return Admission::ready(Err(AdmissionError::QueueOverload {
                    semaphore: self.name.clone(),
                    max_queue_length: self.max_queue_length,
                }));
            }

            let (tx, rx) = oneshot::channel();
            if let Some(entry) = st.permits.get_mut(&permit.key()) {
                entry.state = PermitState::Waiting;
            }
            let id = st
                .wait_queue
                .push_back(WaitEntry::new(tx, permit.clone(), requested));
            self.update_waiters_gauge(st.wait_queue.len());
            (id, first && !st.inactive.is_empty(), rx)
        };
        counter!(ADMISSIONS_QUEUED, SEMAPHORE_LABEL => self.name.clone()).increment(1);

        if let Some(deadline) = deadline {
            let timer = tokio::spawn({
                let shared = self.clone();
                async move {
                    tokio::time::sleep_until(deadline).await;
                    shared.expire_waiter(id);
                }
            })
            .abort_handle();
            if !self.state.lock().wait_queue.set_expiry(id, timer.clone()) {
                timer.abort();
            }
        }

        if kick_eviction {
            self.evict_readers_in_background();
        }

        Admission::waiting(rx, self.name.clone())
    }

    fn expire_waiter(&self, id: u64) {
        let (entry, dump) = {
            let mut st = self.state.lock();
            let entry = st.wait_queue.remove(id);
            let dump = if entry.is_some() {
                self.update_waiters_gauge(st.wait_queue.len());
                self.render_internal_dump(&st, "timed out")
            } else {
                None
            };
            (entry, dump)
        };
        let Some(entry) = entry else {
            return;
        };
        let (tx, _permit, _) = entry.complete();
        let _ = tx.send(Err(AdmissionError::Timeout {
            semaphore: self.name.clone(),
        }));
        if let Some(dump) = dump {
            info!("{dump}");
        }
    }

    /// Cooperative eviction under admission pressure: while the wait list
    /// and the inactive list are both nonempty, close the oldest inactive
    /// read. The task itself never signals; each reader's close releases
    /// its permit's resources, which re-enters `signal` and may admit
    /// waiters.
    fn evict_readers_in_background(self: &Arc<Self>) {
        let shared = self.clone();
        self.tracker.spawn(async move {
            loop {
                let entry = {
                    let mut st = shared.state.lock();
                    if st.wait_queue.is_empty() {
                        None
                    } else {
                        match st.inactive.front_id() {
                            Some(id) => {
                                let entry = Self::detach_locked(&mut st, id);
                                if entry.is_some() {
                                    st.stats.permit_based_evictions += 1;
                                }
                                entry
                            }
                            None => None,
                        }
                    }
                };
                let Some(entry) = entry else {
                    break;
                };
                counter!(
                    READS_EVICTED,
                    SEMAPHORE_LABEL => shared.name.clone(),
                    REASON_LABEL => EvictReason::Permit.as_static_str()
                )
                .increment(1);
                if let Some(notify) = entry.notify {
                    notify(EvictReason::Permit);
                }
                entry.reader.close().await;
            }
        });
    }

    /// Removes an inactive entry and keeps the `inactive_reads` gauge
    /// truthful. Eviction-reason counters are the caller's business.
    fn detach_locked(st: &mut State, id: u64) -> Option<InactiveEntry> {
        let entry = st.inactive.remove(id)?;
        entry.abort_ttl();
        st.stats.inactive_reads -= 1;
        Some(entry)
    }

    pub(crate) fn register_inactive_read(
        self: &Arc<Self>,
        reader: Box<dyn EvictableRead>,
    ) -> InactiveReadHandle {
        // Registration is best-effort: parking is only possible while no
        // waiter is pending and some memory is left. The wait queue covers
        // the count dimension, so memory is checked separately.
        {
            let mut st = self.state.lock();
            if st.wait_queue.is_empty() && st.resources.memory > 0 {
                let key = reader.permit().key();
                if let Some(entry) = st.permits.get_mut(&key) {
                    entry.state = PermitState::Inactive;
                }
                let id = st.inactive.insert(InactiveEntry::new(reader));
                st.stats.inactive_reads += 1;
                drop(st);
                trace!(id, "parked inactive read");
                counter!(INACTIVE_READS_REGISTERED, SEMAPHORE_LABEL => self.name.clone())
                    .increment(1);
                return InactiveReadHandle::linked(self.clone(), id);
            }
            st.stats.permit_based_evictions += 1;
        }
        counter!(INACTIVE_READS_REJECTED, SEMAPHORE_LABEL => self.name.clone()).increment(1);
        self.close_reader(reader);
        InactiveReadHandle::empty(self.clone())
    }

    pub(crate) fn set_notify_handler(
        self: &Arc<Self>,
        handle: &InactiveReadHandle,
        notify: EvictionNotify,
        ttl: Option<Duration>,
    ) {
        let Some(id) = handle.id else {
            return;
        };
        let mut st = self.state.lock();
        let Some(entry) = st.inactive.get_mut(id) else {
            return;
        };
        entry.notify = Some(notify);
        if let Some(ttl) = ttl {
            let shared = self.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                shared.evict_by_id(id, EvictReason::Time);
            })
            .abort_handle();
            entry.ttl_timer = Some(timer);
        }
    }

    pub(crate) fn evict_by_id(&self, id: u64, reason: EvictReason) -> bool {
        let entry = {
            let mut st = self.state.lock();
            let Some(entry) = Self::detach_locked(&mut st, id) else {
                return false;
            };
            match reason {
                EvictReason::Permit => st.stats.permit_based_evictions += 1,
                EvictReason::Time => st.stats.time_based_evictions += 1,
                EvictReason::Manual => {}
            }
            entry
        };
        trace!(id, %reason, "evicting inactive read");
        counter!(
            READS_EVICTED,
            SEMAPHORE_LABEL => self.name.clone(),
            REASON_LABEL => reason.as_static_str()
        )
        .increment(1);
        if let Some(notify) = entry.notify {
            notify(reason);
        }
        self.close_reader(entry.reader);
        true
    }

    pub(crate) fn try_evict_one_inactive_read(&self, reason: EvictReason) -> bool {
        let front = self.state.lock().inactive.front_id();
        match front {
            Some(id) => self.evict_by_id(id, reason),
            None => false,
        }
    }

    pub(crate) fn clear_inactive_reads(&self) {
        // Clearing is not an eviction: handlers are not notified and the
        // eviction counters stay untouched.
        loop {
            let entry = {
                let mut st = self.state.lock();
                match st.inactive.front_id() {
                    Some(id) => Self::detach_locked(&mut st, id),
                    None => None,
                }
            };
            let Some(entry) = entry else {
                break;
            };
            self.close_reader(entry.reader);
        }
    }

    pub(crate) fn abandon_inactive_read(&self, id: u64) {
        let entry = {
            let mut st = self.state.lock();
            Self::detach_locked(&mut st, id)
        };
        if let Some(entry) = entry {
            self.close_reader(entry.reader);
        }
    }

    pub(crate) fn inactive_contains(&self, id: u64) -> bool {
        self.state.lock().inactive.contains(id)
    }

    pub(crate) fn take_inactive(&self, id: u64) -> Option<InactiveEntry> {
        let mut st = self.state.lock();
        Self::detach_locked(&mut st, id)
    }

    /// Pushes a reader's asynchronous close through the closing-gate, so
    /// `stop()` can await it. Must run within a tokio runtime.
    pub(crate) fn close_reader(&self, reader: Box<dyn EvictableRead>) {
        self.tracker.spawn(reader.close());
    }

    fn broken_impl(&self, reason: Option<String>) {
        let (entries, err) = {
            let mut st = self.state.lock();
            let err = st
                .broken
                .get_or_insert_with(|| AdmissionError::Broken {
                    semaphore: self.name.clone(),
                    reason,
                })
                .clone();
            let entries = st.wait_queue.drain();
            if !entries.is_empty() {
                self.update_waiters_gauge(0);
            }
            (entries, err)
        };
        for entry in entries {
            let (tx, _permit, _) = entry.complete();
            let _ = tx.send(Err(err.clone()));
        }
    }

    fn render_internal_dump(&self, st: &State, problem: &str) -> Option<String> {
        diagnostics::internal_dump_permitted().then(|| {
            diagnostics::render_permit_dump(
                &self.name,
                self.initial,
                st.resources,
                &st.permits,
                problem,
                20,
            )
        })
    }
}

/// Admission gate over a `(count, memory)` resource vector with a FIFO wait
/// queue, per-waiter deadlines, a cap on queue length and a terminal broken
/// state.
///
/// One instance guards the read concurrency of one storage shard. Permits
/// account what each read consumes; readers that temporarily step aside
/// register in the inactive pool, from which the semaphore evicts under
/// admission pressure, on TTL expiry, or on demand.
///
/// `stop()` must be called (and awaited) before the semaphore is dropped.
pub struct ReaderSemaphore {
    shared: Arc<SemaphoreShared>,
}

impl ReaderSemaphore {
    /// Semaphore with `count` reader slots and `memory` bytes of buffer
    /// budget, and no cap on the wait queue.
    pub fn new(count: i32, memory: i64, name: impl Into<String>) -> Self {
        Self::with_queue_limit(count, memory, name, usize::MAX, None)
    }

    pub fn with_queue_limit(
        count: i32,
        memory: i64,
        name: impl Into<String>,
        max_queue_length: usize,
        prethrow: Option<PrethrowAction>,
    ) -> Self {
        let initial = ReadResources::new(count, memory);
        Self {
            shared: Arc::new(SemaphoreShared {
                name: name.into(),
                initial,
                max_queue_length,
                prethrow,
                tracker: TaskTracker::new(),
                state: Mutex::new(State {
                    resources: initial,
                    wait_queue: WaitQueue::default(),
                    inactive: InactiveRegistry::default(),
                    permits: HashMap::new(),
                    next_permit_key: 0,
                    stats: SemaphoreStats::default(),
                    stopped: false,
                    broken: None,
                }),
            }),
        }
    }

    /// Both resources at the type maximum; used in tests.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(i32::MAX, i64::MAX, name)
    }

    pub fn from_config(config: &SemaphoreConfig, name: impl Into<String>) -> Self {
        Self::with_queue_limit(
            config.concurrent_reads,
            config.memory,
            name,
            config.max_queue_length.unwrap_or(usize::MAX),
            None,
        )
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn make_permit(
        &self,
        schema: Option<Arc<TableSchema>>,
        op_name: impl Into<Cow<'static, str>>,
    ) -> ReadPermit {
        self.shared.make_permit(schema, op_name.into())
    }

    /// Parks a reader in the eviction pool, freeing its count credit while
    /// it retains its memory footprint.
    ///
    /// Best-effort: while any waiter is pending or the memory pool is
    /// exhausted the reader is not parked but closed asynchronously, which
    /// counts as an immediate permit-based eviction, and the returned
    /// handle is unlinked.
    pub fn register_inactive_read(&self, reader: impl EvictableRead) -> InactiveReadHandle {
        self.shared.register_inactive_read(Box::new(reader))
    }

    /// Attaches an eviction-notify callback and optionally a time-to-live
    /// to a parked read. Elapsing TTL evicts with [`EvictReason::Time`].
    ///
    /// No-op on an unlinked handle. A panicking callback propagates.
    pub fn set_notify_handler(
        &self,
        handle: &InactiveReadHandle,
        notify: impl FnOnce(EvictReason) + Send + 'static,
        ttl: Option<Duration>,
    ) {
        handle
            .shared
            .set_notify_handler(handle, Box::new(notify), ttl);
    }

    /// Retrieves a parked reader, transitioning its permit back to active.
    /// Returns `None` if the handle is unlinked (the read was evicted,
    /// cleared, or never parked).
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different semaphore; the reader
    /// is first closed against its owning semaphore so nothing leaks.
    pub fn unregister_inactive_read(
        &self,
        handle: InactiveReadHandle,
    ) -> Option<Box<dyn EvictableRead>> {
        let mut handle = handle;
        let id = handle.id.take()?;
        if !Arc::ptr_eq(&handle.shared, &self.shared) {
            if let Some(entry) = handle.shared.take_inactive(id) {
                handle.shared.close_reader(entry.reader);
            }
            panic!(
                "unregister_inactive_read(): handle belongs to semaphore {}, not {}",
                handle.shared.name(),
                self.shared.name(),
            );
        }
        let reader = {
            let mut st = self.shared.state.lock();
            let entry = SemaphoreShared::detach_locked(&mut st, id)?;
            let key = entry.reader.permit().key();
            if let Some(permit_entry) = st.permits.get_mut(&key) {
                permit_entry.state = PermitState::Active;
            }
            entry.reader
        };
        Some(reader)
    }

    /// Evicts the oldest inactive read, if any.
    pub fn try_evict_one_inactive_read(&self, reason: EvictReason) -> bool {
        self.shared.try_evict_one_inactive_read(reason)
    }

    /// Closes every parked reader asynchronously. Notify handlers are not
    /// invoked and the eviction counters stay untouched.
    pub fn clear_inactive_reads(&self) {
        self.shared.clear_inactive_reads();
    }

    /// Shuts the semaphore down: clears inactive reads, awaits every
    /// pending reader close, then breaks the wait queue terminally.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    #[instrument(level = "debug", skip_all, fields(semaphore = %self.shared.name()))]
    pub async fn stop(&self) {
        {
            let mut st = self.shared.state.lock();
            assert!(
                !st.stopped,
                "semaphore {}: stop() called twice",
                self.shared.name()
            );
            st.stopped = true;
        }
        self.shared.clear_inactive_reads();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        self.shared
            .broken_impl(Some(format!("{} was stopped", self.shared.name())));
    }

    /// Enters the terminal broken state: every pending waiter fails with
    /// `reason` and every future admission fails immediately. Idempotent;
    /// the first reason wins.
    pub fn broken(&self, reason: Option<String>) {
        self.shared.broken_impl(reason);
    }

    /// Renders the grouped permit dump, up to `max_lines` data rows
    /// (0 = unlimited).
    pub fn dump_diagnostics(&self, max_lines: usize) -> String {
        let st = self.shared.state.lock();
        diagnostics::render_permit_dump(
            self.shared.name(),
            self.shared.initial,
            st.resources,
            &st.permits,
            "user request",
            max_lines,
        )
    }

    pub fn initial_resources(&self) -> ReadResources {
        self.shared.initial
    }

    pub fn available_resources(&self) -> ReadResources {
        self.shared.state.lock().resources
    }

    /// Debits the pool directly, without touching any permit.
    pub fn consume(&self, res: ReadResources) {
        self.shared.consume_raw(res);
    }

    /// Credits the pool directly and admits whatever now fits.
    pub fn signal(&self, res: ReadResources) {
        self.shared.signal_raw(res);
    }

    pub fn waiters(&self) -> usize {
        self.shared.state.lock().wait_queue.len()
    }

    pub fn stats(&self) -> SemaphoreStats {
        let st = self.shared.state.lock();
        let mut stats = st.stats;
        stats.waiters = st.wait_queue.len();
        stats
    }
}

impl Drop for ReaderSemaphore {
    fn drop(&mut self) {
        {
            let st = self.shared.state.lock();
            assert!(
                st.inactive.is_empty(),
                "semaphore {} dropped with parked readers, stop() it first",
                self.shared.name()
            );
        }
        assert!(
            self.shared.tracker.is_empty(),
            "semaphore {} dropped with pending reader-close tasks, stop() it first",
            self.shared.name()
        );
        self.shared.broken_impl(None);
    }
}

/// Future returned by [`ReadPermit::wait_admission`].
///
/// The waiter is already registered when this is handed out; dropping the
/// future does not dequeue it (the entry lives until admission, deadline or
/// broken), but a grant delivered to a dropped future is returned to the
/// pool.
#[must_use = "futures do nothing unless awaited"]
pub struct Admission {
    state: AdmissionState,
}

enum AdmissionState {
    Ready(Option<AdmissionResult>),
    Waiting {
        rx: oneshot::Receiver<AdmissionResult>,
        semaphore: String,
    },
}

impl Admission {
    fn ready(result: AdmissionResult) -> Self {
        Self {
            state: AdmissionState::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<AdmissionResult>, semaphore: String) -> Self {
        Self {
            state: AdmissionState::Waiting { rx, semaphore },
        }
    }
}

impl Future for Admission {
    type Output = AdmissionResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            AdmissionState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .expect("admission future polled after completion"),
            ),
            AdmissionState::Waiting { rx, semaphore } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // The semaphore went away with the entry still queued.
                Poll::Ready(Err(_)) => Poll::Ready(Err(AdmissionError::Broken {
                    semaphore: std::mem::take(semaphore),
                    reason: None,
                })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
