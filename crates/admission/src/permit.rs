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
use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use crate::resources::ReadResources;
use crate::semaphore::{Admission, SemaphoreShared};

/// Lifecycle state of a permit, as reported in diagnostics dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermitState {
    /// Enqueued, waiting for admission.
    Waiting,
    /// Admitted, or never gated through admission.
    Active,
    /// The associated reader is parked in the eviction pool.
    Inactive,
}

impl fmt::Display for PermitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermitState::Waiting => "waiting",
            PermitState::Active => "active",
            PermitState::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

/// Opaque schema identity, used only to label permits in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSchema {
    keyspace: String,
    table: String,
}

impl TableSchema {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Registry-side state of one permit, owned by the semaphore.
pub(crate) struct PermitEntry {
    pub(crate) schema: Option<Arc<TableSchema>>,
    pub(crate) op_name: Cow<'static, str>,
    pub(crate) consumed: ReadResources,
    pub(crate) state: PermitState,
}

impl PermitEntry {
    pub(crate) fn new(schema: Option<Arc<TableSchema>>, op_name: Cow<'static, str>) -> Self {
        Self {
            schema,
            op_name,
            consumed: ReadResources::default(),
            state: PermitState::Active,
        }
    }

    pub(crate) fn description(&self) -> String {
        format!(
            "{}.{}:{}",
            self.schema.as_deref().map_or("*", TableSchema::keyspace),
            self.schema.as_deref().map_or("*", TableSchema::table),
            self.op_name,
        )
    }
}

struct PermitInner {
    shared: Arc<SemaphoreShared>,
    key: u64,
}

impl Drop for PermitInner {
    fn drop(&mut self) {
        // Unlinks the registry entry; leftover consumed resources are
        // reclaimed there (a detected leak, logged but non-fatal).
        self.shared.unlink_permit(self.key);
    }
}

/// Per-operation resource accounting handle.
///
/// Cheap to clone; all clones refer to the same registry entry inside the
/// issuing semaphore. The entry is unlinked when the last clone drops.
#[derive(Clone)]
pub struct ReadPermit {
    inner: Arc<PermitInner>,
}

impl ReadPermit {
    pub(crate) fn new(shared: Arc<SemaphoreShared>, key: u64) -> Self {
        Self {
            inner: Arc::new(PermitInner { shared, key }),
        }
    }

    pub(crate) fn key(&self) -> u64 {
        self.inner.key
    }

    pub(crate) fn same_permit(a: &ReadPermit, b: &ReadPermit) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Wait until the semaphore admits this permit with one count unit and
    /// `memory` bytes. `deadline: None` waits forever.
    ///
    /// The waiter is registered (or admitted, or shed) at call time; the
    /// returned future only delivers the outcome.
    pub fn wait_admission(&self, memory: u64, deadline: Option<Instant>) -> Admission {
        SemaphoreShared::do_wait_admission(&self.inner.shared, self, memory, deadline)
    }

    /// Allocate `memory` bytes against this permit, bypassing admission.
    pub fn consume_memory(&self, memory: u64) -> ResourceUnits {
        self.consume_resources(ReadResources::with_memory(memory as i64))
    }

    /// Allocate `res` against this permit, bypassing admission.
    pub fn consume_resources(&self, res: ReadResources) -> ResourceUnits {
        ResourceUnits::new(self.clone(), res)
    }

    /// Sum of the resources currently held by units of this permit.
    pub fn consumed_resources(&self) -> ReadResources {
        self.inner.shared.permit_consumed(self.inner.key)
    }

    /// `"{keyspace}.{table}:{op}"`, with `"*"` for absent schema parts.
    pub fn description(&self) -> String {
        self.inner.shared.permit_description(self.inner.key)
    }

    pub(crate) fn consume(&self, res: ReadResources) {
        self.inner.shared.consume_for_permit(self.inner.key, res);
    }

    pub(crate) fn signal(&self, res: ReadResources) {
        self.inner.shared.signal_for_permit(self.inner.key, res);
    }
}

impl fmt::Debug for ReadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPermit")
            .field("description", &self.description())
            .field("consumed", &self.consumed_resources())
            .finish()
    }
}

/// Owns a delta of resources consumed against a permit and guarantees its
/// release on every exit path.
///
/// Construction consumes the delta exactly once; drop releases whatever is
/// currently held exactly once. The admission path hands these out with the
/// accounting already applied.
#[must_use]
pub struct ResourceUnits {
    permit: ReadPermit,
    resources: ReadResources,
}

impl ResourceUnits {
    pub(crate) fn new(permit: ReadPermit, res: ReadResources) -> Self {
        permit.consume(res);
        Self {
            permit,
            resources: res,
        }
    }

    /// Grant path: the semaphore already debited `res` under its lock.
    pub(crate) fn preaccounted(permit: ReadPermit, res: ReadResources) -> Self {
        Self {
            permit,
            resources: res,
        }
    }

    /// Release the currently held delta and atomically (on the accounting
    /// side) acquire `res` instead. Consume-then-signal order, so no net
    /// credit window opens.
    pub fn reset(&mut self, res: ReadResources) {
        self.permit.consume(res);
        if self.resources.is_nonzero() {
            self.permit.signal(self.resources);
        }
        self.resources = res;
    }

    /// Merge another units object of the same permit into this one, without
    /// re-accounting.
    ///
    /// # Panics
    ///
    /// Panics if `other` belongs to a different permit.
    pub fn add(&mut self, mut other: ResourceUnits) {
        assert!(
            ReadPermit::same_permit(&self.permit, &other.permit),
            "cannot merge resource units of different permits"
        );
        self.resources += std::mem::take(&mut other.resources);
    }

    pub fn resources(&self) -> ReadResources {
        self.resources
    }

    pub fn permit(&self) -> &ReadPermit {
        &self.permit
    }

    /// Take the held delta out without releasing it; used when a grant
    /// could not be delivered and its credit is folded back into the pool.
    pub(crate) fn dismantle(mut self) -> ReadResources {
        std::mem::take(&mut self.resources)
    }
}

impl Drop for ResourceUnits {
    fn drop(&mut self) {
        if self.resources.is_nonzero() {
            self.permit.signal(std::mem::take(&mut self.resources));
        }
    }
}

impl fmt::Debug for ResourceUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceUnits")
            .field("resources", &self.resources)
            .finish()
    }
}
