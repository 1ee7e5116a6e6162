// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::AdmissionError;
use crate::permit::{ReadPermit, ResourceUnits};
use crate::resources::ReadResources;

pub(crate) type AdmissionResult = Result<ResourceUnits, AdmissionError>;

pub(crate) struct WaitEntry {
    pub(crate) tx: oneshot::Sender<AdmissionResult>,
    pub(crate) permit: ReadPermit,
    pub(crate) requested: ReadResources,
    expiry: Option<AbortHandle>,
}

impl WaitEntry {
    pub(crate) fn new(
        tx: oneshot::Sender<AdmissionResult>,
        permit: ReadPermit,
        requested: ReadResources,
    ) -> Self {
        Self {
            tx,
            permit,
            requested,
            expiry: None,
        }
    }

    pub(crate) fn abort_expiry(&self) {
        if let Some(timer) = &self.expiry {
            timer.abort();
        }
    }

    /// Aborts the expiry timer and decomposes the entry for completion.
    pub(crate) fn complete(
        self,
    ) -> (
        oneshot::Sender<AdmissionResult>,
        ReadPermit,
        ReadResources,
    ) {
        self.abort_expiry();
        (self.tx, self.permit, self.requested)
    }
}

/// Expiring FIFO of pending admissions.
///
/// Entries are keyed by a monotonically increasing id so that expiry can
/// remove them from any position in O(1); the order ring lazily skips ids
/// that are already gone. Ids are never reused.
#[derive(Default)]
pub(crate) struct WaitQueue {
    entries: HashMap<u64, WaitEntry>,
    order: VecDeque<u64>,
    next_id: u64,
}

impl WaitQueue {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_back(&mut self, entry: WaitEntry) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        self.order.push_back(id);
        id
    }

    /// Arms the expiry timer of a still-queued entry. Returns false if the
    /// entry completed in the meantime.
    pub(crate) fn set_expiry(&mut self, id: u64, timer: AbortHandle) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.expiry = Some(timer);
                true
            }
            None => false,
        }
    }

    /// Resources requested by the oldest live entry.
    pub(crate) fn front_requested(&mut self) -> Option<ReadResources> {
        self.prune_front();
        self.order
            .front()
            .and_then(|id| self.entries.get(id))
            .map(|entry| entry.requested)
    }

    pub(crate) fn pop_front(&mut self) -> Option<WaitEntry> {
        self.prune_front();
        let id = self.order.pop_front()?;
        self.entries.remove(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<WaitEntry> {
        self.entries.remove(&id)
    }

    /// Removes every entry, in FIFO order.
    pub(crate) fn drain(&mut self) -> Vec<WaitEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(id) = self.order.pop_front() {
            if let Some(entry) = self.entries.remove(&id) {
                drained.push(entry);
            }
        }
        drained
    }

    fn prune_front(&mut self) {
        while let Some(id) = self.order.front() {
            if self.entries.contains_key(id) {
                break;
            }
            self.order.pop_front();
        }
    }
}
