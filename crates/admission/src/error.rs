// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Failures surfaced through the admission future.
///
/// Cloneable so that a single broken reason can complete every pending
/// waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdmissionError {
    /// The wait entry's deadline elapsed before admission.
    #[error("semaphore {semaphore}: admission timed out")]
    Timeout { semaphore: String },

    /// Enqueueing would exceed the semaphore's wait-queue cap.
    #[error("semaphore {semaphore}: wait queue overloaded (max queue length {max_queue_length})")]
    QueueOverload {
        semaphore: String,
        max_queue_length: usize,
    },

    /// The semaphore entered its terminal broken state; all pending and
    /// future admissions fail.
    #[error("semaphore {semaphore} broken: {}", .reason.as_deref().unwrap_or("no longer admitting reads"))]
    Broken {
        semaphore: String,
        reason: Option<String>,
    },
}
