// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{Unit, describe_counter, describe_gauge};

pub const ADMISSIONS_IMMEDIATE: &str = "readgate.semaphore.admitted_immediately.total";
pub const ADMISSIONS_QUEUED: &str = "readgate.semaphore.queued.total";
pub const READS_SHED: &str = "readgate.semaphore.reads_shed.total";
pub const READS_EVICTED: &str = "readgate.semaphore.reads_evicted.total";
pub const INACTIVE_READS_REGISTERED: &str = "readgate.semaphore.inactive_reads_registered.total";
pub const INACTIVE_READS_REJECTED: &str = "readgate.semaphore.inactive_reads_rejected.total";
pub const WAITERS: &str = "readgate.semaphore.waiters";

pub const SEMAPHORE_LABEL: &str = "semaphore";
pub const REASON_LABEL: &str = "reason";

pub fn describe_metrics() {
    describe_counter!(
        ADMISSIONS_IMMEDIATE,
        Unit::Count,
        "Number of reads admitted without waiting"
    );

    describe_counter!(
        ADMISSIONS_QUEUED,
        Unit::Count,
        "Number of reads enqueued behind the admission gate"
    );

    describe_counter!(
        READS_SHED,
        Unit::Count,
        "Number of reads rejected because the wait queue was full"
    );

    describe_counter!(
        READS_EVICTED,
        Unit::Count,
        "Number of inactive reads evicted, broken down by reason"
    );

    describe_counter!(
        INACTIVE_READS_REGISTERED,
        Unit::Count,
        "Number of reads parked in the eviction pool"
    );

    describe_counter!(
        INACTIVE_READS_REJECTED,
        Unit::Count,
        "Number of reads refused parking and closed at the gate"
    );

    describe_gauge!(
        WAITERS,
        Unit::Count,
        "Number of reads currently waiting for admission"
    );
}
