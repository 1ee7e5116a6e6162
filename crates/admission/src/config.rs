// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// # Read admission options
///
/// Resource limits of one shard's reader-concurrency semaphore.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SemaphoreConfig {
    /// # Concurrent reads
    ///
    /// Maximum number of concurrently admitted reads on the shard.
    pub concurrent_reads: i32,

    /// # Read memory budget
    ///
    /// Memory, in bytes, attributable to read buffers on the shard.
    pub memory: i64,

    /// # Maximum queue length
    ///
    /// Cap on the admission wait queue; reads arriving beyond it are shed.
    /// Unlimited if not set.
    pub max_queue_length: Option<usize>,

    /// # Inactive read TTL
    ///
    /// How long a parked read may stay in the eviction pool before it is
    /// evicted on time. Parked reads live until evicted for resources if
    /// not set.
    #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
    pub inactive_read_ttl: Option<humantime::Duration>,
}

impl SemaphoreConfig {
    pub fn inactive_read_ttl(&self) -> Option<Duration> {
        self.inactive_read_ttl.map(Into::into)
    }
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            concurrent_reads: 100,
            memory: 128 * 1024 * 1024,
            max_queue_length: None,
            inactive_read_ttl: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_round_trips_as_human_readable() {
        let config = SemaphoreConfig {
            inactive_read_ttl: Some(Duration::from_secs(90).into()),
            ..SemaphoreConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"inactive-read-ttl\":\"1m 30s\""));
        let back: SemaphoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inactive_read_ttl(), Some(Duration::from_secs(90)));
    }
}
