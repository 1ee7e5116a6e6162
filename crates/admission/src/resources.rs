// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Resource footprint of a read: one slot in the concurrency count and a
/// number of bytes attributable to its buffers.
///
/// Memory is signed: buffer acquisitions may overshoot the pool, and the
/// special-admission rule lets a single read overdraw it entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadResources {
    pub count: i32,
    pub memory: i64,
}

impl ReadResources {
    pub const fn new(count: i32, memory: i64) -> Self {
        Self { count, memory }
    }

    pub const fn with_memory(memory: i64) -> Self {
        Self { count: 0, memory }
    }

    /// Component-wise `>=`: whether a request `r` fits into what's left.
    pub fn covers(&self, r: &ReadResources) -> bool {
        self.count >= r.count && self.memory >= r.memory
    }

    pub fn is_nonzero(&self) -> bool {
        self.count != 0 || self.memory != 0
    }
}

impl AddAssign for ReadResources {
    fn add_assign(&mut self, rhs: Self) {
        self.count = self.count.saturating_add(rhs.count);
        self.memory = self.memory.saturating_add(rhs.memory);
    }
}

impl SubAssign for ReadResources {
    fn sub_assign(&mut self, rhs: Self) {
        self.count = self.count.saturating_sub(rhs.count);
        self.memory = self.memory.saturating_sub(rhs.memory);
    }
}

impl Add for ReadResources {
    type Output = ReadResources;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sub for ReadResources {
    type Output = ReadResources;

    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

impl fmt::Display for ReadResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{count={}, memory={}}}", self.count, self.memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_wise_arithmetic() {
        let mut r = ReadResources::new(2, 1024);
        r += ReadResources::new(1, 512);
        assert_eq!(r, ReadResources::new(3, 1536));
        r -= ReadResources::new(3, 2048);
        assert_eq!(r, ReadResources::new(0, -512));
    }

    #[test]
    fn saturates_at_type_bounds() {
        let mut r = ReadResources::new(i32::MAX, i64::MAX);
        r += ReadResources::new(1, 1);
        assert_eq!(r, ReadResources::new(i32::MAX, i64::MAX));
        let mut r = ReadResources::new(i32::MIN, i64::MIN);
        r -= ReadResources::new(1, 1);
        assert_eq!(r, ReadResources::new(i32::MIN, i64::MIN));
    }

    #[test]
    fn covers_is_component_wise() {
        let pool = ReadResources::new(1, 100);
        assert!(pool.covers(&ReadResources::new(1, 100)));
        assert!(!pool.covers(&ReadResources::new(2, 0)));
        assert!(!pool.covers(&ReadResources::new(0, 101)));
        // A negative pool covers nothing with a positive request.
        assert!(!ReadResources::new(1, -1).covers(&ReadResources::new(1, 0)));
    }

    #[test]
    fn nonzero() {
        assert!(!ReadResources::default().is_nonzero());
        assert!(ReadResources::new(0, -1).is_nonzero());
        assert!(ReadResources::new(1, 0).is_nonzero());
    }
}
