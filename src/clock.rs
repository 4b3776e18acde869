// This file is part of sensorcrypt-bridge.
//
// Copyright 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Mockable source of wall time for the moving-average window algorithm.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as seconds since the Unix epoch.
///
/// Kept as a narrow trait (rather than calling [`SystemTime::now`] directly
/// from [`crate::window`]) so tests can drive the moving-average algorithm
/// deterministically (§8, property 6).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> i64;
}

/// The real clock, backed by the system's monotonic wall time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs() as i64
    }
}

/// A clock that only advances when told to, for deterministic tests.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Mutex<i64>,
}

impl MockClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        *self.now.lock().expect("mock clock mutex poisoned") = now;
    }

    pub fn advance(&self, delta: i64) {
        let mut guard = self.now.lock().expect("mock clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for MockClock {
    fn now(&self) -> i64 {
        *self.now.lock().expect("mock clock mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::new(100);
        assert_eq!(clock.now(), 100);

        clock.advance(50);
        assert_eq!(clock.now(), 150);

        clock.set(0);
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn system_clock_is_plausible() {
        let clock = SystemClock;
        // Later than this spec was written, earlier than the heat death of the universe.
        assert!(clock.now() > 1_700_000_000);
    }
}
