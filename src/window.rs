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

//! Keyed, expiring time-series backend for the `MOVING_AVG` operator (§4.4).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::model::WindowEntry;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("window store lock poisoned")]
    Poisoned,
}

/// Compound key addressing one moving-average series (§3, "WindowEntry").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub device_token: String,
    pub sensor_id: i64,
    pub interval: i64,
}

/// Keyed ordered storage with range-by-score add/read/remove (§4.4,
/// "Backend contract"). Any implementation supporting this suffices; the
/// algorithm itself lives in [`Self::record_and_average`] so both the
/// in-memory backend and a future networked one share identical semantics.
#[async_trait]
pub trait WindowStore: Send + Sync + 'static {
    /// Inserts `WindowEntry{timestamp=now, value}` under `key`, prunes
    /// entries older than `now - interval`, and returns the arithmetic mean
    /// of what remains (§4.4, algorithm steps 2-3).
    async fn record_and_average(
        &self,
        key: &WindowKey,
        now: i64,
        value: f64,
    ) -> Result<f64, WindowError>;

    /// Returns `true` iff the backend can be reached, used by `/pulse`.
    async fn ping(&self) -> bool;
}

/// Reference backend: a map of key to a time-ordered `Vec<WindowEntry>`
/// guarded by a single `RwLock` over the whole map (§4.4, "Backend
/// contract" — chosen over a networked sorted-set store because this pack
/// carries no such client; a networked backend implements the same trait).
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    series: RwLock<HashMap<WindowKey, Vec<WindowEntry>>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn record_and_average(
        &self,
        key: &WindowKey,
        now: i64,
        value: f64,
    ) -> Result<f64, WindowError> {
        let cutoff = now - key.interval;

        let mut series = self.series.write().map_err(|_| WindowError::Poisoned)?;
        let entries = series.entry(key.clone()).or_default();

        entries.push(WindowEntry {
            timestamp: now,
            value,
        });
        entries.retain(|entry| entry.timestamp >= cutoff);

        let sum: f64 = entries.iter().map(|entry| entry.value).sum();
        Ok(sum / entries.len() as f64)
    }

    async fn ping(&self) -> bool {
        self.series.read().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};

    fn key(device_token: &str, sensor_id: i64, interval: i64) -> WindowKey {
        WindowKey {
            device_token: device_token.to_string(),
            sensor_id,
            interval,
        }
    }

    // §8, property 6 / scenario S1: 900s window, five successive samples.
    #[tokio::test]
    async fn s1_moving_average_over_900s_window() {
        let store = InMemoryWindowStore::new();
        let clock = MockClock::new(0);
        let k = key("abc123", 55, 900);

        let avg = store.record_and_average(&k, clock.now(), 4.5).await.unwrap();
        assert_eq!(avg, 4.5);

        clock.advance(300);
        let avg = store.record_and_average(&k, clock.now(), 5.5).await.unwrap();
        assert_eq!(avg, 5.0);

        clock.advance(300);
        let avg = store.record_and_average(&k, clock.now(), 6.5).await.unwrap();
        assert_eq!(avg, 5.5);

        clock.advance(300);
        let avg = store.record_and_average(&k, clock.now(), 5.5).await.unwrap();
        assert_eq!(avg, 5.5);

        clock.advance(300);
        let avg = store.record_and_average(&k, clock.now(), 1.2).await.unwrap();
        assert_eq!(avg, 4.675);
    }

    #[tokio::test]
    async fn key_isolation_by_sensor_and_device() {
        let store = InMemoryWindowStore::new();

        let a = store
            .record_and_average(&key("dev-a", 1, 100), 0, 10.0)
            .await
            .unwrap();
        assert_eq!(a, 10.0);

        let b = store
            .record_and_average(&key("dev-a", 2, 100), 0, 20.0)
            .await
            .unwrap();
        assert_eq!(b, 20.0);

        let c = store
            .record_and_average(&key("dev-b", 1, 100), 0, 30.0)
            .await
            .unwrap();
        assert_eq!(c, 30.0);

        // original key unaffected by the other two calls
        let a_again = store
            .record_and_average(&key("dev-a", 1, 100), 0, 10.0)
            .await
            .unwrap();
        assert_eq!(a_again, 10.0);
    }

    #[tokio::test]
    async fn duplicate_timestamps_are_both_counted() {
        let store = InMemoryWindowStore::new();
        let k = key("abc", 1, 60);

        store.record_and_average(&k, 100, 2.0).await.unwrap();
        let avg = store.record_and_average(&k, 100, 4.0).await.unwrap();

        assert_eq!(avg, 3.0);
    }

    #[tokio::test]
    async fn entries_outside_window_are_pruned() {
        let store = InMemoryWindowStore::new();
        let k = key("abc", 1, 10);

        store.record_and_average(&k, 0, 1.0).await.unwrap();
        let avg = store.record_and_average(&k, 11, 3.0).await.unwrap();

        // t=0 falls outside [11-10, 11] = [1, 11]
        assert_eq!(avg, 3.0);
    }
}
