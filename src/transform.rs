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

//! Per-sensor transform operators: `SHARE`, `BIN`, `MOVING_AVG` (§4.3).
//!
//! `share` and `bin` are pure functions; `moving_average` is the only one
//! that suspends, since it round-trips through a [`WindowStore`].

use serde::Serialize;

use crate::clock::Clock;
use crate::model::{Action, EnrichedDevice, Operation};
use crate::window::{WindowError, WindowKey, WindowStore};

/// `SHARE(value)`: emits the value unchanged (§4.3).
pub fn share(value: f64) -> f64 {
    value
}

/// `BIN(value, bins)`: an indicator vector of length `bins.len() + 1`
/// selecting bucket `i` iff `bins[i-1] <= value < bins[i]`, with
/// `bins[-1] = -inf` and `bins[n] = +inf` (§4.3, §9 — half-open
/// `[b_{i-1}, b_i)` convention, fixing the two variants present upstream).
pub fn bin(value: f64, bins: &[f64]) -> Vec<u8> {
    let mut indicator = vec![0u8; bins.len() + 1];

    let bucket = bins.iter().position(|&b| value < b).unwrap_or(bins.len());
    indicator[bucket] = 1;

    indicator
}

/// `MOVING_AVG(value, device_token, sensor_id, interval)` (§4.4).
pub async fn moving_average(
    window_store: &dyn WindowStore,
    clock: &dyn Clock,
    device_token: &str,
    sensor_id: i64,
    interval: i64,
    value: f64,
) -> Result<f64, WindowError> {
    let key = WindowKey {
        device_token: device_token.to_string(),
        sensor_id,
        interval,
    };
    window_store
        .record_and_average(&key, clock.now(), value)
        .await
}

/// One sensor's value as it appears in a stream's processed view.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProcessedValue {
    Scalar(f64),
    Indicator(Vec<u8>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedReading {
    pub sensor_id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub value: ProcessedValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDevice {
    pub device_token: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    pub readings: Vec<ProcessedReading>,
}

/// Builds the processed view a single stream's operations produce out of an
/// enriched device (§4.3). If `operations` is empty, the whole enriched
/// device is passed through unchanged; otherwise only the sensors named by
/// an operation appear, each transformed by its declared action.
pub async fn build_view(
    device: &EnrichedDevice,
    operations: &[Operation],
    window_store: &dyn WindowStore,
    clock: &dyn Clock,
) -> Result<serde_json::Value, WindowError> {
    if operations.is_empty() {
        return Ok(serde_json::to_value(device).expect("EnrichedDevice always serializes"));
    }

    let mut readings = Vec::with_capacity(operations.len());

    for op in operations {
        let Some(reading) = device
            .readings
            .iter()
            .find(|reading| reading.sensor_id == op.sensor_id)
        else {
            continue;
        };

        let value = match op.action {
            Action::Share => ProcessedValue::Scalar(share(reading.value)),
            Action::Bin => ProcessedValue::Indicator(bin(reading.value, &op.bins)),
            Action::MovingAvg => {
                let interval = op.interval.unwrap_or(0);
                let avg = moving_average(
                    window_store,
                    clock,
                    &device.device_token,
                    op.sensor_id,
                    interval,
                    reading.value,
                )
                .await?;
                ProcessedValue::Scalar(avg)
            }
        };

        readings.push(ProcessedReading {
            sensor_id: reading.sensor_id,
            name: reading.name,
            description: reading.description,
            unit: reading.unit,
            value,
        });
    }

    let view = ProcessedDevice {
        device_token: device.device_token.clone(),
        recorded_at: device.recorded_at,
        readings,
    };

    Ok(serde_json::to_value(view).expect("ProcessedDevice always serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::window::InMemoryWindowStore;

    #[test]
    fn share_is_identity() {
        assert_eq!(share(42.0), 42.0);
    }

    // §8 property 5, §8 scenario S2.
    #[test]
    fn s2_bin_boundaries() {
        assert_eq!(bin(67.212, &[40.0, 80.0]), vec![0, 1, 0]);
        assert_eq!(bin(-5.0, &[0.0, 15.0, 30.0]), vec![1, 0, 0, 0]);
        assert_eq!(bin(200.0, &[0.0, 15.0, 30.0]), vec![0, 0, 0, 1]);
    }

    #[test]
    fn bin_lower_bound_is_inclusive_upper_is_exclusive() {
        // value == bins[i] falls into the bucket above, not below.
        assert_eq!(bin(40.0, &[40.0, 80.0]), vec![0, 1, 0]);
        assert_eq!(bin(80.0, &[40.0, 80.0]), vec![0, 0, 1]);
    }

    #[test]
    fn bin_indicator_always_sums_to_one() {
        let cases: &[(f64, &[f64])] = &[
            (-1000.0, &[0.0, 1.0, 2.0]),
            (0.5, &[0.0, 1.0, 2.0]),
            (1000.0, &[0.0, 1.0, 2.0]),
            (5.0, &[5.0]),
        ];
        for (value, bins) in cases {
            let indicator = bin(*value, bins);
            assert_eq!(indicator.len(), bins.len() + 1);
            assert_eq!(indicator.iter().map(|&b| b as u32).sum::<u32>(), 1);
        }
    }

    #[tokio::test]
    async fn moving_average_reads_through_window_store() {
        let store = InMemoryWindowStore::new();
        let clock = MockClock::new(0);

        let avg = moving_average(&store, &clock, "abc", 1, 900, 10.0)
            .await
            .unwrap();
        assert_eq!(avg, 10.0);
    }

    #[tokio::test]
    async fn build_view_pass_through_with_no_operations() {
        let device = EnrichedDevice {
            device_token: "abc".into(),
            recorded_at: chrono::Utc::now(),
            readings: vec![crate::model::EnrichedReading {
                sensor_id: 12,
                name: "Temperature",
                description: "Ambient air temperature",
                unit: "celsius",
                value: 20.0,
            }],
        };
        let store = InMemoryWindowStore::new();
        let clock = MockClock::new(0);

        let view = build_view(&device, &[], &store, &clock).await.unwrap();
        assert_eq!(view["device_token"], "abc");
        assert_eq!(view["readings"][0]["value"], 20.0);
    }

    #[tokio::test]
    async fn build_view_only_includes_operated_sensors() {
        let device = EnrichedDevice {
            device_token: "abc".into(),
            recorded_at: chrono::Utc::now(),
            readings: vec![
                crate::model::EnrichedReading {
                    sensor_id: 12,
                    name: "Temperature",
                    description: "Ambient air temperature",
                    unit: "celsius",
                    value: 20.0,
                },
                crate::model::EnrichedReading {
                    sensor_id: 13,
                    name: "Humidity",
                    description: "Relative humidity",
                    unit: "percent",
                    value: 55.0,
                },
            ],
        };
        let store = InMemoryWindowStore::new();
        let clock = MockClock::new(0);

        let ops = vec![Operation {
            sensor_id: 12,
            action: Action::Share,
            bins: vec![],
            interval: None,
        }];

        let view = build_view(&device, &ops, &store, &clock).await.unwrap();
        assert_eq!(view["readings"].as_array().unwrap().len(), 1);
        assert_eq!(view["readings"][0]["sensor_id"], 12);
    }
}
