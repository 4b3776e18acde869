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

//! Parses an inbound MQTT payload into a canonical, metadata-enriched
//! device record (§4.3, "Enricher", §6 "Inbound MQTT payload").

use serde::Deserialize;

use crate::metadata;
use crate::model::{EnrichedDevice, EnrichedReading};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    data: Vec<RawDataEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDataEntry {
    recorded_at: chrono::DateTime<chrono::Utc>,
    sensors: Vec<RawSensor>,
}

#[derive(Debug, Deserialize)]
struct RawSensor {
    id: i64,
    value: f64,
}

/// Parses `payload` (the raw MQTT publish body) for `device_token`, enriching
/// every sensor reading present in [`metadata`]'s catalog. Sensors the
/// catalog doesn't know about are silently dropped (§4.3).
///
/// Only `data[0]` is consumed, matching the wire format in §6.
pub fn enrich(device_token: &str, payload: &[u8]) -> Result<EnrichedDevice, EnrichError> {
    if payload.is_empty() {
        return Err(EnrichError::InvalidPayload("payload is empty".into()));
    }

    let raw: RawPayload = serde_json::from_slice(payload)
        .map_err(|err| EnrichError::InvalidPayload(format!("malformed json: {err}")))?;

    let entry = raw
        .data
        .first()
        .ok_or_else(|| EnrichError::InvalidPayload("data array is empty".into()))?;

    let readings = entry
        .sensors
        .iter()
        .filter_map(|sensor| {
            metadata::lookup(sensor.id).map(|meta| EnrichedReading {
                sensor_id: meta.sensor_id,
                name: meta.name,
                description: meta.description,
                unit: meta.unit,
                value: sensor.value,
            })
        })
        .collect();

    Ok(EnrichedDevice {
        device_token: device_token.to_string(),
        recorded_at: entry.recorded_at,
        readings,
    })
}
