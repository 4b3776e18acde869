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

//! Static sensor metadata catalog consulted by the [`crate::enrich`] module.

use crate::model::SensorMetadata;

/// Fixed sensor id → {name, description, unit} table.
///
/// Readings for sensor ids not present here are dropped during enrichment
/// (§4.3): the catalog is the authority on which sensors exist, not the
/// inbound payload.
const CATALOG: &[SensorMetadata] = &[
    SensorMetadata {
        sensor_id: 12,
        name: "Temperature",
        description: "Ambient air temperature",
        unit: "celsius",
    },
    SensorMetadata {
        sensor_id: 13,
        name: "Humidity",
        description: "Relative humidity",
        unit: "percent",
    },
    SensorMetadata {
        sensor_id: 14,
        name: "Sound pressure",
        description: "A-weighted equivalent sound pressure level",
        unit: "decibel",
    },
    SensorMetadata {
        sensor_id: 15,
        name: "NO2",
        description: "Nitrogen dioxide concentration",
        unit: "microgram_per_cubic_meter",
    },
    SensorMetadata {
        sensor_id: 16,
        name: "PM2.5",
        description: "Fine particulate matter concentration",
        unit: "microgram_per_cubic_meter",
    },
    SensorMetadata {
        sensor_id: 17,
        name: "Luminosity",
        description: "Ambient light level",
        unit: "lux",
    },
];

/// Looks up the static metadata for a sensor id, if the catalog carries one.
pub fn lookup(sensor_id: i64) -> Option<&'static SensorMetadata> {
    CATALOG.iter().find(|m| m.sensor_id == sensor_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sensor_resolves() {
        let meta = lookup(12).expect("sensor 12 is in the catalog");
        assert_eq!(meta.name, "Temperature");
        assert_eq!(meta.unit, "celsius");
    }

    #[test]
    fn unknown_sensor_is_none() {
        assert!(lookup(9999).is_none());
    }
}
