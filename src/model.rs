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

//! Data model shared by the registry, pipeline and RPC layer (§3).

use serde::{Deserialize, Serialize};

/// Where a device is physically installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exposure {
    Unknown,
    Indoor,
    Outdoor,
}

impl Exposure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Indoor => "indoor",
            Self::Outdoor => "outdoor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "indoor" => Some(Self::Indoor),
            "outdoor" => Some(Self::Outdoor),
            _ => None,
        }
    }
}

/// A physical sensor device, identified on the broker by its `device_token`.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: i64,
    pub device_token: String,
    pub broker_address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub exposure: Exposure,
    pub label: Option<String>,
}

/// A registered encrypted output destination for a device (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub stream_id: uuid::Uuid,
    pub device_id: i64,
    pub policy_id: String,
    pub public_key: String,
    pub operations: Vec<Operation>,
}

/// One per-sensor transformation directive attached to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Share,
    Bin,
    MovingAvg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub sensor_id: i64,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bins: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
}

/// Static catalog entry: sensor id → {name, description, unit}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMetadata {
    pub sensor_id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
}

/// A single sample stored by the windowed moving-average operator (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub timestamp: i64,
    pub value: f64,
}

/// A raw (id, value) reading enriched with static metadata (§4.3, "Enricher").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReading {
    pub sensor_id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub value: f64,
}

/// The canonical device-with-readings structure produced by the Enricher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedDevice {
    pub device_token: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    pub readings: Vec<EnrichedReading>,
}
