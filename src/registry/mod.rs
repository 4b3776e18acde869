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

//! Durable registry of devices, streams and their declared operations (§4.1).

pub mod crypto;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::model::{Device, Exposure, Operation, Stream};

/// Input to [`StreamRegistry::create_stream`].
#[derive(Debug, Clone)]
pub struct CreateStreamSpec {
    pub device_token: String,
    pub broker_address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub exposure: Exposure,
    pub label: Option<String>,
    pub policy_id: String,
    pub public_key: String,
    pub operations: Vec<Operation>,
}

/// Result of a successful [`StreamRegistry::create_stream`] call.
#[derive(Debug, Clone)]
pub struct CreatedStream {
    pub stream_id: Uuid,
    pub deletion_token: String,
}

/// Result of a successful [`StreamRegistry::delete_stream`] call.
///
/// `unsubscribe` is `Some` exactly when the deleted stream was the
/// device's last one, directing the caller to tear down the MQTT
/// subscription (§4.1, "cascading device deletion").
#[derive(Debug, Clone)]
pub struct DeletedStream {
    pub unsubscribe: Option<DeviceSubscription>,
}

/// Enough of a device to tear down its MQTT subscription.
#[derive(Debug, Clone)]
pub struct DeviceSubscription {
    pub device_token: String,
    pub broker_address: String,
}

/// A device together with every stream currently registered against it.
#[derive(Debug, Clone)]
pub struct DeviceWithStreams {
    pub device: Device,
    pub streams: Vec<Stream>,
}

/// Validates a [`CreateStreamSpec`] against the rules in §4.1.
///
/// Shared between the in-memory and SQLite-backed registries so the
/// validation error messages (asserted verbatim in S3, §8) never drift
/// between implementations.
pub fn validate(spec: &CreateStreamSpec) -> Result<(), RegistryError> {
    if spec.device_token.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "device_token is required".into(),
        ));
    }
    if spec.policy_id.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "policy_id is required".into(),
        ));
    }
    if spec.public_key.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "recipient_public_key is required".into(),
        ));
    }
    if !(-180.0..=180.0).contains(&spec.longitude) {
        return Err(RegistryError::InvalidArgument(
            "longitude must be between -180 and 180".into(),
        ));
    }
    if !(-90.0..=90.0).contains(&spec.latitude) {
        return Err(RegistryError::InvalidArgument(
            "latitude must be between -90 and 90".into(),
        ));
    }

    for op in &spec.operations {
        if op.sensor_id == 0 {
            return Err(RegistryError::InvalidArgument(
                "operations sensor_id must be nonzero".into(),
            ));
        }
        match op.action {
            crate::model::Action::Bin if op.bins.is_empty() => {
                return Err(RegistryError::InvalidArgument(
                    "operations binning requires a non-empty list of bins".into(),
                ));
            }
            crate::model::Action::MovingAvg if op.interval.unwrap_or(0) <= 0 => {
                return Err(RegistryError::InvalidArgument(
                    "operations moving average requires a positive interval".into(),
                ));
            }
            _ => {}
        }
    }

    Ok(())
}


/// Durable store of devices, streams and operations (§4.1).
///
/// `CreateStream`/`DeleteStream` run as a single database transaction with
/// commit-or-rollback semantics; `ListDevices`/`GetDevice` are plain reads.
#[async_trait]
pub trait StreamRegistry: Send + Sync + 'static {
    async fn create_stream(&self, spec: CreateStreamSpec) -> Result<CreatedStream, RegistryError>;

    async fn delete_stream(
        &self,
        stream_id: Uuid,
        deletion_token: &str,
    ) -> Result<DeletedStream, RegistryError>;

    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError>;

    async fn get_device(&self, device_token: &str) -> Result<DeviceWithStreams, RegistryError>;

    /// Returns `true` iff the backing store can be reached, used by
    /// `GET /pulse` (§6).
    async fn ping(&self) -> bool;

    /// Closes the backing connection pool during shutdown (§5). A no-op by
    /// default; backends with no pool to close don't need to override it.
    async fn close(&self) {}
}
