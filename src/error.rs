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

//! Error taxonomy shared by the registry, pipeline and RPC-facing controller.

/// Error codes surfaced through the RPC boundary (§7 of the design).
///
/// `Unauthenticated` is reserved for a future authentication layer and is
/// never constructed today.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Error returned by [`crate::registry::StreamRegistry`] operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("no stream matches the given id and token")]
    NotFound,

    #[error("a stream already exists for this device and policy")]
    AlreadyExists,

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("token encryption error")]
    Crypto(#[from] crate::registry::crypto::CryptoError),

    #[error("mqtt subscription error")]
    Mqtt(#[from] MqttError),
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound => ErrorCode::NotFound,
            Self::AlreadyExists => ErrorCode::AlreadyExists,
            Self::Database(_) | Self::Crypto(_) | Self::Mqtt(_) => ErrorCode::Internal,
        }
    }
}

/// Error encountered while turning a raw MQTT delivery into a datastore
/// write for a single stream. Every variant is logged and counted by the
/// controller; none of them abort processing of sibling streams.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("encryption failed")]
    EncryptFailed(#[from] crate::encrypt::EncryptError),

    #[error("datastore write failed")]
    SinkFailed(#[from] crate::sink::SinkError),

    #[error("window store backend failed")]
    WindowBackendFailed(#[from] crate::window::WindowError),
}

impl PipelineError {
    /// The label used for the `pipeline_errors_total{cause}` counter.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::EncryptFailed(_) => "encrypt_failed",
            Self::SinkFailed(_) => "sink_failed",
            Self::WindowBackendFailed(_) => "window_backend_failed",
        }
    }
}

impl From<crate::enrich::EnrichError> for PipelineError {
    fn from(err: crate::enrich::EnrichError) -> Self {
        let crate::enrich::EnrichError::InvalidPayload(msg) = err;
        Self::InvalidPayload(msg)
    }
}

/// Error returned by [`crate::mqtt::MqttSupervisor`] operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("mqtt client error")]
    Client(#[from] rumqttc::ClientError),
}
