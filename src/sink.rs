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

//! Forwards ciphertext to the remote RPC datastore (§4.3, "DatastoreSink").
//!
//! The datastore's own RPC transport (Twirp/protobuf) is out of scope
//! (§1); this module speaks to it as a plain JSON HTTP endpoint, which the
//! distilled spec notes is an equally valid wire format for the two
//! operations this core needs (§4.6).

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("datastore request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("datastore responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("mock sink configured to fail for community {0}")]
    MockFailure(String),
}

/// Body of the outbound datastore write (§6, "Outbound datastore message").
#[derive(Debug, Clone, Serialize)]
struct DatastoreWrite<'a> {
    community_id: &'a str,
    device_token: &'a str,
    data: String,
}

/// Writes a single stream's ciphertext to the datastore.
#[async_trait]
pub trait DatastoreSink: Send + Sync + 'static {
    async fn write(
        &self,
        community_id: &str,
        device_token: &str,
        ciphertext: &[u8],
    ) -> Result<(), SinkError>;

    /// Returns `true` iff the datastore can be reached, used by `/pulse`.
    async fn ping(&self) -> bool;
}

/// HTTP-backed sink: one POST per stream to the configured datastore URL.
pub struct HttpDatastoreSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDatastoreSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DatastoreSink for HttpDatastoreSink {
    async fn write(
        &self,
        community_id: &str,
        device_token: &str,
        ciphertext: &[u8],
    ) -> Result<(), SinkError> {
        let body = DatastoreWrite {
            community_id,
            device_token,
            data: base64::engine::general_purpose::STANDARD.encode(ciphertext),
        };

        let response = self
            .client
            .post(format!("{}/v1/writes", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status()));
        }

        Ok(())
    }

    async fn ping(&self) -> bool {
        self.client
            .get(format!("{}/pulse", self.base_url))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}

/// An in-memory sink for tests: records every write it receives.
///
/// `fail_for_community` lets a test force writes for one specific
/// `community_id` to fail while every other community still succeeds, so
/// pipeline-isolation tests can inject a failure on a single stream.
#[derive(Debug, Default)]
pub struct MockDatastoreSink {
    pub writes: std::sync::Mutex<Vec<(String, String, Vec<u8>)>>,
    fail_for_community: Option<String>,
}

impl MockDatastoreSink {
    pub fn failing_for(community_id: impl Into<String>) -> Self {
        Self {
            writes: std::sync::Mutex::new(Vec::new()),
            fail_for_community: Some(community_id.into()),
        }
    }
}

#[async_trait]
impl DatastoreSink for MockDatastoreSink {
    async fn write(
        &self,
        community_id: &str,
        device_token: &str,
        ciphertext: &[u8],
    ) -> Result<(), SinkError> {
        if self.fail_for_community.as_deref() == Some(community_id) {
            return Err(SinkError::MockFailure(community_id.to_string()));
        }

        self.writes.lock().expect("mock sink mutex poisoned").push((
            community_id.to_string(),
            device_token.to_string(),
            ciphertext.to_vec(),
        ));
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sink_records_writes() {
        let sink = MockDatastoreSink::default();

        sink.write("community-1", "abc123", b"ciphertext")
            .await
            .unwrap();

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "community-1");
        assert_eq!(writes[0].1, "abc123");
        assert_eq!(writes[0].2, b"ciphertext");
    }
}
