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

//! Ties [`StreamRegistry`] and [`MqttSupervisor`] together and runs the
//! ingest pipeline on every inbound message (§4.5).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::encrypt::{EncryptionKeys, Encryptor};
use crate::enrich;
use crate::error::{PipelineError, RegistryError};
use crate::metrics::Metrics;
use crate::mqtt::{MessageHandler, MqttSupervisor};
use crate::model::Stream;
use crate::registry::{CreateStreamSpec, CreatedStream, StreamRegistry};
use crate::sink::DatastoreSink;
use crate::transform;
use crate::window::WindowStore;

const TOPIC_PREFIX: &str = "device/sck/";
const TOPIC_SUFFIX: &str = "/readings";

/// Builds the topic a device's telemetry is published on (§4.5, "Topic
/// format").
pub fn topic_for(device_token: &str) -> String {
    format!("{TOPIC_PREFIX}{device_token}{TOPIC_SUFFIX}")
}

/// Extracts `<device_token>` from a topic matching `device/sck/<token>/readings`.
pub fn device_token_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_PREFIX)
        .and_then(|rest| rest.strip_suffix(TOPIC_SUFFIX))
}

/// The RPC-facing coordinator (§4.5).
pub struct StreamController {
    registry: Arc<dyn StreamRegistry>,
    supervisor: Arc<MqttSupervisor>,
    window_store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    encryptor: Arc<dyn Encryptor>,
    sink: Arc<dyn DatastoreSink>,
    metrics: Arc<Metrics>,
}

impl StreamController {
    pub fn new(
        registry: Arc<dyn StreamRegistry>,
        supervisor: Arc<MqttSupervisor>,
        window_store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
        encryptor: Arc<dyn Encryptor>,
        sink: Arc<dyn DatastoreSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            window_store,
            clock,
            encryptor,
            sink,
            metrics,
        }
    }

    /// `RPC CreateStream` (§2, §4.1, §6).
    #[instrument(skip(self, spec), fields(device_token = %spec.device_token, policy_id = %spec.policy_id))]
    pub async fn create_stream(
        &self,
        spec: CreateStreamSpec,
    ) -> Result<CreatedStream, RegistryError> {
        let broker_address = spec.broker_address.clone();
        let device_token = spec.device_token.clone();

        let created = self.registry.create_stream(spec).await?;

        self.supervisor
            .subscribe(&broker_address, &topic_for(&device_token))
            .await
            .inspect_err(|err| {
                error!(error = %err, %device_token, "failed to subscribe after stream creation");
            })?;

        Ok(created)
    }

    /// `RPC DeleteStream` (§2, §4.1, §6).
    #[instrument(skip(self))]
    pub async fn delete_stream(
        &self,
        stream_id: Uuid,
        deletion_token: &str,
    ) -> Result<(), RegistryError> {
        let deleted = self.registry.delete_stream(stream_id, deletion_token).await?;

        if let Some(subscription) = deleted.unsubscribe {
            if let Err(err) = self
                .supervisor
                .unsubscribe(
                    &subscription.broker_address,
                    &topic_for(&subscription.device_token),
                )
                .await
            {
                warn!(error = %err, device_token = %subscription.device_token, "failed to unsubscribe after last stream deleted");
            }
        }

        Ok(())
    }

    /// Rehydrates MQTT subscriptions for every known device at startup
    /// (§4.5, "Startup"). A subscription failure is logged and skipped.
    pub async fn rehydrate_subscriptions(&self) -> Result<(), RegistryError> {
        let devices = self.registry.list_devices().await?;

        for device in devices {
            let topic = topic_for(&device.device_token);
            if let Err(err) = self
                .supervisor
                .subscribe(&device.broker_address, &topic)
                .await
            {
                warn!(
                    error = %err,
                    device_token = %device.device_token,
                    "failed to rehydrate subscription, skipping"
                );
            }
        }

        Ok(())
    }

    /// Processes a single inbound MQTT delivery end to end (§2, §4.3).
    #[instrument(skip(self, payload), fields(device_token))]
    async fn handle_message(&self, topic: String, payload: Bytes) {
        let Some(device_token) = device_token_from_topic(&topic) else {
            warn!(%topic, "inbound message on unrecognized topic, ignoring");
            return;
        };
        tracing::Span::current().record("device_token", device_token);

        let device_with_streams = match self.registry.get_device(device_token).await {
            Ok(d) => d,
            Err(RegistryError::NotFound) => {
                warn!(%device_token, "message for unknown device, ignoring");
                return;
            }
            Err(err) => {
                error!(error = %err, %device_token, "failed to load device for inbound message");
                self.metrics.inc_pipeline_error("registry_lookup_failed");
                return;
            }
        };

        let enriched = match enrich::enrich(device_token, &payload) {
            Ok(device) => device,
            Err(err) => {
                warn!(error = %err, %device_token, "dropping unparseable payload");
                self.metrics.inc_pipeline_error(PipelineError::from(err).cause());
                return;
            }
        };

        // §4.3, "Ordering": streams processed sequentially in registry
        // order; a failure on one never prevents the others (§8 property 8).
        for stream in &device_with_streams.streams {
            if let Err(err) = self.process_stream(stream, &enriched).await {
                error!(error = %err, stream_id = %stream.stream_id, %device_token, cause = err.cause(), "pipeline error processing stream");
                self.metrics.inc_pipeline_error(err.cause());
            }
        }
    }

    async fn process_stream(
        &self,
        stream: &Stream,
        device: &crate::model::EnrichedDevice,
    ) -> Result<(), PipelineError> {
        let view = transform::build_view(
            device,
            &stream.operations,
            self.window_store.as_ref(),
            self.clock.as_ref(),
        )
        .await?;

        let plaintext = serde_json::to_vec(&view).expect("processed view always serializes");

        let keys = EncryptionKeys {
            device_token: device.device_token.clone(),
            community_id: stream.policy_id.clone(),
            community_pubkey: stream.public_key.clone(),
        };

        let encrypt_start = std::time::Instant::now();
        let ciphertext = self.encryptor.encrypt(&keys, &plaintext).await?;
        self.metrics
            .observe_encrypt_duration(encrypt_start.elapsed().as_secs_f64());

        let write_start = std::time::Instant::now();
        let result = self
            .sink
            .write(&stream.policy_id, &device.device_token, &ciphertext)
            .await;
        self.metrics
            .observe_datastore_write_duration(write_start.elapsed().as_secs_f64());

        if result.is_err() {
            self.metrics.inc_datastore_write_error();
        }
        result?;

        info!(stream_id = %stream.stream_id, "wrote encrypted datastore entry");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for StreamController {
    async fn on_message(&self, topic: String, payload: Bytes) {
        self.handle_message(topic, payload).await;
    }
}
