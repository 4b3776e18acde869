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

//! Process-wide Prometheus collectors (§4.7, §9 "Global singletons").

use std::sync::{Arc, OnceLock};

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pipeline_errors_total: IntCounterVec,
    mqtt_messages_total: IntCounterVec,
    encrypt_duration_seconds: Histogram,
    datastore_write_duration_seconds: Histogram,
    datastore_write_errors_total: IntCounter,
}

static GLOBAL: OnceLock<Arc<Metrics>> = OnceLock::new();

impl Metrics {
    /// Returns the process-wide metrics instance, building it on first call.
    ///
    /// Startup retries with exponential backoff (§5) may call this many
    /// times; because the collectors are only ever constructed once behind
    /// [`OnceLock`], re-registering the same collector with the registry
    /// (which would panic) never happens regardless of how many retries run.
    pub fn global() -> Arc<Metrics> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Metrics::build())))
    }

    /// A fresh, independently-registered instance for unit tests, so
    /// parallel tests never collide on the same collector names.
    pub fn new_for_test() -> Self {
        Self::build()
    }

    fn build() -> Self {
        let registry = Registry::new();

        let pipeline_errors_total = IntCounterVec::new(
            Opts::new("pipeline_errors_total", "Pipeline errors by cause"),
            &["cause"],
        )
        .expect("static metric definition is valid");
        registry
            .register(Box::new(pipeline_errors_total.clone()))
            .expect("first-ever registration of pipeline_errors_total");

        let mqtt_messages_total = IntCounterVec::new(
            Opts::new("mqtt_messages_total", "Inbound MQTT messages by broker"),
            &["broker"],
        )
        .expect("static metric definition is valid");
        registry
            .register(Box::new(mqtt_messages_total.clone()))
            .expect("first-ever registration of mqtt_messages_total");

        let encrypt_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "encrypt_duration_seconds",
            "Latency of the encryption script invocation",
        ))
        .expect("static metric definition is valid");
        registry
            .register(Box::new(encrypt_duration_seconds.clone()))
            .expect("first-ever registration of encrypt_duration_seconds");

        let datastore_write_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "datastore_write_duration_seconds",
            "Latency of a single stream's datastore write",
        ))
        .expect("static metric definition is valid");
        registry
            .register(Box::new(datastore_write_duration_seconds.clone()))
            .expect("first-ever registration of datastore_write_duration_seconds");

        let datastore_write_errors_total = IntCounter::new(
            "datastore_write_errors_total",
            "Datastore writes that failed",
        )
        .expect("static metric definition is valid");
        registry
            .register(Box::new(datastore_write_errors_total.clone()))
            .expect("first-ever registration of datastore_write_errors_total");

        Self {
            registry,
            pipeline_errors_total,
            mqtt_messages_total,
            encrypt_duration_seconds,
            datastore_write_duration_seconds,
            datastore_write_errors_total,
        }
    }

    pub fn inc_pipeline_error(&self, cause: &str) {
        self.pipeline_errors_total.with_label_values(&[cause]).inc();
    }

    pub fn inc_mqtt_message(&self, broker: &str) {
        self.mqtt_messages_total.with_label_values(&[broker]).inc();
    }

    pub fn observe_encrypt_duration(&self, seconds: f64) {
        self.encrypt_duration_seconds.observe(seconds);
    }

    pub fn observe_datastore_write_duration(&self, seconds: f64) {
        self.datastore_write_duration_seconds.observe(seconds);
    }

    pub fn inc_datastore_write_error(&self) {
        self.datastore_write_errors_total.inc();
    }

    /// Renders every collector in the Prometheus text exposition format
    /// (§6, `GET /metrics`).
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder
            .encode(&families, &mut buf)
            .expect("well-formed collectors always encode");
        String::from_utf8(buf).expect("prometheus text exposition is always utf8")
    }
}
