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

use std::sync::Arc;

use sensorcrypt_bridge::controller::StreamController;
use sensorcrypt_bridge::metrics::Metrics;
use sensorcrypt_bridge::mqtt::MqttSupervisor;
use sensorcrypt_bridge::registry::StreamRegistry;
use sensorcrypt_bridge::window::WindowStore;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StreamController>,
    pub registry: Arc<dyn StreamRegistry>,
    pub window_store: Arc<dyn WindowStore>,
    pub supervisor: Arc<MqttSupervisor>,
    pub metrics: Arc<Metrics>,
    /// The single MQTT broker every device is registered against (§3,
    /// `mqtt_broker_url`). `CreateStream` requests don't carry their own
    /// broker address.
    pub default_broker_address: String,
}
