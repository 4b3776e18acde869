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

//! Encrypting bridge between MQTT sensor telemetry and an encrypted
//! datastore.
//!
//! Start at [`controller::StreamController`], which ties the durable
//! [`registry::StreamRegistry`] together with the [`mqtt::MqttSupervisor`]
//! and runs the ingest pipeline (enrich → transform → encrypt → sink) on
//! every inbound message.

pub mod clock;
pub mod config;
pub mod controller;
pub mod encrypt;
pub mod enrich;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod registry;
pub mod sink;
pub mod transform;
pub mod window;
