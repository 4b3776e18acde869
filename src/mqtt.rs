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

//! Broker connection pool and per-device topic subscriptions (§4.2).
//!
//! Broker I/O is abstracted behind [`MqttConnector`]/[`MqttConnection`] so
//! tests can exercise subscription bookkeeping (idempotency, rehydration)
//! without a reachable broker — the trait + mock-and-real pair the design
//! notes call for (§9, "Dynamic interface with mock swaps").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::MqttError;
use crate::metrics::Metrics;

/// Receives every inbound publish, regardless of which device it came from
/// (§4.2, "Delivers inbound messages to a single user-supplied callback").
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, topic: String, payload: Bytes);
}

/// Resolves the chicken-and-egg wiring where the supervisor needs a handler
/// before the handler (typically the controller, which itself owns the
/// supervisor) exists yet: construct the supervisor with a [`HandlerCell`],
/// then [`HandlerCell::set`] the real handler once it's built.
#[derive(Default)]
pub struct HandlerCell {
    target: tokio::sync::OnceCell<Arc<dyn MessageHandler>>,
}

impl HandlerCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if called more than once; the cell is meant to be resolved
    /// exactly once, right after the handler it forwards to is constructed.
    pub fn set(&self, handler: Arc<dyn MessageHandler>) {
        self.target
            .set(handler)
            .map_err(|_| ())
            .expect("HandlerCell::set called more than once");
    }
}

#[async_trait]
impl MessageHandler for HandlerCell {
    async fn on_message(&self, topic: String, payload: Bytes) {
        match self.target.get() {
            Some(handler) => handler.on_message(topic, payload).await,
            None => warn!(%topic, "dropping inbound message: handler not yet wired up"),
        }
    }
}

/// A single broker connection, abstracted over subscribe/unsubscribe so the
/// real `rumqttc` transport and an in-memory test double share one
/// interface.
#[async_trait]
pub trait MqttConnection: Send + Sync + 'static {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), MqttError>;
    async fn disconnect(&self);
}

/// Opens connections to broker addresses on demand (§4.2, "Opens a broker
/// connection lazily on first use").
#[async_trait]
pub trait MqttConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        broker_address: &str,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<dyn MqttConnection>, MqttError>;
}

/// Splits `host:port` or `scheme://host:port` into its parts, defaulting to
/// the standard unencrypted MQTT port when none is given.
fn parse_broker_address(broker_address: &str) -> (String, u16) {
    let without_scheme = broker_address
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(broker_address);

    match without_scheme.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse().unwrap_or(1883),
        ),
        None => (without_scheme.to_string(), 1883),
    }
}

/// The real connector: one `rumqttc` client + background poll task per
/// broker address.
#[derive(Debug, Default)]
pub struct RumqttcConnector;

struct RumqttcConnection {
    client: AsyncClient,
    poll_task: JoinHandle<()>,
}

#[async_trait]
impl MqttConnection for RumqttcConnection {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(MqttError::Client)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(MqttError::Client)
    }

    async fn disconnect(&self) {
        self.client.disconnect().await.ok();
        self.poll_task.abort();
    }
}

#[async_trait]
impl MqttConnector for RumqttcConnector {
    async fn connect(
        &self,
        broker_address: &str,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<dyn MqttConnection>, MqttError> {
        let (host, port) = parse_broker_address(broker_address);
        let client_id = format!("sensorcrypt-bridge-{}", uuid::Uuid::new_v4());

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 128);

        let broker_label = broker_address.to_string();
        let poll_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        metrics.inc_mqtt_message(&broker_label);
                        debug!(topic = %publish.topic, broker = %broker_label, "mqtt publish received");
                        handler
                            .on_message(publish.topic, publish.payload)
                            .await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(broker = %broker_label, error = %err, "mqtt event loop error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Arc::new(RumqttcConnection { client, poll_task }))
    }
}

/// Owns a pool of broker connections keyed by broker address, and for each
/// one a set of active topic subscriptions (§4.2).
pub struct MqttSupervisor {
    connector: Box<dyn MqttConnector>,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<Metrics>,
    connections: RwLock<HashMap<String, Arc<dyn MqttConnection>>>,
    subscriptions: RwLock<HashSet<(String, String)>>,
}

impl MqttSupervisor {
    pub fn new(
        connector: Box<dyn MqttConnector>,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            connector,
            handler,
            metrics,
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    async fn connection_for(
        &self,
        broker_address: &str,
    ) -> Result<Arc<dyn MqttConnection>, MqttError> {
        {
            let connections = self.connections.read().await;
            if let Some(conn) = connections.get(broker_address) {
                return Ok(Arc::clone(conn));
            }
        }

        // Exclusive lock held across the network call: acceptable because
        // connecting to a new broker is rare (§4.2, "Concurrency").
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get(broker_address) {
            return Ok(Arc::clone(conn));
        }

        let conn = self
            .connector
            .connect(broker_address, Arc::clone(&self.handler), Arc::clone(&self.metrics))
            .await?;
        connections.insert(broker_address.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Idempotent per `(broker_address, topic)` (§4.2, §8 property 4).
    pub async fn subscribe(&self, broker_address: &str, topic: &str) -> Result<(), MqttError> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = (broker_address.to_string(), topic.to_string());
        if subscriptions.contains(&key) {
            return Ok(());
        }

        let conn = self.connection_for(broker_address).await?;
        conn.subscribe(topic).await?;
        subscriptions.insert(key);
        Ok(())
    }

    /// Idempotent: unsubscribing a topic with no active subscription is a
    /// no-op (§4.2).
    pub async fn unsubscribe(&self, broker_address: &str, topic: &str) -> Result<(), MqttError> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = (broker_address.to_string(), topic.to_string());
        if !subscriptions.remove(&key) {
            return Ok(());
        }

        if let Some(conn) = self.connections.read().await.get(broker_address) {
            conn.unsubscribe(topic).await?;
        }
        Ok(())
    }

    /// Number of active subscriptions, total or for one broker (used by
    /// tests, §8 scenario S5).
    pub async fn subscription_count(&self, broker_address: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|(broker, _)| broker == broker_address)
            .count()
    }

    /// Disconnects every broker with a short linger and clears subscription
    /// state (§4.2, §5 "Cancellation and timeouts").
    pub async fn stop(&self) {
        let mut connections = self.connections.write().await;
        for (_, conn) in connections.drain() {
            conn.disconnect().await;
        }
        drop(connections);

        tokio::time::sleep(Duration::from_millis(500)).await;
        self.subscriptions.write().await.clear();
    }
}

/// An in-memory connector for tests: records subscribe/unsubscribe calls
/// without touching the network.
#[derive(Debug, Default)]
pub struct MockConnector {
    pub subscribed: std::sync::Mutex<Vec<(String, String)>>,
}

struct MockConnection {
    broker_address: String,
    subscribed: Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl MqttConnection for MockConnection {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.subscribed
            .lock()
            .expect("mock connector mutex poisoned")
            .push((self.broker_address.clone(), topic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.subscribed
            .lock()
            .expect("mock connector mutex poisoned")
            .retain(|(_, t)| t != topic);
        Ok(())
    }

    async fn disconnect(&self) {}
}

#[async_trait]
impl MqttConnector for MockConnector {
    async fn connect(
        &self,
        broker_address: &str,
        _handler: Arc<dyn MessageHandler>,
        _metrics: Arc<Metrics>,
    ) -> Result<Arc<dyn MqttConnection>, MqttError> {
        Ok(Arc::new(MockConnection {
            broker_address: broker_address.to_string(),
            subscribed: Arc::new(std::sync::Mutex::new(Vec::new())),
        }))
    }
}

struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn on_message(&self, _topic: String, _payload: Bytes) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> MqttSupervisor {
        MqttSupervisor::new(
            Box::new(MockConnector::default()),
            Arc::new(NoopHandler),
            Arc::new(Metrics::new_for_test()),
        )
    }

    #[test]
    fn broker_address_parsing() {
        assert_eq!(
            parse_broker_address("tcp://broker.example:1883"),
            ("broker.example".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_address("broker.example:8883"),
            ("broker.example".to_string(), 8883)
        );
        assert_eq!(
            parse_broker_address("broker.example"),
            ("broker.example".to_string(), 1883)
        );
    }

    // §8 property 4.
    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let sup = supervisor();

        sup.subscribe("broker-a", "device/sck/abc/readings")
            .await
            .unwrap();
        sup.subscribe("broker-a", "device/sck/abc/readings")
            .await
            .unwrap();

        assert_eq!(sup.subscription_count("broker-a").await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_then_subscribe_leaves_exactly_one() {
        let sup = supervisor();

        sup.subscribe("broker-a", "topic-1").await.unwrap();
        sup.unsubscribe("broker-a", "topic-1").await.unwrap();
        sup.subscribe("broker-a", "topic-1").await.unwrap();

        assert_eq!(sup.subscription_count("broker-a").await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_without_subscription_is_a_noop() {
        let sup = supervisor();
        sup.unsubscribe("broker-a", "never-subscribed")
            .await
            .unwrap();
        assert_eq!(sup.subscription_count("broker-a").await, 0);
    }

    // §8 scenario S5.
    #[tokio::test]
    async fn two_devices_on_same_broker_yield_two_subscriptions() {
        let sup = supervisor();

        sup.subscribe("broker-b", "device/sck/foo/readings")
            .await
            .unwrap();
        sup.subscribe("broker-b", "device/sck/bar/readings")
            .await
            .unwrap();

        assert_eq!(sup.subscription_count("broker-b").await, 2);
    }

    #[tokio::test]
    async fn stop_clears_all_subscriptions() {
        let sup = supervisor();
        sup.subscribe("broker-a", "topic-1").await.unwrap();

        sup.stop().await;

        assert_eq!(sup.subscription_count("broker-a").await, 0);
    }
}
