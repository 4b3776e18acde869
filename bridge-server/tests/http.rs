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

//! Integration tests for the RPC/HTTP surface (§4.6, §6). Uses
//! `axum_test::TestServer` over the real router — no TCP listener needed.

use std::sync::Arc;

use axum_test::TestServer;

use sensorcrypt_bridge::clock::MockClock;
use sensorcrypt_bridge::controller::StreamController;
use sensorcrypt_bridge::encrypt::MockEncryptor;
use sensorcrypt_bridge::metrics::Metrics;
use sensorcrypt_bridge::mqtt::{HandlerCell, MockConnector, MqttSupervisor};
use sensorcrypt_bridge::registry::sqlite::SqliteRegistry;
use sensorcrypt_bridge::registry::StreamRegistry;
use sensorcrypt_bridge::sink::MockDatastoreSink;
use sensorcrypt_bridge::window::InMemoryWindowStore;

use sensorcrypt_bridge_server::rpc;
use sensorcrypt_bridge_server::state::AppState;

async fn test_server() -> TestServer {
    let registry: Arc<dyn StreamRegistry> = Arc::new(
        SqliteRegistry::connect("sqlite::memory:", "test-passphrase")
            .await
            .unwrap(),
    );
    let handler_cell = Arc::new(HandlerCell::new());
    let metrics = Arc::new(Metrics::new_for_test());
    let supervisor = Arc::new(MqttSupervisor::new(
        Box::new(MockConnector::default()),
        handler_cell.clone(),
        metrics.clone(),
    ));
    let controller = Arc::new(StreamController::new(
        registry.clone(),
        supervisor.clone(),
        Arc::new(InMemoryWindowStore::new()),
        Arc::new(MockClock::new(0)),
        Arc::new(MockEncryptor::new()),
        Arc::new(MockDatastoreSink::default()),
        metrics.clone(),
    ));
    handler_cell.set(controller.clone());

    let state = AppState {
        controller,
        registry,
        window_store: Arc::new(InMemoryWindowStore::new()),
        supervisor,
        metrics,
        default_broker_address: "tcp://broker.example:1883".to_string(),
    };

    TestServer::new(rpc::router(state)).expect("failed to build test server")
}

fn create_request() -> serde_json::Value {
    serde_json::json!({
        "device_token": "abc123",
        "policy_id": "policy-1",
        "recipient_public_key": "recipient-pubkey",
        "location": {"longitude": 4.35, "latitude": 50.85},
        "exposure": "OUTDOOR",
        "operations": [
            {"sensor_id": 12, "action": "SHARE"},
        ],
    })
}

#[tokio::test]
async fn create_stream_returns_uid_and_token() {
    let server = test_server().await;

    let resp = server.post("/v1/streams").json(&create_request()).await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert!(body["stream_uid"].is_string());
    assert!(!body["token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_stream_rejects_missing_policy_id() {
    let server = test_server().await;

    let mut request = create_request();
    request["policy_id"] = serde_json::json!("");

    let resp = server.post("/v1/streams").json(&request).await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn create_stream_rejects_body_with_field_entirely_absent() {
    let server = test_server().await;

    let mut request = create_request();
    request.as_object_mut().unwrap().remove("recipient_public_key");

    let resp = server.post("/v1/streams").json(&request).await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
    assert_eq!(body["error"]["message"], "recipient_public_key is required");
}

#[tokio::test]
async fn delete_stream_rejects_body_with_token_entirely_absent() {
    let server = test_server().await;

    let created = server.post("/v1/streams").json(&create_request()).await;
    let body: serde_json::Value = created.json();

    let delete_request = serde_json::json!({
        "stream_uid": body["stream_uid"],
    });
    let resp = server.post("/v1/streams/delete").json(&delete_request).await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let resp_body: serde_json::Value = resp.json();
    assert_eq!(resp_body["error"]["code"], "INVALID_ARGUMENT");
    assert_eq!(resp_body["error"]["message"], "token is required");
}

#[tokio::test]
async fn duplicate_policy_for_device_is_conflict() {
    let server = test_server().await;

    server.post("/v1/streams").json(&create_request()).await.assert_status_ok();
    let resp = server.post("/v1/streams").json(&create_request()).await;
    resp.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_then_delete_stream_round_trips() {
    let server = test_server().await;

    let created = server.post("/v1/streams").json(&create_request()).await;
    created.assert_status_ok();
    let body: serde_json::Value = created.json();

    let delete_request = serde_json::json!({
        "stream_uid": body["stream_uid"],
        "token": body["token"],
    });
    let deleted = server.post("/v1/streams/delete").json(&delete_request).await;
    deleted.assert_status_ok();

    let deleted_body: serde_json::Value = deleted.json();
    assert_eq!(deleted_body["deleted"], true);
}

#[tokio::test]
async fn delete_with_wrong_token_is_not_found() {
    let server = test_server().await;

    let created = server.post("/v1/streams").json(&create_request()).await;
    let body: serde_json::Value = created.json();

    let delete_request = serde_json::json!({
        "stream_uid": body["stream_uid"],
        "token": "not-the-right-token",
    });
    let resp = server.post("/v1/streams/delete").json(&delete_request).await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pulse_is_ok_when_backends_are_reachable() {
    let server = test_server().await;
    let resp = server.get("/pulse").await;
    resp.assert_status_ok();
}

#[tokio::test]
async fn metrics_exposes_prometheus_text() {
    let server = test_server().await;

    let resp = server.get("/metrics").await;
    resp.assert_status_ok();
    let body = resp.text();
    assert!(body.contains("datastore_write_errors_total"));
}
