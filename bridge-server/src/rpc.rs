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

//! The two RPC operations (§4.6, §6) as plain JSON HTTP endpoints. The
//! Twirp/protobuf transport the distilled spec describes is out of scope
//! (§1) — any wire format can host the same two operations.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use sensorcrypt_bridge::error::{ErrorCode, RegistryError};
use sensorcrypt_bridge::model::{Exposure, Operation};
use sensorcrypt_bridge::registry::CreateStreamSpec;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Maps an [`ErrorCode`] to the HTTP status it's surfaced as (§4.6, §7).
fn http_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
            },
        };
        (http_status(self.code), Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

fn missing_field(name: &str) -> ApiError {
    ApiError {
        code: ErrorCode::InvalidArgument,
        message: format!("{name} is required"),
    }
}

#[derive(Debug, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

/// Every field here is `Option` even though the operation requires all of
/// them: a client JSON body that omits a key entirely must still reach this
/// handler as a well-formed request so we can reject it with the
/// `ApiError` envelope (§7) rather than Axum's default `JsonRejection` body.
#[derive(Debug, Deserialize)]
pub struct CreateStreamRequest {
    pub device_token: Option<String>,
    pub policy_id: Option<String>,
    pub recipient_public_key: Option<String>,
    pub location: Option<Location>,
    pub exposure: Option<Exposure>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

#[derive(Debug, Serialize)]
pub struct CreateStreamResponse {
    pub stream_uid: Uuid,
    pub token: String,
}

/// `POST /v1/streams` — `CreateStream` (§4.6, §6).
///
/// `broker_address` is not part of the request; every device is registered
/// against the server's single configured MQTT broker (§3, "Ambient
/// addition — Config", `mqtt_broker_url`).
pub async fn create_stream(
    State(state): State<AppState>,
    Json(req): Json<CreateStreamRequest>,
) -> Result<Json<CreateStreamResponse>, ApiError> {
    let device_token = req.device_token.ok_or_else(|| missing_field("device_token"))?;
    let policy_id = req.policy_id.ok_or_else(|| missing_field("policy_id"))?;
    let recipient_public_key = req
        .recipient_public_key
        .ok_or_else(|| missing_field("recipient_public_key"))?;
    let location = req.location.ok_or_else(|| missing_field("location"))?;
    let exposure = req.exposure.ok_or_else(|| missing_field("exposure"))?;

    let spec = CreateStreamSpec {
        device_token,
        broker_address: state.default_broker_address.clone(),
        longitude: location.longitude,
        latitude: location.latitude,
        exposure,
        label: None,
        policy_id,
        public_key: recipient_public_key,
        operations: req.operations,
    };

    let created = state.controller.create_stream(spec).await?;

    Ok(Json(CreateStreamResponse {
        stream_uid: created.stream_id,
        token: created.deletion_token,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteStreamRequest {
    pub stream_uid: Option<Uuid>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteStreamResponse {
    pub deleted: bool,
}

/// `POST /v1/streams/delete` — `DeleteStream` (§4.6, §6).
pub async fn delete_stream(
    State(state): State<AppState>,
    Json(req): Json<DeleteStreamRequest>,
) -> Result<Json<DeleteStreamResponse>, ApiError> {
    let stream_uid = req.stream_uid.ok_or_else(|| missing_field("stream_uid"))?;
    let token = req.token.ok_or_else(|| missing_field("token"))?;
    if token.is_empty() {
        return Err(missing_field("token"));
    }

    state.controller.delete_stream(stream_uid, &token).await?;

    Ok(Json(DeleteStreamResponse { deleted: true }))
}

/// `GET /pulse` — 200 iff the registry and window store backend both
/// respond (§6).
pub async fn pulse(State(state): State<AppState>) -> impl IntoResponse {
    let registry_ok = state.registry.ping().await;
    let window_store_ok = state.window_store.ping().await;

    if registry_ok && window_store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "not ok")
    }
}

/// `GET /metrics` — Prometheus text exposition (§6).
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

/// Assembles the full HTTP router (§4.6).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/streams", post(create_stream))
        .route("/v1/streams/delete", post(delete_stream))
        .route("/pulse", get(pulse))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
