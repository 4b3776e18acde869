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
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sensorcrypt_bridge::config::Config;
use sensorcrypt_bridge::controller::StreamController;
use sensorcrypt_bridge::encrypt::ScriptEncryptor;
use sensorcrypt_bridge::metrics::Metrics;
use sensorcrypt_bridge::mqtt::{HandlerCell, MqttSupervisor, RumqttcConnector};
use sensorcrypt_bridge::registry::sqlite::SqliteRegistry;
use sensorcrypt_bridge::registry::StreamRegistry;
use sensorcrypt_bridge::sink::HttpDatastoreSink;
use sensorcrypt_bridge::window::InMemoryWindowStore;

use sensorcrypt_bridge_server::state::AppState;
use sensorcrypt_bridge_server::rpc;

const HTTP_DRAIN_DEADLINE: Duration = Duration::from_secs(5);
const RETRY_BACKOFF_FLOOR: Duration = Duration::from_millis(200);
const RETRY_BACKOFF_CEILING: Duration = Duration::from_secs(10);

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Retries `f` with exponential backoff until it succeeds or `deadline` has
/// elapsed since `start` (§5, "Startup retry").
async fn retry_until_deadline<T, E, F, Fut>(
    what: &str,
    start: Instant,
    deadline: Duration,
    mut f: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = RETRY_BACKOFF_FLOOR;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if start.elapsed() < deadline => {
                warn!(
                    component = what,
                    error = %err,
                    backoff_ms = backoff.as_millis(),
                    "component not ready, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RETRY_BACKOFF_CEILING);
            }
            Err(err) => {
                return Err(anyhow::anyhow!("{what} did not become ready: {err}"));
            }
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(&config);
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;

    let metrics = Metrics::global();

    let startup_deadline = Duration::from_secs(config.startup_deadline_secs);
    let startup_start = Instant::now();

    let registry: Arc<dyn StreamRegistry> = {
        let db_url = config.db_url.clone();
        let passphrase = config.token_passphrase.clone();
        let registry = retry_until_deadline("registry", startup_start, startup_deadline, || {
            SqliteRegistry::connect(&db_url, &passphrase)
        })
        .await?;
        Arc::new(registry)
    };

    let window_store = Arc::new(InMemoryWindowStore::new());
    let encryptor = Arc::new(ScriptEncryptor::new(config.encrypt_script_path.clone()));
    let sink = Arc::new(HttpDatastoreSink::new(config.datastore_url.clone()));
    let clock = Arc::new(sensorcrypt_bridge::clock::SystemClock);

    let handler_cell = Arc::new(HandlerCell::new());
    let supervisor = Arc::new(MqttSupervisor::new(
        Box::new(RumqttcConnector),
        handler_cell.clone(),
        metrics.clone(),
    ));

    let controller = Arc::new(StreamController::new(
        registry.clone(),
        supervisor.clone(),
        window_store.clone(),
        clock,
        encryptor,
        sink,
        metrics.clone(),
    ));
    handler_cell.set(controller.clone());

    if let Err(err) = controller.rehydrate_subscriptions().await {
        error!(error = %err, "failed to rehydrate subscriptions at startup");
    }

    let app_state = AppState {
        controller,
        registry: registry.clone(),
        window_store,
        supervisor: supervisor.clone(),
        metrics,
        default_broker_address: config.mqtt_broker_url.clone(),
    };

    let router = rpc::router(app_state);
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "sensorcrypt-bridge-server listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::select! {
        result = serve => {
            result?;
        }
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(HTTP_DRAIN_DEADLINE).await;
        } => {
            warn!("http drain deadline exceeded, forcing shutdown");
        }
    }

    info!("stopping mqtt supervisor");
    supervisor.stop().await;

    info!("closing registry connection pool");
    registry.close().await;

    Ok(())
}
