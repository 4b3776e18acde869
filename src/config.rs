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

//! Process configuration: CLI flags with environment-variable fallbacks
//! (§3, "Ambient addition — Config"; §6 "Configuration (required)").

use clap::Parser;

/// Validated process configuration, the single source of truth assembled
/// from CLI flags and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "sensorcrypt-bridge-server", version, about)]
pub struct Config {
    /// SQLite connection URL for the stream registry.
    #[arg(long, env = "BRIDGE_DB_URL")]
    pub db_url: String,

    /// Symmetric passphrase used to encrypt deletion tokens at rest.
    #[arg(long, env = "BRIDGE_TOKEN_PASSPHRASE")]
    pub token_passphrase: String,

    /// Base URL of the remote RPC datastore.
    #[arg(long, env = "BRIDGE_DATASTORE_URL")]
    pub datastore_url: String,

    /// Default MQTT broker address used for newly created streams.
    #[arg(long, env = "BRIDGE_MQTT_BROKER_URL")]
    pub mqtt_broker_url: String,

    /// Path to the external encryption script interpreter.
    #[arg(long, env = "BRIDGE_ENCRYPT_SCRIPT_PATH")]
    pub encrypt_script_path: String,

    /// Address the RPC/HTTP server listens on.
    #[arg(long, env = "BRIDGE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Window store backend selector. Only `memory` is implemented; the
    /// field exists so a future networked backend can be selected without
    /// an interface change (§3).
    #[arg(long, env = "BRIDGE_WINDOW_STORE_BACKEND", default_value = "memory")]
    pub window_store_backend: String,

    /// Comma-separated TLS domains, reserved for the out-of-scope
    /// certificate cache (§1, §6).
    #[arg(long, env = "BRIDGE_TLS_DOMAINS")]
    pub tls_domains: Option<String>,

    /// Log format: `json` or `compact`.
    #[arg(long, env = "BRIDGE_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level filter, forwarded to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Startup retry deadline in seconds (§5, "Startup retry").
    #[arg(long, env = "BRIDGE_STARTUP_DEADLINE_SECS", default_value = "120")]
    pub startup_deadline_secs: u64,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// Rejects configurations that parse but are semantically invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_store_backend != "memory" {
            return Err(ConfigError::Invalid(format!(
                "unsupported window_store_backend {:?}; only \"memory\" is implemented",
                self.window_store_backend
            )));
        }
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn base_args() -> Vec<&'static str> {
        vec![
            "sensorcrypt-bridge-server",
            "--db-url",
            "sqlite://bridge.db",
            "--token-passphrase",
            "passphrase",
            "--datastore-url",
            "http://datastore.local",
            "--mqtt-broker-url",
            "tcp://broker.local:1883",
            "--encrypt-script-path",
            "/usr/local/bin/encrypt.sh",
        ]
    }

    #[test]
    fn parses_required_fields_with_defaults() {
        let config = Config::parse_from(base_args());
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.window_store_backend, "memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unsupported_window_store_backend() {
        let mut args = base_args();
        args.extend(["--window-store-backend", "redis"]);
        let config = Config::parse_from(args);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_listen_addr() {
        let mut args = base_args();
        args.extend(["--listen-addr", "not-an-address"]);
        let config = Config::parse_from(args);
        assert!(config.validate().is_err());
    }
}
