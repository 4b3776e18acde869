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

//! SQLite-backed [`StreamRegistry`], generalized from the teacher's
//! single-row `PropertyStore` into the devices/streams/operations graph
//! (§3, §4.1).

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use uuid::Uuid;

use super::crypto::TokenCipher;
use super::{
    validate, CreateStreamSpec, CreatedStream, DeletedStream, DeviceSubscription,
    DeviceWithStreams,
};
use crate::error::RegistryError;
use crate::model::{Device, Exposure, Operation, Stream};

const DELETION_TOKEN_BYTES: usize = 24;

pub struct SqliteRegistry {
    pool: SqlitePool,
    cipher: TokenCipher,
}

impl SqliteRegistry {
    /// Connects to `db_url` (creating the file if missing) and runs pending
    /// migrations before returning. `passphrase` keys the at-rest encryption
    /// of deletion tokens.
    pub async fn connect(db_url: &str, passphrase: &str) -> Result<Self, RegistryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| RegistryError::Database(sqlx::Error::Migrate(Box::new(err))))?;

        Ok(Self {
            pool,
            cipher: TokenCipher::new(passphrase),
        })
    }

    fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device, RegistryError> {
        let exposure_str: String = row.try_get("exposure")?;
        let exposure = Exposure::parse(&exposure_str).unwrap_or(Exposure::Unknown);

        Ok(Device {
            id: row.try_get("id")?,
            device_token: row.try_get("device_token")?,
            broker_address: row.try_get("broker")?,
            longitude: row.try_get("longitude")?,
            latitude: row.try_get("latitude")?,
            exposure,
            label: row.try_get("label")?,
        })
    }

    fn row_to_stream(row: &sqlx::sqlite::SqliteRow) -> Result<Stream, RegistryError> {
        let uuid_str: String = row.try_get("uuid")?;
        let operations_json: String = row.try_get("operations")?;
        let operations: Vec<Operation> = serde_json::from_str(&operations_json)
            .map_err(|_| RegistryError::InvalidArgument("corrupt operations column".into()))?;

        Ok(Stream {
            stream_id: Uuid::parse_str(&uuid_str)
                .map_err(|_| RegistryError::InvalidArgument("corrupt uuid column".into()))?,
            device_id: row.try_get("device_id")?,
            policy_id: row.try_get("policy_id")?,
            public_key: row.try_get("public_key")?,
            operations,
        })
    }
}

#[async_trait]
impl super::StreamRegistry for SqliteRegistry {
    async fn create_stream(&self, spec: CreateStreamSpec) -> Result<CreatedStream, RegistryError> {
        validate(&spec)?;

        let operations_json = serde_json::to_string(&spec.operations)
            .expect("Vec<Operation> always serializes");

        let stream_id = Uuid::new_v4();

        let mut token_bytes = [0u8; DELETION_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let deletion_token = base64::engine::general_purpose::STANDARD.encode(token_bytes);
        let (token_ciphertext, token_nonce) = self.cipher.seal(deletion_token.as_bytes())?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO devices (device_token, broker, longitude, latitude, exposure, label)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(device_token) DO UPDATE SET
               broker = excluded.broker,
               longitude = excluded.longitude,
               latitude = excluded.latitude,
               exposure = excluded.exposure,
               label = excluded.label",
        )
        .bind(&spec.device_token)
        .bind(&spec.broker_address)
        .bind(spec.longitude)
        .bind(spec.latitude)
        .bind(spec.exposure.as_str())
        .bind(&spec.label)
        .execute(&mut *tx)
        .await?;

        let device_id: i64 = sqlx::query("SELECT id FROM devices WHERE device_token = ?")
            .bind(&spec.device_token)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

        let insert = sqlx::query(
            "INSERT INTO streams
               (uuid, device_id, policy_id, public_key, token_ciphertext, token_nonce, operations)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stream_id.to_string())
        .bind(device_id)
        .bind(&spec.policy_id)
        .bind(&spec.public_key)
        .bind(token_ciphertext)
        .bind(token_nonce.to_vec())
        .bind(operations_json)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return Err(RegistryError::AlreadyExists);
            }
            Err(err) => return Err(RegistryError::Database(err)),
        }

        tx.commit().await?;

        Ok(CreatedStream {
            stream_id,
            deletion_token,
        })
    }

    async fn delete_stream(
        &self,
        stream_id: Uuid,
        deletion_token: &str,
    ) -> Result<DeletedStream, RegistryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT device_id, token_ciphertext, token_nonce FROM streams WHERE uuid = ?",
        )
        .bind(stream_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RegistryError::NotFound)?;

        let device_id: i64 = row.try_get("device_id")?;
        let ciphertext: Vec<u8> = row.try_get("token_ciphertext")?;
        let nonce: Vec<u8> = row.try_get("token_nonce")?;

        let stored_token = self
            .cipher
            .open(&ciphertext, &nonce)
            .map_err(|_| RegistryError::NotFound)?;

        if stored_token != deletion_token.as_bytes() {
            return Err(RegistryError::NotFound);
        }

        sqlx::query("DELETE FROM streams WHERE uuid = ?")
            .bind(stream_id.to_string())
            .execute(&mut *tx)
            .await?;

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM streams WHERE device_id = ?")
            .bind(device_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;

        let unsubscribe = if remaining == 0 {
            let device_row = sqlx::query("SELECT device_token, broker FROM devices WHERE id = ?")
                .bind(device_id)
                .fetch_one(&mut *tx)
                .await?;
            let device_token: String = device_row.try_get("device_token")?;
            let broker_address: String = device_row.try_get("broker")?;

            sqlx::query("DELETE FROM devices WHERE id = ?")
                .bind(device_id)
                .execute(&mut *tx)
                .await?;

            Some(DeviceSubscription {
                device_token,
                broker_address,
            })
        } else {
            None
        };

        tx.commit().await?;

        Ok(DeletedStream { unsubscribe })
    }

    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        let rows = sqlx::query("SELECT * FROM devices")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_device).collect()
    }

    async fn get_device(&self, device_token: &str) -> Result<DeviceWithStreams, RegistryError> {
        let device_row = sqlx::query("SELECT * FROM devices WHERE device_token = ?")
            .bind(device_token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RegistryError::NotFound)?;

        let device = Self::row_to_device(&device_row)?;

        let stream_rows = sqlx::query("SELECT * FROM streams WHERE device_id = ? ORDER BY id")
            .bind(device.id)
            .fetch_all(&self.pool)
            .await?;

        let streams = stream_rows
            .iter()
            .map(Self::row_to_stream)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeviceWithStreams { device, streams })
    }

    /// `true` iff a `PRAGMA` round-trip succeeds.
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use crate::registry::StreamRegistry;

    async fn test_registry() -> SqliteRegistry {
        SqliteRegistry::connect("sqlite::memory:", "test-passphrase")
            .await
            .unwrap()
    }

    fn spec(device_token: &str, policy_id: &str) -> CreateStreamSpec {
        CreateStreamSpec {
            device_token: device_token.to_string(),
            broker_address: "tcp://broker.example:1883".to_string(),
            longitude: 4.35,
            latitude: 50.85,
            exposure: Exposure::Outdoor,
            label: Some("rooftop".to_string()),
            policy_id: policy_id.to_string(),
            public_key: "recipient-pubkey".to_string(),
            operations: vec![Operation {
                sensor_id: 12,
                action: Action::Share,
                bins: vec![],
                interval: None,
            }],
        }
    }

    #[tokio::test]
    async fn create_then_get_device() {
        let registry = test_registry().await;

        let created = registry.create_stream(spec("abc123", "p1")).await.unwrap();

        let with_streams = registry.get_device("abc123").await.unwrap();
        assert_eq!(with_streams.streams.len(), 1);
        assert_eq!(with_streams.streams[0].stream_id, created.stream_id);
    }

    #[tokio::test]
    async fn duplicate_policy_for_device_is_rejected() {
        let registry = test_registry().await;

        registry.create_stream(spec("abc123", "p1")).await.unwrap();
        let err = registry
            .create_stream(spec("abc123", "p1"))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::AlreadyExists));
    }

    #[tokio::test]
    async fn delete_authenticates_token_and_cascades() {
        let registry = test_registry().await;

        let created = registry.create_stream(spec("abc123", "p1")).await.unwrap();

        let wrong = registry
            .delete_stream(created.stream_id, "not-the-token")
            .await
            .unwrap_err();
        assert!(matches!(wrong, RegistryError::NotFound));

        let deleted = registry
            .delete_stream(created.stream_id, &created.deletion_token)
            .await
            .unwrap();
        assert_eq!(
            deleted.unsubscribe.map(|d| d.device_token),
            Some("abc123".to_string())
        );

        let again = registry
            .delete_stream(created.stream_id, &created.deletion_token)
            .await
            .unwrap_err();
        assert!(matches!(again, RegistryError::NotFound));

        let not_found = registry.get_device("abc123").await.unwrap_err();
        assert!(matches!(not_found, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn list_devices_rehydrates_without_streams_populated() {
        let registry = test_registry().await;

        registry.create_stream(spec("foo", "p1")).await.unwrap();
        registry.create_stream(spec("bar", "p1")).await.unwrap();

        let devices = registry.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
    }
}
