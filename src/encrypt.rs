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

//! Wraps the external cryptographic script interpreter (§4.3, "Encryptor").
//!
//! The script itself is out of scope (§1); this module only knows how to
//! invoke it as a subprocess with the documented calling convention (§6,
//! "Keys JSON to encryption runner").

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("failed to spawn encryption script: {0}")]
    Spawn(std::io::Error),

    #[error("failed to write plaintext to encryption script stdin: {0}")]
    Stdin(std::io::Error),

    #[error("encryption script exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),

    #[error("mock encryptor configured to fail for community {0}")]
    MockFailure(String),
}

/// The `keys` JSON object passed as the script's first argument (§6).
#[derive(Debug, Clone, Serialize)]
pub struct EncryptionKeys {
    pub device_token: String,
    pub community_id: String,
    pub community_pubkey: String,
}

/// Encrypts plaintext for a single recipient via an external script runner.
#[async_trait]
pub trait Encryptor: Send + Sync + 'static {
    async fn encrypt(
        &self,
        keys: &EncryptionKeys,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EncryptError>;
}

/// Invokes the configured script path as a subprocess: the keys JSON is
/// passed as `argv[1]`, the plaintext is piped to stdin, and stdout is the
/// opaque ciphertext (§4.3).
pub struct ScriptEncryptor {
    script_path: String,
}

impl ScriptEncryptor {
    pub fn new(script_path: impl Into<String>) -> Self {
        Self {
            script_path: script_path.into(),
        }
    }
}

#[async_trait]
impl Encryptor for ScriptEncryptor {
    async fn encrypt(
        &self,
        keys: &EncryptionKeys,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EncryptError> {
        let keys_json = serde_json::to_string(keys).expect("EncryptionKeys always serializes");

        let mut child = Command::new(&self.script_path)
            .arg(keys_json)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(EncryptError::Spawn)?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(plaintext)
            .await
            .map_err(EncryptError::Stdin)?;
        drop(stdin);

        let output = child.wait_with_output().await.map_err(EncryptError::Spawn)?;
        if !output.status.success() {
            return Err(EncryptError::NonZeroExit(output.status));
        }

        Ok(output.stdout)
    }
}

/// An in-memory encryptor for tests: returns `plaintext` reversed, prefixed
/// with the recipient's community id, so tests can assert on shape without
/// shelling out.
///
/// `fail_for_community` lets a test force this encryptor to fail for one
/// specific `community_id` while behaving normally for every other one, so
/// pipeline-isolation tests can inject a failure on a single stream.
#[derive(Debug, Default)]
pub struct MockEncryptor {
    fail_for_community: Option<String>,
}

impl MockEncryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(community_id: impl Into<String>) -> Self {
        Self {
            fail_for_community: Some(community_id.into()),
        }
    }
}

#[async_trait]
impl Encryptor for MockEncryptor {
    async fn encrypt(
        &self,
        keys: &EncryptionKeys,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EncryptError> {
        if self.fail_for_community.as_deref() == Some(keys.community_id.as_str()) {
            return Err(EncryptError::MockFailure(keys.community_id.clone()));
        }

        let mut out = keys.community_id.clone().into_bytes();
        out.push(b':');
        out.extend(plaintext.iter().rev());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_encryptor_is_deterministic() {
        let encryptor = MockEncryptor::new();
        let keys = EncryptionKeys {
            device_token: "abc123".into(),
            community_id: "community-1".into(),
            community_pubkey: "pubkey".into(),
        };

        let ciphertext = encryptor.encrypt(&keys, b"hello").await.unwrap();
        assert_eq!(ciphertext, b"community-1:olleh");
    }

    #[tokio::test]
    async fn script_encryptor_round_trips_through_cat() {
        // `cat` ignores argv and echoes stdin, letting us exercise the real
        // subprocess path without a bespoke fixture script.
        let encryptor = ScriptEncryptor::new("cat");
        let keys = EncryptionKeys {
            device_token: "abc123".into(),
            community_id: "community-1".into(),
            community_pubkey: "pubkey".into(),
        };

        let ciphertext = encryptor.encrypt(&keys, b"plaintext-bytes").await.unwrap();
        assert_eq!(ciphertext, b"plaintext-bytes");
    }

    #[tokio::test]
    async fn script_encryptor_propagates_nonzero_exit() {
        let encryptor = ScriptEncryptor::new("false");
        let keys = EncryptionKeys {
            device_token: "abc123".into(),
            community_id: "community-1".into(),
            community_pubkey: "pubkey".into(),
        };

        let err = encryptor.encrypt(&keys, b"x").await.unwrap_err();
        assert!(matches!(err, EncryptError::NonZeroExit(_)));
    }
}
