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

//! Symmetric at-rest encryption for deletion tokens (§4.1).
//!
//! The server-wide passphrase is hashed with SHA-256 into a 256-bit AES key.
//! Each stored token gets a fresh random 96-bit nonce, persisted alongside
//! the ciphertext so it never has to be re-derived.

use rand::RngCore;
use ring::aead::{self, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use sha2::{Digest, Sha256};

pub const NONCE_LEN: usize = 12;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to seal deletion token")]
    Seal,
    #[error("failed to open deletion token (wrong passphrase or corrupted row)")]
    Open,
}

/// Derives a 256-bit AES key from the configured passphrase.
#[derive(Clone)]
pub struct TokenCipher {
    key_bytes: [u8; 32],
}

impl TokenCipher {
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&digest);
        Self { key_bytes }
    }

    /// Encrypts `plaintext`, returning `(ciphertext, nonce)` to be stored
    /// as separate columns.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, &self.key_bytes).map_err(|_| CryptoError::Seal)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let mut key = aead::SealingKey::new(unbound, OneShotNonce::new(nonce_bytes));

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(aead::Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Seal)?;

        Ok((in_out, nonce_bytes))
    }

    /// Decrypts a `(ciphertext, nonce)` pair produced by [`Self::seal`].
    pub fn open(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Open);
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);

        let unbound =
            UnboundKey::new(&AES_256_GCM, &self.key_bytes).map_err(|_| CryptoError::Open)?;
        let mut key = aead::OpeningKey::new(unbound, OneShotNonce::new(nonce_bytes));

        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(aead::Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Open)?;

        Ok(plaintext.to_vec())
    }
}

/// A [`NonceSequence`] that yields exactly one nonce, for single-shot seal/open.
struct OneShotNonce(Option<[u8; NONCE_LEN]>);

impl OneShotNonce {
    fn new(bytes: [u8; NONCE_LEN]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for OneShotNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        let bytes = self.0.take().ok_or(ring::error::Unspecified)?;
        Ok(Nonce::assume_unique_for_key(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cipher = TokenCipher::new("correct horse battery staple");
        let (ciphertext, nonce) = cipher.seal(b"super-secret-token").unwrap();

        let plaintext = cipher.open(&ciphertext, &nonce).unwrap();
        assert_eq!(plaintext, b"super-secret-token");
    }

    #[test]
    fn wrong_passphrase_fails_to_open() {
        let sealed = TokenCipher::new("passphrase-a").seal(b"token").unwrap();

        let err = TokenCipher::new("passphrase-b")
            .open(&sealed.0, &sealed.1)
            .unwrap_err();

        assert!(matches!(err, CryptoError::Open));
    }
}
