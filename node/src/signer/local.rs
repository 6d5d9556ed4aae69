// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process key custody: Ed25519 for signatures, ChaCha20-Poly1305 for
//! sealing. Keys live in memory only; use it for tests, the CLI and
//! single-host deployments.

use super::KeyCustody;
use crate::errors::CustodyError;
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use std::collections::HashMap;
use tokio::sync::RwLock;

const NONCE_LEN: usize = 12;

struct LocalKey {
    signing: SigningKey,
    sealing: Key,
    revoked: bool,
}

impl LocalKey {
    fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            sealing: ChaCha20Poly1305::generate_key(&mut OsRng),
            revoked: false,
        }
    }
}

#[derive(Default)]
pub struct LocalKeyCustody {
    keys: RwLock<HashMap<String, LocalKey>>,
}

impl LocalKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`LocalKeyCustody::generate_key`].
    pub fn with_key(mut self, key_path: impl Into<String>) -> Self {
        self.keys.get_mut().insert(key_path.into(), LocalKey::generate());
        self
    }

    /// Create (or rotate) the key at `key_path`.
    pub async fn generate_key(&self, key_path: &str) -> VerifyingKey {
        let key = LocalKey::generate();
        let verifying = key.signing.verifying_key();
        self.keys.write().await.insert(key_path.to_string(), key);
        tracing::info!("Generated local key {}", key_path);
        verifying
    }

    /// Further use of the key fails with `PermissionDenied`.
    pub async fn revoke(&self, key_path: &str) -> Result<(), CustodyError> {
        let mut keys = self.keys.write().await;
        let key = keys
            .get_mut(key_path)
            .ok_or_else(|| CustodyError::KeyNotFound(key_path.to_string()))?;
        key.revoked = true;
        tracing::warn!("Revoked local key {}", key_path);
        Ok(())
    }

    pub async fn verifying_key(&self, key_path: &str) -> Option<VerifyingKey> {
        self.keys.read().await.get(key_path).map(|k| k.signing.verifying_key())
    }
}

fn usable<'a>(keys: &'a HashMap<String, LocalKey>, key_path: &str) -> Result<&'a LocalKey, CustodyError> {
    match keys.get(key_path) {
        None => Err(CustodyError::KeyNotFound(key_path.to_string())),
        Some(k) if k.revoked => Err(CustodyError::PermissionDenied(key_path.to_string())),
        Some(k) => Ok(k),
    }
}

#[async_trait]
impl KeyCustody for LocalKeyCustody {
    async fn encrypt(&self, key_path: &str, plaintext: &[u8]) -> Result<Vec<u8>, CustodyError> {
        let keys = self.keys.read().await;
        let key = usable(&keys, key_path)?;
        let cipher = ChaCha20Poly1305::new(&key.sealing);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CustodyError::InvalidCiphertext)?;

        // nonce || ciphertext+tag
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn decrypt(&self, key_path: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CustodyError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CustodyError::InvalidCiphertext);
        }
        let keys = self.keys.read().await;
        let key = usable(&keys, key_path)?;
        let cipher = ChaCha20Poly1305::new(&key.sealing);
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CustodyError::InvalidCiphertext)
    }

    async fn sign(&self, key_path: &str, digest: &[u8]) -> Result<Vec<u8>, CustodyError> {
        let keys = self.keys.read().await;
        let key = usable(&keys, key_path)?;
        Ok(key.signing.sign(digest).to_bytes().to_vec())
    }

    async fn verify(&self, key_path: &str, digest: &[u8], signature: &[u8]) -> Result<bool, CustodyError> {
        let keys = self.keys.read().await;
        // Revoked keys still verify historical signatures.
        let key = keys
            .get(key_path)
            .ok_or_else(|| CustodyError::KeyNotFound(key_path.to_string()))?;
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(key.signing.verifying_key().verify(digest, &signature).is_ok())
    }
}
