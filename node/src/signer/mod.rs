// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event Signer
//!
//! Signs the 32 raw bytes of an event's `event_hash` through an external
//! key-custody service. Because the hash covers every stored field, a
//! signature only verifies while the event is untouched.
//!
//! # Guarantees
//! - transient custody failures are retried under [`RetryPolicy`]
//! - `KeyNotFound` / `PermissionDenied` abort on the first attempt
//! - every custody call is timed and sized in metrics

pub mod local;

pub use local::LocalKeyCustody;

use crate::errors::{CustodyError, SigningError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use neural_ledger_core::{EventHash, LedgerEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Port to a key-custody service (HSM, cloud KMS, vault).
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn encrypt(&self, key_path: &str, plaintext: &[u8]) -> Result<Vec<u8>, CustodyError>;

    async fn decrypt(&self, key_path: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CustodyError>;

    async fn sign(&self, key_path: &str, digest: &[u8]) -> Result<Vec<u8>, CustodyError>;

    async fn verify(&self, key_path: &str, digest: &[u8], signature: &[u8]) -> Result<bool, CustodyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    pub key_id: String,
    /// Hex-encoded signature bytes.
    pub signature: String,
}

#[derive(Clone)]
pub struct EventSigner {
    custody: Arc<dyn KeyCustody>,
    key_id: String,
    retry: RetryPolicy,
}

impl EventSigner {
    pub fn new(custody: Arc<dyn KeyCustody>, key_id: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            custody,
            key_id: key_id.into(),
            retry,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn sign_event_hash(&self, hash: &EventHash) -> Result<EventSignature, SigningError> {
        let digest = hash.as_bytes();
        let signature = retry_with_backoff(&self.retry, "sign", || {
            timed("sign", digest.len(), self.custody.sign(&self.key_id, digest))
        })
        .await
        .map_err(|e| SigningError::from_retry(&self.key_id, e))?;

        Ok(EventSignature {
            key_id: self.key_id.clone(),
            signature: hex::encode(signature),
        })
    }

    /// True iff the event carries a signature that verifies over the hash
    /// recomputed from its current fields.
    pub async fn verify_event(&self, event: &LedgerEvent) -> Result<bool, SigningError> {
        let (Some(signature), Some(key_id)) = (&event.signature, &event.signing_key_id) else {
            return Ok(false);
        };
        let recomputed = match event.recompute_hash() {
            Ok(h) => h,
            Err(_) => return Ok(false),
        };
        let sig_bytes = hex::decode(signature).map_err(|e| SigningError::MalformedSignature {
            event_id: event.event_id.clone(),
            reason: e.to_string(),
        })?;

        let digest = recomputed.as_bytes();
        retry_with_backoff(&self.retry, "verify", || {
            timed("verify", digest.len(), self.custody.verify(key_id, digest, &sig_bytes))
        })
        .await
        .map_err(|e| SigningError::from_retry(key_id, e))
    }

    /// Seal a payload under the signer's key.
    pub async fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SigningError> {
        retry_with_backoff(&self.retry, "encrypt", || {
            timed("encrypt", plaintext.len(), self.custody.encrypt(&self.key_id, plaintext))
        })
        .await
        .map_err(|e| SigningError::from_retry(&self.key_id, e))
    }

    pub async fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SigningError> {
        retry_with_backoff(&self.retry, "decrypt", || {
            timed("decrypt", ciphertext.len(), self.custody.decrypt(&self.key_id, ciphertext))
        })
        .await
        .map_err(|e| SigningError::from_retry(&self.key_id, e))
    }
}

async fn timed<T>(
    op: &'static str,
    payload_len: usize,
    call: impl Future<Output = Result<T, CustodyError>>,
) -> Result<T, CustodyError> {
    let start = Instant::now();
    let result = call.await;
    let success = if result.is_ok() { "true" } else { "false" };
    metrics::histogram!(
        "neural_ledger_signer_duration_seconds",
        start.elapsed().as_secs_f64(),
        "op" => op,
        "success" => success
    );
    metrics::histogram!(
        "neural_ledger_signer_payload_bytes",
        payload_len as f64,
        "op" => op,
        "success" => success
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use neural_ledger_core::canonical::MetadataLimits;
    use neural_ledger_core::{EventRequest, EventType, GENESIS_HASH};
    use chrono::Utc;
    use std::time::Duration;

    async fn signer() -> EventSigner {
        let custody = LocalKeyCustody::new();
        custody.generate_key("ledger/test").await;
        EventSigner::new(Arc::new(custody), "ledger/test", RetryPolicy::once(Duration::from_secs(1)))
    }

    fn exported_event() -> LedgerEvent {
        EventRequest::new(EventType::DataExported)
            .session("s-1")
            .user("u-1")
            .meta("destination", "s3://bucket")
            .into_draft(&MetadataLimits::default())
            .unwrap()
            .link(0, Utc::now(), GENESIS_HASH)
    }

    #[tokio::test]
    async fn test_signature_verifies_until_mutated() {
        let signer = signer().await;
        let event = exported_event();
        let sig = signer.sign_event_hash(&event.event_hash).await.unwrap();
        let signed = event.with_signature(sig.key_id, sig.signature);

        assert!(signer.verify_event(&signed).await.unwrap());

        let mut mutated = signed.clone();
        mutated.user_id = Some("u-2".into());
        assert!(!signer.verify_event(&mutated).await.unwrap());

        let mut unsigned = signed;
        unsigned.signature = None;
        assert!(!signer.verify_event(&unsigned).await.unwrap());
    }

    #[tokio::test]
    async fn test_seal_roundtrip() {
        let signer = signer().await;
        let sealed = signer.seal(b"phi payload").await.unwrap();
        assert_ne!(sealed.as_slice(), b"phi payload");
        assert_eq!(signer.open(&sealed).await.unwrap(), b"phi payload");
    }

    #[tokio::test]
    async fn test_unknown_key_is_terminal() {
        let custody = Arc::new(LocalKeyCustody::new());
        let signer = EventSigner::new(custody, "ledger/missing", RetryPolicy::default());
        let err = signer.sign_event_hash(&GENESIS_HASH).await.unwrap_err();
        assert!(matches!(
            err,
            SigningError::Rejected { source: CustodyError::KeyNotFound(_), .. }
        ));
    }
}
