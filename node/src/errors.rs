// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::ledger::tail::TailStoreError;
use crate::retry::{RetryError, Transient};
use crate::storage::Backend;
use neural_ledger_core::{CoreError, IntegrityViolation};
use std::time::Duration;
use thiserror::Error;

/// Top-level error returned by the ledger and query paths.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(#[from] CoreError),
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("Storage write error: {0}")]
    StorageWrite(#[from] StorageWriteError),
    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),
    #[error("Tail store error: {0}")]
    Tail(#[from] TailStoreError),
    #[error("Archive error: {0}")]
    Archive(#[from] StorageError),
    #[error("Ledger has shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors reported by a key-custody backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("custody service unavailable: {0}")]
    Transient(String),
    #[error("custody service throttled the request")]
    Throttled,
    #[error("custody call timed out after {0:?}")]
    Timeout(Duration),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("permission denied for key: {0}")]
    PermissionDenied(String),
    #[error("ciphertext rejected")]
    InvalidCiphertext,
}

impl Transient for CustodyError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            CustodyError::Transient(_) | CustodyError::Throttled | CustodyError::Timeout(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        CustodyError::Timeout(after)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("signing aborted for key {key_id}: {source}")]
    Rejected {
        key_id: String,
        #[source]
        source: CustodyError,
    },
    #[error("signing failed for key {key_id} after {attempts} attempt(s): {source}")]
    Exhausted {
        key_id: String,
        attempts: u32,
        #[source]
        source: CustodyError,
    },
    #[error("malformed signature on event {event_id}: {reason}")]
    MalformedSignature { event_id: String, reason: String },
}

impl SigningError {
    pub(crate) fn from_retry(key_id: &str, err: RetryError<CustodyError>) -> Self {
        match err {
            RetryError::Terminal { source, .. } => SigningError::Rejected {
                key_id: key_id.to_string(),
                source,
            },
            RetryError::Exhausted { attempts, source } => SigningError::Exhausted {
                key_id: key_id.to_string(),
                attempts,
                source,
            },
        }
    }
}

/// Errors reported by a message channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is full")]
    Full,
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("channel is closed")]
    Closed,
}

impl Transient for ChannelError {
    fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Full | ChannelError::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        ChannelError::Timeout(after)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("event could not be encoded: {0}")]
    Encode(String),
    #[error("publish to {topic} rejected: {source}")]
    Rejected {
        topic: String,
        #[source]
        source: ChannelError,
    },
    #[error("publish to {topic} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        topic: String,
        attempts: u32,
        #[source]
        source: ChannelError,
    },
}

impl PublishError {
    pub(crate) fn from_retry(topic: &str, err: RetryError<ChannelError>) -> Self {
        match err {
            RetryError::Terminal { source, .. } => PublishError::Rejected {
                topic: topic.to_string(),
                source,
            },
            RetryError::Exhausted { attempts, source } => PublishError::Exhausted {
                topic: topic.to_string(),
                attempts,
                source,
            },
        }
    }
}

/// Errors reported by a storage port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend rejected the write: {0}")]
    Rejected(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        StorageError::Timeout(after)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// One failed durability write, as recorded for reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{backend} write of event {event_id} failed after {attempts} attempt(s): {source}")]
pub struct StorageWriteError {
    pub backend: Backend,
    pub event_id: String,
    pub attempts: u32,
    #[source]
    pub source: StorageError,
}
