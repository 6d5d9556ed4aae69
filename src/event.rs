// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger Event Model
//!
//! `LedgerEvent` is the canonical record of one compliance-relevant action.
//! It is built exactly once, by linking an [`EventDraft`] onto the chain
//! tail, and is never mutated afterwards.
//!
//! # Invariants
//! - `event_hash` is a pure function of the stored fields
//! - `previous_hash` is the `event_hash` of the event at `sequence - 1`
//! - metadata is hashed in its canonical (JCS) form, never insertion order

use crate::canonical::{canonical_bytes, canonicalize, MetadataLimits};
use crate::error::{CoreError, CoreResult};
use crate::hash::{compute_event_hash, EventContent, EventHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Open key → JSON value map attached to every event.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Closed vocabulary of ledger actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EventType {
    SessionCreated,
    SessionStarted,
    SessionEnded,
    DataIngested,
    DataExported,
    DataDeleted,
    ModelInference,
    AuthSuccess,
    AuthFailure,
    AccessGranted,
    AccessDenied,
    ConsentGranted,
    ConsentWithdrawn,
    DeviceConnected,
    DeviceDisconnected,
    ConfigChanged,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::SessionCreated,
        EventType::SessionStarted,
        EventType::SessionEnded,
        EventType::DataIngested,
        EventType::DataExported,
        EventType::DataDeleted,
        EventType::ModelInference,
        EventType::AuthSuccess,
        EventType::AuthFailure,
        EventType::AccessGranted,
        EventType::AccessDenied,
        EventType::ConsentGranted,
        EventType::ConsentWithdrawn,
        EventType::DeviceConnected,
        EventType::DeviceDisconnected,
        EventType::ConfigChanged,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionCreated => "SESSION_CREATED",
            EventType::SessionStarted => "SESSION_STARTED",
            EventType::SessionEnded => "SESSION_ENDED",
            EventType::DataIngested => "DATA_INGESTED",
            EventType::DataExported => "DATA_EXPORTED",
            EventType::DataDeleted => "DATA_DELETED",
            EventType::ModelInference => "MODEL_INFERENCE",
            EventType::AuthSuccess => "AUTH_SUCCESS",
            EventType::AuthFailure => "AUTH_FAILURE",
            EventType::AccessGranted => "ACCESS_GRANTED",
            EventType::AccessDenied => "ACCESS_DENIED",
            EventType::ConsentGranted => "CONSENT_GRANTED",
            EventType::ConsentWithdrawn => "CONSENT_WITHDRAWN",
            EventType::DeviceConnected => "DEVICE_CONNECTED",
            EventType::DeviceDisconnected => "DEVICE_DISCONNECTED",
            EventType::ConfigChanged => "CONFIG_CHANGED",
        }
    }

    /// Events that touch protected health information.
    pub fn is_phi_access(&self) -> bool {
        matches!(
            self,
            EventType::DataIngested
                | EventType::DataExported
                | EventType::DataDeleted
                | EventType::ModelInference
                | EventType::AccessGranted
        )
    }

    /// Events that process a subject's data and therefore need consent.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            EventType::DataIngested | EventType::DataExported | EventType::ModelInference
        )
    }

    pub fn is_consent(&self) -> bool {
        matches!(self, EventType::ConsentGranted | EventType::ConsentWithdrawn)
    }

    pub fn is_session_lifecycle(&self) -> bool {
        matches!(
            self,
            EventType::SessionCreated | EventType::SessionStarted | EventType::SessionEnded
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownEventType(s.to_string()))
    }
}

/// Unvalidated input to the ledger: what a producer wants recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub event_type: EventType,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub data_hash: Option<String>,
    pub size_bytes: Option<u64>,
    pub metadata: Metadata,
}

impl EventRequest {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            session_id: None,
            device_id: None,
            user_id: None,
            data_hash: None,
            size_bytes: None,
            metadata: Metadata::new(),
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn data(mut self, data_hash: impl Into<String>, size_bytes: u64) -> Self {
        self.data_hash = Some(data_hash.into());
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and canonicalize. Assigns the event id.
    pub fn into_draft(self, limits: &MetadataLimits) -> CoreResult<EventDraft> {
        for (name, value) in [
            ("session_id", &self.session_id),
            ("device_id", &self.device_id),
            ("user_id", &self.user_id),
            ("data_hash", &self.data_hash),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(CoreError::Validation(format!("{} must not be blank", name)));
            }
        }

        let canonical_metadata = canonicalize(&self.metadata, limits)?;

        Ok(EventDraft {
            event_id: Uuid::new_v4().to_string(),
            event_type: self.event_type,
            session_id: self.session_id,
            device_id: self.device_id,
            user_id: self.user_id,
            data_hash: self.data_hash,
            size_bytes: self.size_bytes,
            metadata: self.metadata,
            canonical_metadata,
        })
    }
}

/// A validated event waiting for its position in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_id: String,
    pub event_type: EventType,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub data_hash: Option<String>,
    pub size_bytes: Option<u64>,
    pub metadata: Metadata,
    canonical_metadata: Vec<u8>,
}

impl EventDraft {
    pub fn canonical_metadata(&self) -> &[u8] {
        &self.canonical_metadata
    }

    /// Bind the draft to a chain position and compute its hash.
    pub fn link(self, sequence: u64, timestamp: DateTime<Utc>, previous_hash: EventHash) -> LedgerEvent {
        let content = EventContent {
            event_id: &self.event_id,
            sequence,
            event_type: self.event_type,
            timestamp,
            session_id: self.session_id.as_deref(),
            device_id: self.device_id.as_deref(),
            user_id: self.user_id.as_deref(),
            data_hash: self.data_hash.as_deref(),
            size_bytes: self.size_bytes,
            canonical_metadata: &self.canonical_metadata,
        };
        let event_hash = compute_event_hash(&content, &previous_hash);

        LedgerEvent {
            event_id: self.event_id,
            sequence,
            event_type: self.event_type,
            timestamp,
            session_id: self.session_id,
            device_id: self.device_id,
            user_id: self.user_id,
            data_hash: self.data_hash,
            size_bytes: self.size_bytes,
            metadata: self.metadata,
            previous_hash,
            event_hash,
            signature: None,
            signing_key_id: None,
        }
    }
}

/// An admitted, hash-linked ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: String,
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub metadata: Metadata,
    pub previous_hash: EventHash,
    pub event_hash: EventHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
}

impl LedgerEvent {
    /// Attach a signature over `event_hash`. Only the sequencer calls this,
    /// before the event is published.
    pub fn with_signature(mut self, signing_key_id: impl Into<String>, signature: impl Into<String>) -> Self {
        self.signing_key_id = Some(signing_key_id.into());
        self.signature = Some(signature.into());
        self
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && self.signing_key_id.is_some()
    }

    /// Recompute the hash from the stored fields.
    pub fn recompute_hash(&self) -> CoreResult<EventHash> {
        let canonical = canonical_bytes(&self.metadata)?;
        let content = EventContent {
            event_id: &self.event_id,
            sequence: self.sequence,
            event_type: self.event_type,
            timestamp: self.timestamp,
            session_id: self.session_id.as_deref(),
            device_id: self.device_id.as_deref(),
            user_id: self.user_id.as_deref(),
            data_hash: self.data_hash.as_deref(),
            size_bytes: self.size_bytes,
            canonical_metadata: &canonical,
        };
        Ok(compute_event_hash(&content, &self.previous_hash))
    }

    /// True when the stored hash matches the stored fields.
    pub fn verify_hash(&self) -> bool {
        matches!(self.recompute_hash(), Ok(h) if h == self.event_hash)
    }
}
