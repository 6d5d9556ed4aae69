// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical BLAKE3 Event Hashing
//!
//! Every admitted event carries `event_hash = H(content || previous_hash)`.
//! The input layout is fixed and versioned by [`EVENT_HASH_DOMAIN`] so that
//! any implementation that follows it reproduces the same digests.
//!
//! # Hash Input Structure
//! ```text
//! domain ("neural-ledger/event/v1")
//! ↓
//! For each field, in this order:
//!   tag (u8)
//!   [presence (u8) for optional fields, 0 = absent]
//!   len (u64 LE) + bytes
//! ↓
//! event_id, sequence (u64 LE), event_type (name), timestamp (i64 LE micros),
//! session_id?, device_id?, user_id?, data_hash?, size_bytes? (u64 LE),
//! canonical metadata (JCS bytes), previous_hash (32 bytes)
//! ```

use crate::config::EVENT_HASH_DOMAIN;
use crate::error::CoreError;
use crate::event::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte BLAKE3 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct EventHash(pub [u8; 32]);

/// Previous-hash sentinel for the first event of a ledger.
pub const GENESIS_HASH: EventHash = EventHash([0u8; 32]);

impl EventHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_genesis(&self) -> bool {
        *self == GENESIS_HASH
    }

    /// Digest of arbitrary bytes. Used for data hashes and tests.
    pub fn digest(bytes: &[u8]) -> Self {
        EventHash(*blake3::hash(bytes).as_bytes())
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({})", self.to_hex())
    }
}

impl FromStr for EventHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CoreError::InvalidHash(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(EventHash(arr))
    }
}

impl Serialize for EventHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Borrowed view of every hashed field of an event except the chain link.
#[derive(Debug, Clone, Copy)]
pub struct EventContent<'a> {
    pub event_id: &'a str,
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub data_hash: Option<&'a str>,
    pub size_bytes: Option<u64>,
    pub canonical_metadata: &'a [u8],
}

mod tag {
    pub const EVENT_ID: u8 = 1;
    pub const SEQUENCE: u8 = 2;
    pub const EVENT_TYPE: u8 = 3;
    pub const TIMESTAMP: u8 = 4;
    pub const SESSION_ID: u8 = 5;
    pub const DEVICE_ID: u8 = 6;
    pub const USER_ID: u8 = 7;
    pub const DATA_HASH: u8 = 8;
    pub const SIZE_BYTES: u8 = 9;
    pub const METADATA: u8 = 10;
    pub const PREVIOUS_HASH: u8 = 11;
}

fn update_field(hasher: &mut blake3::Hasher, tag: u8, bytes: &[u8]) {
    hasher.update(&[tag]);
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn update_optional(hasher: &mut blake3::Hasher, tag: u8, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            hasher.update(&[tag, 1]);
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
        None => {
            hasher.update(&[tag, 0]);
        }
    }
}

/// Compute the chained hash of one event.
///
/// Pure and deterministic: identical inputs always give identical output,
/// and a change to any single field (metadata included) changes it.
pub fn compute_event_hash(content: &EventContent<'_>, previous_hash: &EventHash) -> EventHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(EVENT_HASH_DOMAIN);

    update_field(&mut hasher, tag::EVENT_ID, content.event_id.as_bytes());
    update_field(&mut hasher, tag::SEQUENCE, &content.sequence.to_le_bytes());
    update_field(&mut hasher, tag::EVENT_TYPE, content.event_type.as_str().as_bytes());
    update_field(
        &mut hasher,
        tag::TIMESTAMP,
        &content.timestamp.timestamp_micros().to_le_bytes(),
    );
    update_optional(&mut hasher, tag::SESSION_ID, content.session_id.map(str::as_bytes));
    update_optional(&mut hasher, tag::DEVICE_ID, content.device_id.map(str::as_bytes));
    update_optional(&mut hasher, tag::USER_ID, content.user_id.map(str::as_bytes));
    update_optional(&mut hasher, tag::DATA_HASH, content.data_hash.map(str::as_bytes));
    let size = content.size_bytes.map(u64::to_le_bytes);
    update_optional(&mut hasher, tag::SIZE_BYTES, size.as_ref().map(|b| b.as_slice()));
    update_field(&mut hasher, tag::METADATA, content.canonical_metadata);
    update_field(&mut hasher, tag::PREVIOUS_HASH, previous_hash.as_bytes());

    EventHash(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = EventHash::digest(b"neural");
        let parsed: EventHash = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
        assert_eq!(GENESIS_HASH.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_hash_rejects_bad_hex() {
        assert!("zz".parse::<EventHash>().is_err());
        assert!("abcd".parse::<EventHash>().is_err());
    }

    #[test]
    fn test_absent_and_empty_optional_differ() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let base = EventContent {
            event_id: "e-1",
            sequence: 0,
            event_type: EventType::SessionCreated,
            timestamp: ts,
            session_id: None,
            device_id: None,
            user_id: None,
            data_hash: None,
            size_bytes: None,
            canonical_metadata: b"{}",
        };
        let with_empty = EventContent { session_id: Some(""), ..base };
        assert_ne!(
            compute_event_hash(&base, &GENESIS_HASH),
            compute_event_hash(&with_empty, &GENESIS_HASH)
        );
    }
}
