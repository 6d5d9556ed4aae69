// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Merkle Checkpoints
//!
//! A checkpoint attests to an ordered batch of event hashes with a single
//! root, so a verifier can check a whole window without replaying the
//! chain event by event.
//!
//! Tree hashing follows RFC 6962 with BLAKE3:
//! ```text
//! leaf  = H(0x00 || event_hash)
//! node  = H(0x01 || left || right)
//! split = largest power of two strictly below n
//! empty = H("")
//! ```
//! No leaf is duplicated, so `[a, b, c]` and `[a, b, c, c]` have
//! different roots.

use crate::event::LedgerEvent;
use crate::filter::TimeWindow;
use crate::hash::EventHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

fn leaf_hash(h: &EventHash) -> EventHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(h.as_bytes());
    EventHash(*hasher.finalize().as_bytes())
}

fn node_hash(left: &EventHash, right: &EventHash) -> EventHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    EventHash(*hasher.finalize().as_bytes())
}

fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// Root over an ordered batch of event hashes.
pub fn compute_merkle_root(hashes: &[EventHash]) -> EventHash {
    match hashes.len() {
        0 => EventHash(*blake3::hash(&[]).as_bytes()),
        1 => leaf_hash(&hashes[0]),
        n => {
            let k = split_point(n);
            node_hash(&compute_merkle_root(&hashes[..k]), &compute_merkle_root(&hashes[k..]))
        }
    }
}

/// One sibling on an inclusion path, bottom-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStep {
    Left(EventHash),
    Right(EventHash),
}

/// Inclusion path for `hashes[index]`, or `None` when out of range.
pub fn inclusion_proof(hashes: &[EventHash], index: usize) -> Option<Vec<ProofStep>> {
    if index >= hashes.len() {
        return None;
    }
    Some(audit_path(hashes, index))
}

fn audit_path(hashes: &[EventHash], index: usize) -> Vec<ProofStep> {
    if hashes.len() <= 1 {
        return Vec::new();
    }
    let k = split_point(hashes.len());
    if index < k {
        let mut path = audit_path(&hashes[..k], index);
        path.push(ProofStep::Right(compute_merkle_root(&hashes[k..])));
        path
    } else {
        let mut path = audit_path(&hashes[k..], index - k);
        path.push(ProofStep::Left(compute_merkle_root(&hashes[..k])));
        path
    }
}

/// Check that `leaf` is included under `root` via `path`.
pub fn verify_inclusion(leaf: &EventHash, path: &[ProofStep], root: &EventHash) -> bool {
    let mut acc = leaf_hash(leaf);
    for step in path {
        acc = match step {
            ProofStep::Left(sibling) => node_hash(sibling, &acc),
            ProofStep::Right(sibling) => node_hash(&acc, sibling),
        };
    }
    acc == *root
}

/// Batch attestation over the events of one window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub window: TimeWindow,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub event_count: u64,
    pub merkle_root: EventHash,
    pub last_event_hash: Option<EventHash>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Build from events already ordered by sequence.
    pub fn from_events(window: TimeWindow, events: &[LedgerEvent], created_at: DateTime<Utc>) -> Self {
        let hashes: Vec<EventHash> = events.iter().map(|e| e.event_hash).collect();
        Self {
            window,
            first_sequence: events.first().map(|e| e.sequence),
            last_sequence: events.last().map(|e| e.sequence),
            event_count: events.len() as u64,
            merkle_root: compute_merkle_root(&hashes),
            last_event_hash: events.last().map(|e| e.event_hash),
            created_at,
        }
    }

    /// Stable id derived from the covered range.
    pub fn id(&self) -> String {
        match (self.first_sequence, self.last_sequence) {
            (Some(first), Some(last)) => format!("{:020}-{:020}", first, last),
            _ => format!("empty-{}", self.window.start.timestamp_micros()),
        }
    }

    /// Two checkpoints attest to the same batch. `created_at` may differ.
    pub fn matches(&self, other: &Checkpoint) -> bool {
        self.window == other.window
            && self.first_sequence == other.first_sequence
            && self.last_sequence == other.last_sequence
            && self.event_count == other.event_count
            && self.merkle_root == other.merkle_root
            && self.last_event_hash == other.last_event_hash
    }
}
