// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain Verification
//!
//! Recomputes every hash in an ordered run of events and checks the
//! links between them. This is the pure half of an integrity audit;
//! signature validity needs key custody and is checked by the node.
//!
//! **Scope**: hashes, links, sequence continuity, genesis anchoring and
//! presence of signatures on critical events.

use crate::event::{EventType, LedgerEvent};
use crate::hash::{EventHash, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Event types that must carry a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalEventPolicy {
    types: BTreeSet<EventType>,
}

impl CriticalEventPolicy {
    pub fn new(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    pub fn requires_signature(&self, event_type: EventType) -> bool {
        self.types.contains(&event_type)
    }

    pub fn types(&self) -> &BTreeSet<EventType> {
        &self.types
    }
}

impl Default for CriticalEventPolicy {
    fn default() -> Self {
        Self::new([EventType::DataExported])
    }
}

/// What the first event of a verified run must link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAnchor {
    /// The run starts the ledger: sequence 0, genesis previous hash.
    Genesis,
    /// The run continues from a known event hash.
    Trusted(EventHash),
    /// Mid-chain window with no known predecessor. Genesis is still
    /// enforced when the run happens to start at sequence 0.
    Unanchored,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    #[error("hash mismatch at event {event_id} (seq {sequence}): stored {stored}, recomputed {recomputed}")]
    HashMismatch {
        event_id: String,
        sequence: u64,
        stored: EventHash,
        recomputed: EventHash,
    },

    #[error("hash-chain break detected at event {event_id} (seq {sequence}): expected previous {expected}, found {found}")]
    BrokenLink {
        event_id: String,
        sequence: u64,
        expected: EventHash,
        found: EventHash,
    },

    #[error("sequence gap after {after}: next stored event is {next}")]
    SequenceGap { after: u64, next: u64 },

    #[error("first event {event_id} does not link to genesis")]
    GenesisMismatch { event_id: String, found: EventHash },

    #[error("critical event {event_id} ({event_type}) missing signature")]
    MissingSignature { event_id: String, event_type: EventType },

    #[error("signature on event {event_id} does not verify")]
    InvalidSignature { event_id: String },

    #[error("event {event_id} could not be re-hashed: {reason}")]
    Malformed { event_id: String, reason: String },
}

impl IntegrityViolation {
    pub fn code(&self) -> &'static str {
        match self {
            IntegrityViolation::HashMismatch { .. } => "HASH_MISMATCH",
            IntegrityViolation::BrokenLink { .. } => "BROKEN_LINK",
            IntegrityViolation::SequenceGap { .. } => "SEQUENCE_GAP",
            IntegrityViolation::GenesisMismatch { .. } => "GENESIS_MISMATCH",
            IntegrityViolation::MissingSignature { .. } => "MISSING_SIGNATURE",
            IntegrityViolation::InvalidSignature { .. } => "INVALID_SIGNATURE",
            IntegrityViolation::Malformed { .. } => "MALFORMED_EVENT",
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            IntegrityViolation::HashMismatch { event_id, .. }
            | IntegrityViolation::BrokenLink { event_id, .. }
            | IntegrityViolation::GenesisMismatch { event_id, .. }
            | IntegrityViolation::MissingSignature { event_id, .. }
            | IntegrityViolation::InvalidSignature { event_id }
            | IntegrityViolation::Malformed { event_id, .. } => Some(event_id),
            IntegrityViolation::SequenceGap { .. } => None,
        }
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            IntegrityViolation::HashMismatch { sequence, .. }
            | IntegrityViolation::BrokenLink { sequence, .. } => Some(*sequence),
            IntegrityViolation::SequenceGap { next, .. } => Some(*next),
            _ => None,
        }
    }
}

/// Outcome of [`verify_chain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub checked: usize,
    pub violations: Vec<IntegrityViolation>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Verify a run of events ordered by sequence.
pub fn verify_chain(
    events: &[LedgerEvent],
    anchor: ChainAnchor,
    policy: &CriticalEventPolicy,
) -> ChainVerification {
    let mut violations = Vec::new();

    for (i, event) in events.iter().enumerate() {
        match event.recompute_hash() {
            Ok(recomputed) if recomputed != event.event_hash => {
                violations.push(IntegrityViolation::HashMismatch {
                    event_id: event.event_id.clone(),
                    sequence: event.sequence,
                    stored: event.event_hash,
                    recomputed,
                });
            }
            Ok(_) => {}
            Err(e) => violations.push(IntegrityViolation::Malformed {
                event_id: event.event_id.clone(),
                reason: e.to_string(),
            }),
        }

        if i == 0 {
            check_anchor(event, anchor, &mut violations);
        } else {
            let prev = &events[i - 1];
            if event.sequence != prev.sequence + 1 {
                violations.push(IntegrityViolation::SequenceGap {
                    after: prev.sequence,
                    next: event.sequence,
                });
            } else if event.previous_hash != prev.event_hash {
                violations.push(IntegrityViolation::BrokenLink {
                    event_id: event.event_id.clone(),
                    sequence: event.sequence,
                    expected: prev.event_hash,
                    found: event.previous_hash,
                });
            }
        }

        if policy.requires_signature(event.event_type) && !event.is_signed() {
            violations.push(IntegrityViolation::MissingSignature {
                event_id: event.event_id.clone(),
                event_type: event.event_type,
            });
        }
    }

    ChainVerification {
        checked: events.len(),
        violations,
    }
}

fn check_anchor(first: &LedgerEvent, anchor: ChainAnchor, violations: &mut Vec<IntegrityViolation>) {
    match anchor {
        ChainAnchor::Genesis => {
            if first.sequence != 0 {
                violations.push(IntegrityViolation::SequenceGap {
                    after: 0,
                    next: first.sequence,
                });
            }
            if first.previous_hash != GENESIS_HASH {
                violations.push(IntegrityViolation::GenesisMismatch {
                    event_id: first.event_id.clone(),
                    found: first.previous_hash,
                });
            }
        }
        ChainAnchor::Trusted(expected) => {
            if first.previous_hash != expected {
                violations.push(IntegrityViolation::BrokenLink {
                    event_id: first.event_id.clone(),
                    sequence: first.sequence,
                    expected,
                    found: first.previous_hash,
                });
            }
        }
        ChainAnchor::Unanchored => {
            if first.sequence == 0 && first.previous_hash != GENESIS_HASH {
                violations.push(IntegrityViolation::GenesisMismatch {
                    event_id: first.event_id.clone(),
                    found: first.previous_hash,
                });
            }
        }
    }
}
