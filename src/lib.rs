// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! neural-ledger-core: the deterministic half of the Neural Ledger.
//!
//! Everything in this crate is pure: the event model, canonical metadata
//! encoding, per-event hash linking, Merkle checkpoints and chain
//! verification. No I/O, no clocks except where a caller passes one in.

pub mod config;
pub mod error;
pub mod event;
pub mod canonical;
pub mod hash;
pub mod merkle;
pub mod filter;
pub mod verify;

pub use error::{CoreError, CoreResult};
pub use event::{EventDraft, EventRequest, EventType, LedgerEvent, Metadata};
pub use hash::{compute_event_hash, EventHash, GENESIS_HASH};
pub use merkle::{compute_merkle_root, Checkpoint};
pub use filter::{EventFilter, TimeWindow};
pub use verify::{verify_chain, ChainAnchor, ChainVerification, CriticalEventPolicy, IntegrityViolation};

#[cfg(test)]
pub mod tests;
