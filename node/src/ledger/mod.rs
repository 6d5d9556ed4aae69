// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger Append Coordinator
//!
//! `log_event` validates in the caller's task, then funnels the draft
//! through a bounded queue to the sequencer, the only owner of the chain
//! tail.
//!
//! # Guarantees
//! - one total order: `event[i].previous_hash == event[i-1].event_hash`
//! - critical events are signed before they are published
//! - a failed call (validation, signing, publish) leaves the tail unchanged
//! - dropping a caller's future never leaves a half-advanced tail

pub mod coordinator;
pub(crate) mod sequencer;
pub mod tail;

pub use coordinator::{LedgerDeps, NeuralLedger};
pub use tail::{ChainTail, FileTailStore, MemoryTailStore, TailStore, TailStoreError};
