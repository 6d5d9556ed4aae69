// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Maximum size in bytes of the canonical metadata encoding.
pub const MAX_METADATA_BYTES: usize = 64 * 1024;

/// Maximum nesting depth of a metadata value.
pub const MAX_METADATA_DEPTH: usize = 16;

/// Domain separator for per-event hashes. Bump the suffix on any change
/// to the hash input layout.
pub const EVENT_HASH_DOMAIN: &[u8] = b"neural-ledger/event/v1";

/// Partition used by keyed stores for events without a session.
pub const LEDGER_PARTITION: &str = "ledger";
