// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Metadata or request fields failed validation. Raised before any
    /// hash is computed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid hash encoding: {0}")]
    InvalidHash(String),

    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub type CoreResult<T> = core::result::Result<T, CoreError>;
