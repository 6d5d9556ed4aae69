// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bounded retry with exponential backoff.
//!
//! Every call that leaves the process (key custody, channel publish,
//! storage writes) goes through [`retry_with_backoff`]. Each attempt is
//! capped by `attempt_timeout`; the whole call is capped by
//! `max_attempts`, so no caller can wait forever.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            attempt_timeout,
        }
    }

    /// Single attempt, no backoff.
    pub const fn once(attempt_timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, attempt_timeout)
    }

    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10), Duration::from_millis(250), Duration::from_secs(2))
    }
}

/// Classification hook for errors that may succeed on a later attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// The error to report when an attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// A non-retryable error ended the call.
    #[error("terminal failure after {attempts} attempt(s): {source}")]
    Terminal {
        attempts: u32,
        #[source]
        source: E,
    },

    /// Every attempt failed with a transient error.
    #[error("retries exhausted after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Terminal { attempts, .. } | RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Terminal { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryError::Terminal { .. })
    }
}

/// Run `op` until it succeeds, fails terminally, or the policy is spent.
///
/// `op_name` labels the `neural_ledger_retries_total` counter.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Transient + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.attempt_timeout)),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_transient() {
            return Err(RetryError::Terminal {
                attempts: attempt,
                source: err,
            });
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.backoff_for(attempt);
        tracing::debug!("{} attempt {} failed ({}), retrying in {:?}", op_name, attempt, err, delay);
        metrics::counter!("neural_ledger_retries_total", 1, "op" => op_name);
        tokio::time::sleep(delay).await;
    }
}
