// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Sustained-load driver for the append path.
//!
//! Every `interval` a batch of `batch_size` concurrent `log_event` calls is
//! fired; latencies are measured per call from the caller's side.

use crate::ledger::NeuralLedger;
use futures::future::join_all;
use neural_ledger_core::{EventRequest, EventType};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProfile {
    pub batch_size: usize,
    pub interval: Duration,
    pub duration: Duration,
}

impl LoadProfile {
    /// Batches of 10 concurrent calls every 100 ms for a minute.
    pub fn sustained() -> Self {
        Self {
            batch_size: 10,
            interval: Duration::from_millis(100),
            duration: Duration::from_secs(60),
        }
    }

    /// The sustained shape over a shorter `duration`.
    pub fn sustained_for(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::sustained()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub requests: usize,
    pub errors: usize,
    pub mean: Duration,
    pub p99: Duration,
    pub max: Duration,
    pub elapsed: Duration,
}

impl LoadStats {
    pub fn from_samples(mut latencies: Vec<Duration>, errors: usize, elapsed: Duration) -> Self {
        let requests = latencies.len();
        if requests == 0 {
            return Self {
                errors,
                elapsed,
                ..Self::default()
            };
        }
        latencies.sort_unstable();
        let total: Duration = latencies.iter().sum();
        // Nearest-rank percentile.
        let rank = (requests * 99).div_ceil(100);
        Self {
            requests,
            errors,
            mean: total / requests as u32,
            p99: latencies[rank.clamp(1, requests) - 1],
            max: latencies[requests - 1],
            elapsed,
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.requests.saturating_sub(self.errors) as f64 / secs
        }
    }
}

/// A realistic mix: mostly ingestion and inference, occasional export.
fn request(i: usize) -> EventRequest {
    let session = format!("load-session-{}", i % 16);
    let user = format!("load-user-{}", i % 64);
    match i % 10 {
        0 => EventRequest::new(EventType::DataExported)
            .session(session)
            .user(user)
            .meta("destination", "s3://load-test"),
        1..=5 => EventRequest::new(EventType::DataIngested)
            .session(session)
            .device(format!("load-device-{}", i % 8))
            .data(format!("sha256:{:064x}", i), 4096),
        _ => EventRequest::new(EventType::ModelInference)
            .session(session)
            .user(user)
            .meta("model_id", "decoder-v2"),
    }
}

/// Fire one concurrent batch and return per-call latencies and error count.
pub async fn run_batch(ledger: &NeuralLedger, batch_size: usize, offset: usize) -> (Vec<Duration>, usize) {
    let calls = (0..batch_size).map(|i| {
        let ledger = ledger.clone();
        async move {
            let start = Instant::now();
            let result = ledger.log_event(request(offset + i)).await;
            (start.elapsed(), result.is_ok())
        }
    });
    let results = join_all(calls.map(tokio::spawn)).await;

    let mut latencies = Vec::with_capacity(batch_size);
    let mut errors = 0;
    for result in results {
        match result {
            Ok((latency, ok)) => {
                latencies.push(latency);
                errors += usize::from(!ok);
            }
            Err(e) => {
                tracing::error!("Load task failed: {}", e);
                errors += 1;
            }
        }
    }
    (latencies, errors)
}

pub async fn run_load(ledger: &NeuralLedger, profile: LoadProfile) -> LoadStats {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(profile.interval);
    let mut latencies = Vec::new();
    let mut errors = 0;
    let mut sent = 0;

    while start.elapsed() < profile.duration {
        ticker.tick().await;
        let (batch, batch_errors) = run_batch(ledger, profile.batch_size, sent).await;
        sent += batch.len();
        latencies.extend(batch);
        errors += batch_errors;
        tracing::debug!("Load: {} calls sent, {} errors", sent, errors);
    }

    LoadStats::from_samples(latencies, errors, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_percentiles() {
        let samples: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        let stats = LoadStats::from_samples(samples, 2, Duration::from_secs(1));
        assert_eq!(stats.requests, 100);
        assert_eq!(stats.p99, Duration::from_millis(99));
        assert_eq!(stats.max, Duration::from_millis(100));
        assert_eq!(stats.mean, Duration::from_micros(50_500));
        assert!((stats.error_rate() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_sustained_profile_shape() {
        let profile = LoadProfile::sustained();
        assert_eq!(profile.batch_size, 10);
        assert_eq!(profile.interval, Duration::from_millis(100));
        assert_eq!(profile.duration, Duration::from_secs(60));

        let short = LoadProfile::sustained_for(Duration::from_secs(1));
        assert_eq!(short.batch_size, 10);
        assert_eq!(short.interval, Duration::from_millis(100));
    }

    #[test]
    fn test_empty_stats() {
        let stats = LoadStats::from_samples(Vec::new(), 0, Duration::ZERO);
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.error_rate(), 0.0);
        assert_eq!(stats.throughput(), 0.0);
    }
}
