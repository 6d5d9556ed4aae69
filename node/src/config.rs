// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::retry::RetryPolicy;
use neural_ledger_core::canonical::MetadataLimits;
use neural_ledger_core::{CriticalEventPolicy, EventType};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SIGNING_KEY_ID: &str = "ledger/signing/primary";
pub const DEFAULT_TOPIC: &str = "neural-ledger.events";
pub const ARCHIVE_TABLE: &str = "ledger_events";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {var} ({value:?}): {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Event types that must be signed before admission.
    pub critical_event_types: BTreeSet<EventType>,
    pub signing_key_id: String,
    pub topic: String,
    pub channel_capacity: usize,
    /// Depth of the sequencer's request queue.
    pub request_queue_depth: usize,
    pub fanout_workers: usize,
    pub metadata_limits: MetadataLimits,
    pub signer_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
    pub storage_retry: RetryPolicy,
    /// Where the chain tail is persisted. `None` keeps it in memory.
    pub tail_path: Option<PathBuf>,
    /// Filesystem root for the archive. `None` uses an in-memory operator.
    pub archive_root: Option<PathBuf>,
    /// Merkle checkpoint cadence. `None` disables periodic checkpoints.
    pub checkpoint_interval: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            critical_event_types: CriticalEventPolicy::default().types().clone(),
            signing_key_id: DEFAULT_SIGNING_KEY_ID.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            channel_capacity: 10_000,
            request_queue_depth: 1_024,
            fanout_workers: 32,
            metadata_limits: MetadataLimits::default(),
            signer_retry: RetryPolicy::new(
                3,
                Duration::from_millis(10),
                Duration::from_millis(200),
                Duration::from_secs(2),
            ),
            publish_retry: RetryPolicy::new(
                5,
                Duration::from_millis(5),
                Duration::from_millis(100),
                Duration::from_secs(1),
            ),
            storage_retry: RetryPolicy::new(
                4,
                Duration::from_millis(20),
                Duration::from_secs(1),
                Duration::from_secs(5),
            ),
            tail_path: None,
            archive_root: None,
            checkpoint_interval: None,
        }
    }
}

impl LedgerConfig {
    pub fn critical_policy(&self) -> CriticalEventPolicy {
        CriticalEventPolicy::new(self.critical_event_types.iter().copied())
    }

    /// Defaults overridden by `NEURAL_LEDGER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`LedgerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("NEURAL_LEDGER_CRITICAL_EVENTS") {
            let mut types = BTreeSet::new();
            for name in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let t = EventType::from_str(name).map_err(|e| ConfigError {
                    var: "NEURAL_LEDGER_CRITICAL_EVENTS",
                    value: v.clone(),
                    reason: e.to_string(),
                })?;
                types.insert(t);
            }
            cfg.critical_event_types = types;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_SIGNING_KEY_ID") {
            cfg.signing_key_id = v;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_TOPIC") {
            cfg.topic = v;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_CHANNEL_CAPACITY") {
            cfg.channel_capacity = parse_positive("NEURAL_LEDGER_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_QUEUE_DEPTH") {
            cfg.request_queue_depth = parse_positive("NEURAL_LEDGER_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_FANOUT_WORKERS") {
            cfg.fanout_workers = parse_positive("NEURAL_LEDGER_FANOUT_WORKERS", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_MAX_METADATA_BYTES") {
            cfg.metadata_limits.max_bytes = parse_positive("NEURAL_LEDGER_MAX_METADATA_BYTES", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_MAX_METADATA_DEPTH") {
            cfg.metadata_limits.max_depth = parse_positive("NEURAL_LEDGER_MAX_METADATA_DEPTH", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_SIGNER_MAX_ATTEMPTS") {
            cfg.signer_retry.max_attempts = parse_positive("NEURAL_LEDGER_SIGNER_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_PUBLISH_MAX_ATTEMPTS") {
            cfg.publish_retry.max_attempts = parse_positive("NEURAL_LEDGER_PUBLISH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_STORAGE_MAX_ATTEMPTS") {
            cfg.storage_retry.max_attempts = parse_positive("NEURAL_LEDGER_STORAGE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("NEURAL_LEDGER_TAIL_PATH") {
            cfg.tail_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NEURAL_LEDGER_ARCHIVE_ROOT") {
            cfg.archive_root = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NEURAL_LEDGER_CHECKPOINT_INTERVAL_SECS") {
            let secs: u64 = parse_positive("NEURAL_LEDGER_CHECKPOINT_INTERVAL_SECS", &v)?;
            cfg.checkpoint_interval = Some(Duration::from_secs(secs));
        }

        Ok(cfg)
    }
}

fn parse_positive<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>().map_err(|e| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
