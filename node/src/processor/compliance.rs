// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Compliance hooks run by the fan-out processor on every delivered event.

use chrono::{DateTime, Utc};
use neural_ledger_core::{CriticalEventPolicy, LedgerEvent};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_ALERT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceAlert {
    pub kind: String,
    pub event_id: String,
    pub sequence: u64,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl ComplianceAlert {
    pub fn new(kind: &str, event: &LedgerEvent, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            event_id: event.event_id.clone(),
            sequence: event.sequence,
            detail: detail.into(),
            raised_at: Utc::now(),
        }
    }
}

pub trait ComplianceHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn inspect(&self, event: &LedgerEvent) -> Vec<ComplianceAlert>;
}

/// Flags critical events that arrive without a signature.
pub struct MissingSignatureHook {
    policy: CriticalEventPolicy,
}

impl MissingSignatureHook {
    pub fn new(policy: CriticalEventPolicy) -> Self {
        Self { policy }
    }
}

impl ComplianceHook for MissingSignatureHook {
    fn name(&self) -> &'static str {
        "missing_signature"
    }

    fn inspect(&self, event: &LedgerEvent) -> Vec<ComplianceAlert> {
        if self.policy.requires_signature(event.event_type) && !event.is_signed() {
            vec![ComplianceAlert::new(
                self.name(),
                event,
                format!("critical event {} missing signature", event.event_type),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Flags events whose stored hash does not match their fields.
pub struct HashIntegrityHook;

impl ComplianceHook for HashIntegrityHook {
    fn name(&self) -> &'static str {
        "hash_mismatch"
    }

    fn inspect(&self, event: &LedgerEvent) -> Vec<ComplianceAlert> {
        match event.recompute_hash() {
            Ok(h) if h == event.event_hash => Vec::new(),
            Ok(h) => vec![ComplianceAlert::new(
                self.name(),
                event,
                format!("stored {} recomputed {}", event.event_hash, h),
            )],
            Err(e) => vec![ComplianceAlert::new(self.name(), event, e.to_string())],
        }
    }
}

/// Bounded in-memory log of alerts, oldest dropped first.
#[derive(Clone)]
pub struct AlertLog {
    alerts: Arc<Mutex<VecDeque<ComplianceAlert>>>,
    capacity: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            alerts: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, alert: ComplianceAlert) {
        tracing::warn!(
            "Compliance alert [{}] on event {} (seq {}): {}",
            alert.kind,
            alert.event_id,
            alert.sequence,
            alert.detail
        );
        metrics::counter!("neural_ledger_compliance_alerts_total", 1, "kind" => alert.kind.clone());
        let mut alerts = self.alerts.lock().await;
        if alerts.len() == self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    pub async fn snapshot(&self) -> Vec<ComplianceAlert> {
        self.alerts.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.alerts.lock().await.len()
    }
}
