// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Failed durability writes waiting to be retried.

use crate::errors::StorageWriteError;
use crate::storage::Backend;
use chrono::{DateTime, Utc};
use neural_ledger_core::LedgerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub event: LedgerEvent,
    pub backend: Backend,
    pub last_error: String,
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub attempted: usize,
    pub repaired: usize,
    pub still_pending: usize,
}

/// One entry per (event_id, backend). A repeated failure updates the entry.
#[derive(Clone, Default)]
pub struct ReconciliationQueue {
    pending: Arc<Mutex<HashMap<(String, Backend), PendingWrite>>>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: &LedgerEvent, failure: &StorageWriteError) {
        let mut pending = self.pending.lock().await;
        pending
            .entry((event.event_id.clone(), failure.backend))
            .and_modify(|p| {
                p.last_error = failure.source.to_string();
                p.attempts += failure.attempts;
            })
            .or_insert_with(|| PendingWrite {
                event: event.clone(),
                backend: failure.backend,
                last_error: failure.source.to_string(),
                attempts: failure.attempts,
                first_failed_at: Utc::now(),
            });
        metrics::gauge!("neural_ledger_reconciliation_backlog", pending.len() as f64);
    }

    pub async fn resolve(&self, event_id: &str, backend: Backend) {
        let mut pending = self.pending.lock().await;
        pending.remove(&(event_id.to_string(), backend));
        metrics::gauge!("neural_ledger_reconciliation_backlog", pending.len() as f64);
    }

    /// Pending writes in chain order.
    pub async fn snapshot(&self) -> Vec<PendingWrite> {
        let mut writes: Vec<PendingWrite> = self.pending.lock().await.values().cloned().collect();
        writes.sort_by(|a, b| {
            (a.event.sequence, a.backend, &a.event.event_id).cmp(&(b.event.sequence, b.backend, &b.event.event_id))
        });
        writes
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
