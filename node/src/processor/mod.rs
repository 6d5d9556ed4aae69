// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durability Fan-out Processor
//!
//! Consumes admitted events from the channel and writes each one to the
//! keyed store, the document store and the archive.
//!
//! # Guarantees
//! - the three writes for one event run concurrently and independently;
//!   a failing backend never blocks or rolls back the others
//! - every write is keyed by `event_id`, so redelivery is harmless
//! - failures never reach the `log_event` caller: they are counted,
//!   logged and queued for [`FanOutProcessor::reconcile`]

pub mod compliance;
pub mod reconcile;

pub use compliance::{AlertLog, ComplianceAlert, ComplianceHook, HashIntegrityHook, MissingSignatureHook};
pub use reconcile::{PendingWrite, ReconcileSummary, ReconciliationQueue};

use crate::channel::{ChannelSubscription, Delivery};
use crate::config::{LedgerConfig, ARCHIVE_TABLE};
use crate::errors::{StorageError, StorageWriteError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::storage::{
    event_document, AnalyticsSink, Backend, Document, DocumentStore, KeyedStore, MemoryAnalyticsSink,
    MemoryDocumentStore, MemoryKeyedStore, StoredEvent, EVENTS_COLLECTION, SESSIONS_COLLECTION,
};
use futures::StreamExt;
use neural_ledger_core::{EventType, LedgerEvent};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// The three storage ports, shared with the query service.
#[derive(Clone)]
pub struct StoragePorts {
    pub keyed: Arc<dyn KeyedStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub archive: Arc<dyn AnalyticsSink>,
}

impl StoragePorts {
    /// In-memory stores throughout.
    pub fn in_memory() -> Self {
        Self::with_archive(Arc::new(MemoryAnalyticsSink::new()))
    }

    /// In-memory hot and live stores over the given archive.
    pub fn with_archive(archive: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            keyed: Arc::new(MemoryKeyedStore::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            archive,
        }
    }
}

/// Result of fanning out one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub event_id: String,
    pub sequence: u64,
    pub failures: Vec<StorageWriteError>,
}

impl ProcessOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct FanOutProcessor {
    ports: StoragePorts,
    retry: RetryPolicy,
    workers: usize,
    archive_table: String,
    hooks: Vec<Arc<dyn ComplianceHook>>,
    alerts: AlertLog,
    reconciliation: ReconciliationQueue,
    delivered: AtomicU64,
}

impl FanOutProcessor {
    /// Processor with the built-in compliance hooks.
    pub fn new(ports: StoragePorts, config: &LedgerConfig) -> Self {
        Self {
            ports,
            retry: config.storage_retry,
            workers: config.fanout_workers.max(1),
            archive_table: ARCHIVE_TABLE.to_string(),
            hooks: vec![
                Arc::new(MissingSignatureHook::new(config.critical_policy())),
                Arc::new(HashIntegrityHook),
            ],
            alerts: AlertLog::default(),
            reconciliation: ReconciliationQueue::new(),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ComplianceHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn reconciliation(&self) -> &ReconciliationQueue {
        &self.reconciliation
    }

    /// Channel deliveries fully handled so far, decodable or not.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Consume deliveries until the channel closes or `shutdown` fires.
    pub async fn run(self: Arc<Self>, subscription: ChannelSubscription, shutdown: CancellationToken) {
        tracing::info!("Fan-out processor started with {} workers", self.workers);
        let stop = shutdown.clone();
        subscription
            .into_stream()
            .take_until(async move { stop.cancelled().await })
            .for_each_concurrent(self.workers, |delivery| {
                let this = self.clone();
                async move { this.handle_delivery(delivery).await }
            })
            .await;
        tracing::info!("Fan-out processor stopped");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        match serde_json::from_slice::<LedgerEvent>(&delivery.payload) {
            Ok(event) => {
                self.process_event(&event).await;
            }
            Err(e) => {
                // Redelivery would fail the same way.
                tracing::error!(
                    "Dropping undecodable delivery {}@{}: {}",
                    delivery.topic,
                    delivery.offset,
                    e
                );
                metrics::counter!("neural_ledger_fanout_undecodable_total", 1);
            }
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn process_event(&self, event: &LedgerEvent) -> ProcessOutcome {
        for hook in &self.hooks {
            for alert in hook.inspect(event) {
                self.alerts.record(alert).await;
            }
        }

        let (keyed, documents, archive) = tokio::join!(
            self.write(Backend::Keyed, event),
            self.write(Backend::Document, event),
            self.write(Backend::Archive, event),
        );

        let mut failures = Vec::new();
        for result in [keyed, documents, archive] {
            if let Err(failure) = result {
                tracing::error!("{}", failure);
                self.reconciliation.record(event, &failure).await;
                failures.push(failure);
            }
        }

        let outcome = if failures.is_empty() { "complete" } else { "partial" };
        metrics::counter!("neural_ledger_fanout_events_total", 1, "outcome" => outcome);

        ProcessOutcome {
            event_id: event.event_id.clone(),
            sequence: event.sequence,
            failures,
        }
    }

    /// Fan out a batch concurrently. Outcomes are in input order.
    pub async fn process_batch(&self, events: Vec<LedgerEvent>) -> Vec<ProcessOutcome> {
        futures::stream::iter(events)
            .map(|event| async move { self.process_event(&event).await })
            .buffered(self.workers)
            .collect()
            .await
    }

    /// Retry every pending write once under the storage retry policy.
    pub async fn reconcile(&self) -> ReconcileSummary {
        let pending = self.reconciliation.snapshot().await;
        let mut summary = ReconcileSummary {
            attempted: pending.len(),
            ..Default::default()
        };

        for p in pending {
            match self.write(p.backend, &p.event).await {
                Ok(()) => {
                    self.reconciliation.resolve(&p.event.event_id, p.backend).await;
                    summary.repaired += 1;
                }
                Err(failure) => {
                    self.reconciliation.record(&p.event, &failure).await;
                }
            }
        }
        summary.still_pending = self.reconciliation.len().await;
        tracing::info!(
            "Reconciliation: {} attempted, {} repaired, {} pending",
            summary.attempted,
            summary.repaired,
            summary.still_pending
        );
        summary
    }

    async fn write(&self, backend: Backend, event: &LedgerEvent) -> Result<(), StorageWriteError> {
        let start = Instant::now();
        let result = match backend {
            Backend::Keyed => {
                let row = StoredEvent::keyed(event);
                retry_with_backoff(&self.retry, "storage_keyed", || {
                    self.ports.keyed.put(&event.event_id, &row)
                })
                .await
            }
            Backend::Document => {
                retry_with_backoff(&self.retry, "storage_document", || self.write_documents(event)).await
            }
            Backend::Archive => {
                let row = StoredEvent::archived(event);
                retry_with_backoff(&self.retry, "storage_archive", || {
                    self.ports
                        .archive
                        .append_row(&self.archive_table, &row.partition_key, &row)
                })
                .await
            }
        };

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            "neural_ledger_storage_writes_total",
            1,
            "backend" => backend.as_str(),
            "outcome" => outcome
        );
        metrics::histogram!(
            "neural_ledger_storage_write_duration_seconds",
            start.elapsed().as_secs_f64(),
            "backend" => backend.as_str()
        );

        result.map_err(|e| StorageWriteError {
            backend,
            event_id: event.event_id.clone(),
            attempts: e.attempts(),
            source: e.into_source(),
        })
    }

    /// Event document plus the session's live state.
    async fn write_documents(&self, event: &LedgerEvent) -> Result<(), StorageError> {
        let docs = &self.ports.documents;
        docs.upsert(EVENTS_COLLECTION, &event.event_id, event_document(event)?)
            .await?;

        let Some(session_id) = &event.session_id else {
            return Ok(());
        };
        // Only move the session forward; redelivered or late events are skipped.
        let applied = docs
            .upsert_if_newer(
                SESSIONS_COLLECTION,
                session_id,
                "last_sequence",
                event.sequence,
                session_fields(event),
            )
            .await?;
        if !applied {
            tracing::debug!("Session {} already past sequence {}", session_id, event.sequence);
        }
        Ok(())
    }
}

fn session_fields(event: &LedgerEvent) -> Document {
    let mut doc = Document::new();
    doc.insert("session_id".into(), json!(event.session_id));
    doc.insert("last_event_type".into(), json!(event.event_type));
    doc.insert("last_sequence".into(), json!(event.sequence));
    doc.insert("last_event_at".into(), json!(event.timestamp));
    doc.insert("last_event_hash".into(), json!(event.event_hash));
    if let Some(user) = &event.user_id {
        doc.insert("user_id".into(), json!(user));
    }
    if let Some(device) = &event.device_id {
        doc.insert("device_id".into(), json!(device));
    }
    let status = match event.event_type {
        EventType::SessionCreated => Some("created"),
        EventType::SessionStarted => Some("active"),
        EventType::SessionEnded => Some("ended"),
        _ => None,
    };
    if let Some(status) = status {
        doc.insert("status".into(), json!(status));
    }
    doc
}
