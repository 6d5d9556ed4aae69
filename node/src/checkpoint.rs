// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Periodic Merkle checkpoints over archived events.
//!
//! A checkpoint attests to the exact batch of events archived in a window.
//! Checkpoints are stored in the `checkpoints` collection keyed by
//! [`Checkpoint::id`]; consecutive periodic windows share a boundary and
//! never overlap.

use crate::config::ARCHIVE_TABLE;
use crate::errors::{Result, StorageError};
use crate::processor::StoragePorts;
use crate::storage::{AnalyticsSink, ArchiveQuery, Document, DocumentFilter, DocumentStore, CHECKPOINTS_COLLECTION};
use chrono::Utc;
use neural_ledger_core::{Checkpoint, TimeWindow};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct CheckpointService {
    archive: Arc<dyn AnalyticsSink>,
    documents: Arc<dyn DocumentStore>,
    table: String,
}

impl CheckpointService {
    pub fn new(ports: &StoragePorts) -> Self {
        Self {
            archive: ports.archive.clone(),
            documents: ports.documents.clone(),
            table: ARCHIVE_TABLE.to_string(),
        }
    }

    /// Compute and store a checkpoint for `window`.
    pub async fn create_checkpoint(&self, window: TimeWindow) -> Result<Checkpoint> {
        let events = self.archive.query(&self.table, &ArchiveQuery::new(window)).await?;
        let checkpoint = Checkpoint::from_events(window, &events, Utc::now());

        let doc = match serde_json::to_value(&checkpoint).map_err(StorageError::from)? {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::Serialization(format!("checkpoint serialized to {}", other)).into());
            }
        };
        self.documents
            .upsert(CHECKPOINTS_COLLECTION, &checkpoint.id(), doc)
            .await?;

        metrics::counter!("neural_ledger_checkpoints_total", 1);
        tracing::info!(
            "Checkpoint {} over {} events, root {}",
            checkpoint.id(),
            checkpoint.event_count,
            checkpoint.merkle_root
        );
        Ok(checkpoint)
    }

    pub async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        match self.documents.get(CHECKPOINTS_COLLECTION, id).await? {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Stored checkpoints, newest first.
    pub async fn list_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>> {
        let filter = DocumentFilter::all().newest_first("created_at").limit(limit);
        let docs = self.documents.query(CHECKPOINTS_COLLECTION, &filter).await?;
        let checkpoints = docs
            .into_iter()
            .map(decode)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }

    /// Checkpoint `[previous boundary, now)` every `interval` until cancelled.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately.
            ticker.tick().await;
            let mut boundary = Utc::now();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let now = Utc::now();
                let window = match TimeWindow::new(boundary, now) {
                    Ok(w) => w,
                    Err(e) => {
                        tracing::error!("Skipping checkpoint: {}", e);
                        continue;
                    }
                };
                match self.create_checkpoint(window).await {
                    Ok(_) => boundary = now,
                    // Boundary stays put so the next window covers the gap.
                    Err(e) => tracing::error!("Checkpoint failed: {}", e),
                }
            }
            tracing::info!("Checkpoint task stopped");
        })
    }
}

fn decode(doc: Document) -> std::result::Result<Checkpoint, StorageError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryAnalyticsSink, MemoryDocumentStore, MemoryKeyedStore, StoredEvent};
    use chrono::Duration as ChronoDuration;
    use neural_ledger_core::canonical::MetadataLimits;
    use neural_ledger_core::{EventRequest, EventType, GENESIS_HASH};

    fn ports() -> StoragePorts {
        StoragePorts {
            keyed: Arc::new(MemoryKeyedStore::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            archive: Arc::new(MemoryAnalyticsSink::new()),
        }
    }

    #[tokio::test]
    async fn test_create_and_reload() {
        let ports = ports();
        let now = Utc::now();
        let event = EventRequest::new(EventType::DeviceConnected)
            .device("d-1")
            .into_draft(&MetadataLimits::default())
            .unwrap()
            .link(0, now, GENESIS_HASH);
        let row = StoredEvent::archived(&event);
        ports
            .archive
            .append_row(ARCHIVE_TABLE, &row.partition_key, &row)
            .await
            .unwrap();

        let service = CheckpointService::new(&ports);
        let window = TimeWindow::new(now - ChronoDuration::minutes(1), now + ChronoDuration::minutes(1)).unwrap();
        let created = service.create_checkpoint(window).await.unwrap();
        assert_eq!(created.event_count, 1);
        assert_eq!(created.last_event_hash, Some(event.event_hash));

        let loaded = service.get_checkpoint(&created.id()).await.unwrap().unwrap();
        assert!(loaded.matches(&created));
        assert_eq!(service.list_checkpoints(10).await.unwrap().len(), 1);
        assert!(service.get_checkpoint("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_periodic_task_stops_on_cancel() {
        let service = Arc::new(CheckpointService::new(&ports()));
        let token = CancellationToken::new();
        let handle = service.clone().spawn_periodic(Duration::from_millis(20), token.clone());

        tokio::time::sleep(Duration::from_millis(70)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(!service.list_checkpoints(100).await.unwrap().is_empty());
    }
}
