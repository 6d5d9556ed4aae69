// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Object-store archive over OpenDAL.
//!
//! # Layout
//! ```text
//! {table}/dt={YYYY-MM-DD}/{row_key}-{event_id}.json
//! ```
//! One JSON object per event. The path is derived from the event alone,
//! so redelivery overwrites the same object.

use super::{AnalyticsSink, ArchiveQuery, StorageResult, StoredEvent};
use crate::errors::StorageError;
use async_trait::async_trait;
use neural_ledger_core::LedgerEvent;
use opendal::{services, ErrorKind, Operator};
use std::path::Path;

pub struct ArchiveStore {
    op: Operator,
}

impl ArchiveStore {
    pub fn from_operator(op: Operator) -> Self {
        Self { op }
    }

    pub fn memory() -> StorageResult<Self> {
        let op = Operator::new(services::Memory::default())
            .map_err(map_err)?
            .finish();
        Ok(Self::from_operator(op))
    }

    pub fn filesystem(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_string_lossy().to_string();
        let op = Operator::new(services::Fs::default().root(&root))
            .map_err(map_err)?
            .finish();
        Ok(Self::from_operator(op))
    }

    /// S3-compatible bucket. Credentials come from the usual AWS
    /// environment variables.
    pub fn s3(bucket: &str, region: &str, root: &str) -> StorageResult<Self> {
        let builder = services::S3::default().bucket(bucket).region(region).root(root);
        let op = Operator::new(builder).map_err(map_err)?.finish();
        Ok(Self::from_operator(op))
    }

    fn object_path(table: &str, partition_key: &str, row: &StoredEvent) -> String {
        format!(
            "{}/dt={}/{}-{}.json",
            table, partition_key, row.row_key, row.event.event_id
        )
    }

    async fn list_partition(&self, dir: &str) -> StorageResult<Vec<String>> {
        match self.op.list(dir).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|e| e.path().to_string())
                .filter(|p| p.ends_with(".json"))
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(map_err(e)),
        }
    }
}

fn map_err(e: opendal::Error) -> StorageError {
    if e.is_temporary() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Rejected(e.to_string())
    }
}

#[async_trait]
impl AnalyticsSink for ArchiveStore {
    async fn append_row(&self, table: &str, partition_key: &str, row: &StoredEvent) -> StorageResult<()> {
        let path = Self::object_path(table, partition_key, row);
        let mut stored = row.clone();
        stored.partition_key = partition_key.to_string();
        let body = serde_json::to_vec(&stored)?;
        self.op.write(&path, body).await.map_err(map_err)?;
        Ok(())
    }

    async fn query(&self, table: &str, query: &ArchiveQuery) -> StorageResult<Vec<LedgerEvent>> {
        let mut events = Vec::new();
        for day in query.window.days() {
            let dir = format!("{}/dt={}/", table, day.format("%Y-%m-%d"));
            for path in self.list_partition(&dir).await? {
                let bytes = match self.op.read(&path).await {
                    Ok(buf) => buf.to_vec(),
                    // Listed, then removed.
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(map_err(e)),
                };
                let row: StoredEvent = serde_json::from_slice(&bytes)?;
                if query.matches(&row.event) {
                    events.push(row.event);
                }
            }
        }
        events.sort_by_key(|e| e.sequence);
        events.dedup_by(|a, b| a.event_id == b.event_id);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use neural_ledger_core::canonical::MetadataLimits;
    use neural_ledger_core::{EventFilter, EventRequest, EventType, TimeWindow, GENESIS_HASH};

    fn event_at(seq: u64, hours: i64) -> LedgerEvent {
        let ts = Utc.with_ymd_and_hms(2025, 2, 28, 20, 0, 0).unwrap() + Duration::hours(hours);
        EventRequest::new(EventType::DataIngested)
            .device("eeg-1")
            .into_draft(&MetadataLimits::default())
            .unwrap()
            .link(seq, ts, GENESIS_HASH)
    }

    #[tokio::test]
    async fn test_archive_spans_partitions() {
        let store = ArchiveStore::memory().unwrap();
        // 20:00 and 22:00 on the 28th, 02:00 on March 1st
        for (seq, hours) in [(0, 0), (1, 2), (2, 6)] {
            let row = StoredEvent::archived(&event_at(seq, hours));
            store.append_row("ledger_events", &row.partition_key, &row).await.unwrap();
            store.append_row("ledger_events", &row.partition_key, &row).await.unwrap();
        }

        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 2, 28, 21, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).unwrap(),
        )
        .unwrap();
        let events = store.query("ledger_events", &ArchiveQuery::new(window)).await.unwrap();
        assert_eq!(events.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);

        let none = ArchiveQuery::new(window).with_filter(EventFilter::all().device("other"));
        assert!(store.query("ledger_events", &none).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_archive_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let e = event_at(0, 0);
        {
            let store = ArchiveStore::filesystem(dir.path()).unwrap();
            let row = StoredEvent::archived(&e);
            store.append_row("t", &row.partition_key, &row).await.unwrap();
        }
        let store = ArchiveStore::filesystem(dir.path()).unwrap();
        let window = TimeWindow::new(e.timestamp, e.timestamp + Duration::seconds(1)).unwrap();
        let events = store.query("t", &ArchiveQuery::new(window)).await.unwrap();
        assert_eq!(events, vec![e]);
    }

    #[tokio::test]
    async fn test_empty_window_on_missing_table() {
        let store = ArchiveStore::memory().unwrap();
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::new(t, t + Duration::days(2)).unwrap();
        assert!(store.query("nothing", &ArchiveQuery::new(window)).await.unwrap().is_empty());
    }
}
