// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage Ports
//!
//! Three narrow interfaces, one per backend shape. The fan-out processor
//! writes every event to all three; the query service reads the archive
//! (system of record) and the document store.
//!
//! # Guarantees
//! - all writes are keyed by `event_id` and safe to repeat
//! - every row carries the full event, so chain order is reconstructible
//!   from any single store

pub mod archive;
pub mod memory;

pub use archive::ArchiveStore;
pub use memory::{MemoryAnalyticsSink, MemoryDocumentStore, MemoryKeyedStore};

use crate::errors::StorageError;
use async_trait::async_trait;
use neural_ledger_core::config::LEDGER_PARTITION;
use neural_ledger_core::{EventFilter, EventType, LedgerEvent, TimeWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Free-form document as held by the document store.
pub type Document = serde_json::Map<String, Value>;

pub const EVENTS_COLLECTION: &str = "events";
pub const SESSIONS_COLLECTION: &str = "sessions";
pub const CHECKPOINTS_COLLECTION: &str = "checkpoints";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Keyed,
    Document,
    Archive,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Keyed, Backend::Document, Backend::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Keyed => "keyed",
            Backend::Document => "document",
            Backend::Archive => "archive",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted row: the full event plus backend keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub partition_key: String,
    pub row_key: String,
    pub event: LedgerEvent,
}

impl StoredEvent {
    /// Hot-path row: partitioned by session.
    pub fn keyed(event: &LedgerEvent) -> Self {
        Self {
            partition_key: event
                .session_id
                .clone()
                .unwrap_or_else(|| LEDGER_PARTITION.to_string()),
            row_key: row_key(event.sequence),
            event: event.clone(),
        }
    }

    /// Archive row: partitioned by UTC date.
    pub fn archived(event: &LedgerEvent) -> Self {
        Self {
            partition_key: archive_partition(event),
            row_key: row_key(event.sequence),
            event: event.clone(),
        }
    }
}

pub fn row_key(sequence: u64) -> String {
    format!("{:020}", sequence)
}

pub fn archive_partition(event: &LedgerEvent) -> String {
    event.timestamp.format("%Y-%m-%d").to_string()
}

/// Equality filter with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub equals: BTreeMap<String, Value>,
    pub order_desc_by: Option<String>,
    pub limit: Option<usize>,
}

impl DocumentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    pub fn newest_first(mut self, field: impl Into<String>) -> Self {
        self.order_desc_by = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.equals.iter().all(|(k, v)| doc.get(k) == Some(v))
    }

    /// Apply ordering and limit to already-matched documents.
    pub fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some(field) = &self.order_desc_by {
            docs.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Window + filter query against the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub window: TimeWindow,
    pub filter: EventFilter,
}

impl ArchiveQuery {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            filter: EventFilter::all(),
        }
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.window.contains(&event.timestamp) && self.filter.matches(event)
    }
}

/// Hot path: point reads and writes by event id.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn put(&self, event_id: &str, row: &StoredEvent) -> StorageResult<()>;

    async fn get(&self, event_id: &str) -> StorageResult<Option<StoredEvent>>;
}

/// Live state: merged documents per collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert, or merge `fields` into the existing document.
    async fn upsert(&self, collection: &str, doc_id: &str, fields: Document) -> StorageResult<()>;

    /// Merge `fields` only if the stored `version_field` is absent or below
    /// `version`, as one atomic step. Returns whether the write happened.
    async fn upsert_if_newer(
        &self,
        collection: &str,
        doc_id: &str,
        version_field: &str,
        version: u64,
        fields: Document,
    ) -> StorageResult<bool>;

    async fn get(&self, collection: &str, doc_id: &str) -> StorageResult<Option<Document>>;

    async fn query(&self, collection: &str, filter: &DocumentFilter) -> StorageResult<Vec<Document>>;
}

/// Analytical archive: the system of record for reports.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Idempotent on `row.event.event_id`.
    async fn append_row(&self, table: &str, partition_key: &str, row: &StoredEvent) -> StorageResult<()>;

    /// Matching events ordered by sequence.
    async fn query(&self, table: &str, query: &ArchiveQuery) -> StorageResult<Vec<LedgerEvent>>;

    async fn count_by_type(&self, table: &str, query: &ArchiveQuery) -> StorageResult<BTreeMap<EventType, u64>> {
        let mut counts = BTreeMap::new();
        for event in self.query(table, query).await? {
            *counts.entry(event.event_type).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Document written to the `events` collection.
pub fn event_document(event: &LedgerEvent) -> StorageResult<Document> {
    match serde_json::to_value(event)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Serialization(format!(
            "event serialized to non-object {}",
            other
        ))),
    }
}
