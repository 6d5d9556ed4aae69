// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::{
    AnalyticsSink, ArchiveQuery, Document, DocumentFilter, DocumentStore, KeyedStore, StorageResult,
    StoredEvent,
};
use async_trait::async_trait;
use neural_ledger_core::LedgerEvent;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryKeyedStore {
    rows: RwLock<HashMap<String, StoredEvent>>,
}

impl MemoryKeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl KeyedStore for MemoryKeyedStore {
    async fn put(&self, event_id: &str, row: &StoredEvent) -> StorageResult<()> {
        self.rows.write().await.insert(event_id.to_string(), row.clone());
        Ok(())
    }

    async fn get(&self, event_id: &str) -> StorageResult<Option<StoredEvent>> {
        Ok(self.rows.read().await.get(event_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, collection: &str, doc_id: &str, fields: Document) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        docs.entry(doc_id.to_string()).or_default().extend(fields);
        Ok(())
    }

    async fn upsert_if_newer(
        &self,
        collection: &str,
        doc_id: &str,
        version_field: &str,
        version: u64,
        fields: Document,
    ) -> StorageResult<bool> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(doc_id.to_string())
            .or_default();
        let stale = doc
            .get(version_field)
            .and_then(Value::as_u64)
            .is_some_and(|current| current >= version);
        if stale {
            return Ok(false);
        }
        doc.extend(fields);
        Ok(true)
    }

    async fn get(&self, collection: &str, doc_id: &str) -> StorageResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .cloned())
    }

    async fn query(&self, collection: &str, filter: &DocumentFilter) -> StorageResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let matched = collections
            .get(collection)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        Ok(filter.finish(matched))
    }
}

/// Table → event id → row. Re-appending an event id replaces the row.
#[derive(Default)]
pub struct MemoryAnalyticsSink {
    tables: RwLock<HashMap<String, HashMap<String, StoredEvent>>>,
}

impl MemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map(HashMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalyticsSink {
    async fn append_row(&self, table: &str, partition_key: &str, row: &StoredEvent) -> StorageResult<()> {
        let mut stored = row.clone();
        stored.partition_key = partition_key.to_string();
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(row.event.event_id.clone(), stored);
        Ok(())
    }

    async fn query(&self, table: &str, query: &ArchiveQuery) -> StorageResult<Vec<LedgerEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<LedgerEvent> = tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .map(|r| &r.event)
                    .filter(|e| query.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}
