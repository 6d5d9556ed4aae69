// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use neural_ledger_core::TimeWindow;
use neural_ledger_node::channel::{Ack, MessageChannel};
use neural_ledger_node::errors::{ChannelError, CustodyError, StorageError};
use neural_ledger_node::retry::RetryPolicy;
use neural_ledger_node::signer::{KeyCustody, LocalKeyCustody};
use neural_ledger_node::storage::{KeyedStore, MemoryKeyedStore, StorageResult, StoredEvent};
use neural_ledger_node::{LedgerConfig, LedgerRuntime, StoragePorts};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SIGNING_KEY: &str = "ledger/signing/test";

/// Config with short retry policies so failure tests stay fast.
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        signing_key_id: SIGNING_KEY.to_string(),
        signer_retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), Duration::from_millis(500)),
        publish_retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), Duration::from_millis(500)),
        storage_retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5), Duration::from_millis(500)),
        ..LedgerConfig::default()
    }
}

pub fn custody() -> Arc<LocalKeyCustody> {
    Arc::new(LocalKeyCustody::new().with_key(SIGNING_KEY))
}

pub async fn start_runtime() -> LedgerRuntime {
    start_runtime_with(StoragePorts::in_memory()).await
}

pub async fn start_runtime_with(ports: StoragePorts) -> LedgerRuntime {
    LedgerRuntime::start(&test_config(), custody(), ports)
        .await
        .expect("runtime starts")
}

/// One hour either side of now.
pub fn around_now() -> TimeWindow {
    let now = Utc::now();
    TimeWindow::new(now - ChronoDuration::hours(1), now + ChronoDuration::hours(1)).unwrap()
}

/// Custody that fails the first `failures` sign calls with `error`.
pub struct FlakyCustody {
    inner: LocalKeyCustody,
    failures: AtomicU32,
    error: fn() -> CustodyError,
}

impl FlakyCustody {
    pub fn new(failures: u32, error: fn() -> CustodyError) -> Self {
        Self {
            inner: LocalKeyCustody::new().with_key(SIGNING_KEY),
            failures: AtomicU32::new(failures),
            error,
        }
    }

    pub fn remaining_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyCustody for FlakyCustody {
    async fn encrypt(&self, key_path: &str, plaintext: &[u8]) -> Result<Vec<u8>, CustodyError> {
        self.inner.encrypt(key_path, plaintext).await
    }

    async fn decrypt(&self, key_path: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CustodyError> {
        self.inner.decrypt(key_path, ciphertext).await
    }

    async fn sign(&self, key_path: &str, digest: &[u8]) -> Result<Vec<u8>, CustodyError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err((self.error)());
        }
        self.inner.sign(key_path, digest).await
    }

    async fn verify(&self, key_path: &str, digest: &[u8], signature: &[u8]) -> Result<bool, CustodyError> {
        self.inner.verify(key_path, digest, signature).await
    }
}

/// Broker that refuses every publish.
pub struct DownChannel {
    pub attempts: AtomicU32,
}

impl DownChannel {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MessageChannel for DownChannel {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<Ack, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::Full)
    }
}

/// Keyed store that can be taken offline.
pub struct SwitchableKeyedStore {
    pub inner: MemoryKeyedStore,
    pub down: AtomicBool,
}

impl SwitchableKeyedStore {
    pub fn offline() -> Self {
        Self {
            inner: MemoryKeyedStore::new(),
            down: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self) {
        self.down.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyedStore for SwitchableKeyedStore {
    async fn put(&self, event_id: &str, row: &StoredEvent) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("keyed store offline".into()));
        }
        self.inner.put(event_id, row).await
    }

    async fn get(&self, event_id: &str) -> StorageResult<Option<StoredEvent>> {
        self.inner.get(event_id).await
    }
}
