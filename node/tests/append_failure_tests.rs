// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use common::{around_now, custody, test_config, DownChannel, FlakyCustody};
use neural_ledger_core::{EventRequest, EventType, Metadata};
use neural_ledger_node::channel::InMemoryChannel;
use neural_ledger_node::errors::{CustodyError, PublishError, SigningError};
use neural_ledger_node::ledger::{FileTailStore, MemoryTailStore, TailStore};
use neural_ledger_node::{LedgerConfig, LedgerDeps, LedgerError, LedgerRuntime, NeuralLedger, StoragePorts};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const DRAIN: Duration = Duration::from_secs(5);

async fn ledger_with_custody(custody: Arc<FlakyCustody>) -> (NeuralLedger, Arc<InMemoryChannel>) {
    let channel = Arc::new(InMemoryChannel::new(64));
    let (ledger, _) = NeuralLedger::start(
        &test_config(),
        LedgerDeps {
            custody,
            channel: channel.clone(),
            tail_store: Arc::new(MemoryTailStore::new()),
        },
    )
    .await
    .unwrap();
    (ledger, channel)
}

fn export() -> EventRequest {
    EventRequest::new(EventType::DataExported)
        .session("sess-x")
        .user("analyst-1")
        .meta("destination", "sftp://partner")
}

#[tokio::test]
async fn test_transient_signer_errors_are_retried() {
    let custody = Arc::new(FlakyCustody::new(2, || CustodyError::Transient("503".into())));
    let (ledger, _channel) = ledger_with_custody(custody.clone()).await;

    let event = ledger.log_event(export()).await.unwrap();
    assert!(event.is_signed());
    assert_eq!(custody.remaining_failures(), 0);
}

#[tokio::test]
async fn test_terminal_signer_error_leaves_tail_unchanged() {
    let custody = Arc::new(FlakyCustody::new(1, || CustodyError::PermissionDenied("revoked".into())));
    let (ledger, channel) = ledger_with_custody(custody).await;

    let first = ledger.log_session_started("sess-x", Metadata::new()).await.unwrap();
    let err = ledger.log_event(export()).await.unwrap_err();
    assert!(
        matches!(err, LedgerError::Signing(SigningError::Rejected { .. })),
        "{:?}",
        err
    );
    // Nothing was published for the failed call.
    assert_eq!(channel.published(), 1);

    let next = ledger.log_event(export()).await.unwrap();
    assert_eq!(next.sequence, first.sequence + 1);
    assert_eq!(next.previous_hash, first.event_hash);
}

#[tokio::test]
async fn test_exhausted_signer_retries_abort_admission() {
    let custody = Arc::new(FlakyCustody::new(10, || CustodyError::Throttled));
    let (ledger, channel) = ledger_with_custody(custody).await;

    let err = ledger.log_event(export()).await.unwrap_err();
    match err {
        LedgerError::Signing(SigningError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(channel.published(), 0);

    // Non-critical events never touch custody.
    let event = ledger.log_session_started("sess-x", Metadata::new()).await.unwrap();
    assert_eq!(event.sequence, 0);
    assert!(event.previous_hash.is_genesis());
}

#[tokio::test]
async fn test_publish_failure_leaves_tail_unchanged() {
    let channel = Arc::new(DownChannel::new());
    let tail_store = Arc::new(MemoryTailStore::new());
    let (ledger, _) = NeuralLedger::start(
        &test_config(),
        LedgerDeps {
            custody: custody(),
            channel: channel.clone(),
            tail_store: tail_store.clone(),
        },
    )
    .await
    .unwrap();

    let err = ledger.log_session_started("sess-y", Metadata::new()).await.unwrap_err();
    match err {
        LedgerError::Publish(PublishError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
    assert!(tail_store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_chain_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let config = LedgerConfig {
        tail_path: Some(dir.path().join("chain.tail")),
        ..test_config()
    };
    let ports = StoragePorts::in_memory();

    let last = {
        let rt = LedgerRuntime::start(&config, custody(), ports.clone()).await.unwrap();
        let mut last = None;
        for _ in 0..3 {
            last = Some(rt.ledger.log_session_started("sess-r", Metadata::new()).await.unwrap());
        }
        rt.shutdown(DRAIN).await;
        last.unwrap()
    };

    let stored = FileTailStore::open(dir.path().join("chain.tail")).unwrap().load().unwrap().unwrap();
    assert_eq!(stored.next_sequence, 3);
    assert_eq!(stored.last_hash, last.event_hash);

    let rt = LedgerRuntime::start(&config, custody(), ports).await.unwrap();
    let resumed = rt.ledger.log_session_ended("sess-r", Metadata::new()).await.unwrap();
    assert_eq!(resumed.sequence, 3);
    assert_eq!(resumed.previous_hash, last.event_hash);
    assert!(resumed.timestamp >= last.timestamp);
    assert!(rt.drain(DRAIN).await);

    let integrity = rt.query.verify_integrity(around_now()).await.unwrap();
    assert!(integrity.is_intact(), "{:?}", integrity.violations);
    assert_eq!(integrity.events_checked, 4);

    rt.shutdown(DRAIN).await;
}
