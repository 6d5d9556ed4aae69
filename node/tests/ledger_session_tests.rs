// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use common::{around_now, start_runtime, start_runtime_with, SwitchableKeyedStore};
use neural_ledger_core::{EventFilter, EventType, IntegrityViolation, Metadata};
use neural_ledger_node::config::ARCHIVE_TABLE;
use neural_ledger_node::query::{ComplianceStatus, Framework};
use neural_ledger_node::storage::{AnalyticsSink, ArchiveQuery, KeyedStore, MemoryAnalyticsSink, MemoryDocumentStore, StoredEvent};
use neural_ledger_node::StoragePorts;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DRAIN: Duration = Duration::from_secs(5);

fn md(pairs: &[(&str, serde_json::Value)]) -> Metadata {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn test_full_session_is_chained_signed_and_compliant() {
    let rt = start_runtime().await;
    let ledger = &rt.ledger;

    let created = ledger
        .log_session_created("sess-1", "patient-7", "headset-3", md(&[("protocol", json!("motor-imagery"))]))
        .await
        .unwrap();
    ledger.log_session_started("sess-1", Metadata::new()).await.unwrap();
    ledger
        .log_data_ingested("sess-1", "headset-3", "sha256:abc123", 4096, Metadata::new())
        .await
        .unwrap();
    ledger
        .log_model_inference("sess-1", "patient-7", "decoder-v2", Metadata::new())
        .await
        .unwrap();
    let exported = ledger
        .log_data_exported("sess-1", "patient-7", "s3://research-bucket", Metadata::new())
        .await
        .unwrap();
    let ended = ledger.log_session_ended("sess-1", Metadata::new()).await.unwrap();

    assert_eq!(created.sequence, 0);
    assert!(created.previous_hash.is_genesis());
    assert_eq!(ended.sequence, 5);
    assert!(exported.is_signed());
    assert!(rt.drain(DRAIN).await);

    let window = around_now();
    let events = rt.query.get_events_in_range(window.start, window.end, &EventFilter::all()).await.unwrap();
    assert_eq!(events.len(), 6);
    for pair in events.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].event_hash);
    }
    let signed: Vec<_> = events.iter().filter(|e| e.is_signed()).collect();
    assert_eq!(signed.len(), 1);
    assert_eq!(signed[0].event_type, EventType::DataExported);

    let integrity = rt.query.verify_integrity(window).await.unwrap();
    assert!(integrity.is_intact(), "{:?}", integrity.violations);
    assert_eq!(integrity.events_checked, 6);
    assert_eq!(integrity.signatures_checked, 1);

    let hipaa = rt.query.generate_hipaa_audit_report(window).await.unwrap();
    assert_eq!(hipaa.compliance_status, ComplianceStatus::Compliant);
    assert_eq!(hipaa.event_count, 6);
    assert_eq!(hipaa.window, window);
    assert_eq!(hipaa.categories.signed_events, 1);

    let session = rt.query.session_state("sess-1").await.unwrap().unwrap();
    assert_eq!(session["status"], json!("ended"));
    assert_eq!(session["last_sequence"], json!(5));

    let recent = rt.query.recent_activity(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["sequence"], json!(5));

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_rewritten_archive_row_breaks_chain() {
    let archive = Arc::new(MemoryAnalyticsSink::new());
    let rt = start_runtime_with(StoragePorts::with_archive(archive.clone())).await;

    for i in 0..5 {
        rt.ledger
            .log_access_event("dr-lee", true, &format!("record-{}", i), Metadata::new())
            .await
            .unwrap();
    }
    assert!(rt.drain(DRAIN).await);
    let window = around_now();

    let events = rt.query.get_events_in_range(window.start, window.end, &EventFilter::all()).await.unwrap();
    let mut forged = events[2].clone();
    forged.metadata.insert("resource".into(), json!("record-999"));
    forged.event_hash = forged.recompute_hash().unwrap();
    let row = StoredEvent::archived(&forged);
    archive.append_row(ARCHIVE_TABLE, &row.partition_key, &row).await.unwrap();

    let integrity = rt.query.verify_integrity(window).await.unwrap();
    assert_eq!(integrity.violations.len(), 1);
    match &integrity.violations[0] {
        IntegrityViolation::BrokenLink { sequence, .. } => assert_eq!(*sequence, 3),
        other => panic!("unexpected violation {:?}", other),
    }

    let report = rt.query.generate_fda_compliance_report(window).await.unwrap();
    assert_eq!(report.compliance_status, ComplianceStatus::NonCompliant);
    assert!(!report.integrity.hash_chain_intact);

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_consent_withdrawal_is_flagged_under_gdpr_only() {
    let rt = start_runtime().await;
    let ledger = &rt.ledger;

    ledger.log_consent_event("patient-2", true, "research", Metadata::new()).await.unwrap();
    ledger
        .log_model_inference("sess-2", "patient-2", "decoder-v2", Metadata::new())
        .await
        .unwrap();
    ledger.log_consent_event("patient-2", false, "research", Metadata::new()).await.unwrap();
    let late = ledger
        .log_model_inference("sess-2", "patient-2", "decoder-v2", Metadata::new())
        .await
        .unwrap();
    ledger
        .log_model_inference("sess-3", "patient-3", "decoder-v2", Metadata::new())
        .await
        .unwrap();
    assert!(rt.drain(DRAIN).await);
    let window = around_now();

    let log = rt.query.generate_gdpr_subject_access_log(window, "patient-2").await.unwrap();
    assert_eq!(log.event_count, 4);
    assert_eq!(log.compliance_status, ComplianceStatus::NonCompliant);
    assert_eq!(log.violations.len(), 1);
    assert_eq!(log.violations[0].rule, "PROCESSING_AFTER_CONSENT_WITHDRAWN");
    assert_eq!(log.violations[0].event_id.as_deref(), Some(late.event_id.as_str()));

    let combined = rt
        .query
        .generate_compliance_report(window, &Framework::ALL, None)
        .await
        .unwrap();
    assert_eq!(combined.overall_status, ComplianceStatus::NonCompliant);
    let hipaa = combined.reports.iter().find(|r| r.framework == Framework::Hipaa).unwrap();
    assert_eq!(hipaa.compliance_status, ComplianceStatus::Compliant);
    assert_eq!(hipaa.event_count, 5);

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_checkpoint_detects_later_additions() {
    let rt = start_runtime().await;
    for _ in 0..4 {
        rt.ledger.log_auth_event("nurse-1", true, "badge", Metadata::new()).await.unwrap();
    }
    assert!(rt.drain(DRAIN).await);
    let window = around_now();

    let checkpoint = rt.checkpoints.create_checkpoint(window).await.unwrap();
    assert_eq!(checkpoint.event_count, 4);
    assert_eq!(checkpoint.first_sequence, Some(0));
    assert!(rt.query.verify_checkpoint(&checkpoint).await.unwrap());

    let stored = rt.checkpoints.get_checkpoint(&checkpoint.id()).await.unwrap().unwrap();
    assert!(stored.matches(&checkpoint));

    rt.ledger.log_auth_event("nurse-1", false, "badge", Metadata::new()).await.unwrap();
    assert!(rt.drain(DRAIN).await);
    assert!(!rt.query.verify_checkpoint(&checkpoint).await.unwrap());

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_offline_backend_is_reconciled_later() {
    let keyed = Arc::new(SwitchableKeyedStore::offline());
    let ports = StoragePorts {
        keyed: keyed.clone(),
        documents: Arc::new(MemoryDocumentStore::new()),
        archive: Arc::new(MemoryAnalyticsSink::new()),
    };
    let rt = start_runtime_with(ports).await;

    let a = rt.ledger.log_session_started("sess-9", Metadata::new()).await.unwrap();
    let b = rt.ledger.log_session_ended("sess-9", Metadata::new()).await.unwrap();
    assert!(rt.drain(DRAIN).await);

    // The other backends are unaffected.
    let window = around_now();
    let archived = rt.query.get_events_in_range(window.start, window.end, &EventFilter::all()).await.unwrap();
    assert_eq!(archived.len(), 2);
    assert_eq!(rt.processor.reconciliation().len().await, 2);
    assert!(keyed.get(&a.event_id).await.unwrap().is_none());

    keyed.set_online();
    let summary = rt.processor.reconcile().await;
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.repaired, 2);
    assert_eq!(summary.still_pending, 0);
    assert_eq!(keyed.get(&b.event_id).await.unwrap().unwrap().event.sequence, 1);

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_invalid_metadata_is_rejected_without_consuming_a_sequence() {
    let rt = start_runtime().await;
    let first = rt.ledger.log_session_started("sess-4", Metadata::new()).await.unwrap();

    let err = rt
        .ledger
        .log_session_ended("sess-4", md(&[("", json!(1))]))
        .await
        .unwrap_err();
    assert!(matches!(err, neural_ledger_node::LedgerError::Validation(_)));

    let next = rt.ledger.log_session_ended("sess-4", Metadata::new()).await.unwrap();
    assert_eq!(next.sequence, first.sequence + 1);
    assert_eq!(next.previous_hash, first.event_hash);

    rt.shutdown(DRAIN).await;
}

#[tokio::test]
async fn test_shutdown_waits_for_queued_appends() {
    let rt = start_runtime().await;
    let archive = rt.ports.archive.clone();
    let late = rt.ledger.clone();

    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        late.log_access_event("auditor-1", true, "record-9", Metadata::new()).await
    });
    rt.shutdown(DRAIN).await;

    let admitted = writer.await.unwrap().unwrap();
    let query = ArchiveQuery::new(around_now());
    let archived = archive.query(ARCHIVE_TABLE, &query).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].event_id, admitted.event_id);
}
