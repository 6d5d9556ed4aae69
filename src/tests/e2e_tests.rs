// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::event::EventType;
use crate::hash::GENESIS_HASH;
use crate::tests::session_chain;
use crate::verify::{verify_chain, ChainAnchor, CriticalEventPolicy, IntegrityViolation};
use serde_json::json;

#[test]
fn test_session_chain_is_linked() {
    let events = session_chain();
    assert_eq!(events.len(), 6);
    assert_eq!(events[0].previous_hash, GENESIS_HASH);
    for i in 1..events.len() {
        assert_eq!(events[i].previous_hash, events[i - 1].event_hash);
        assert_eq!(events[i].sequence, i as u64);
    }

    let report = verify_chain(&events, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert!(report.is_intact(), "{:?}", report.violations);
    assert_eq!(report.checked, 6);
}

#[test]
fn test_tampered_metadata_without_rehash_is_hash_mismatch() {
    let mut events = session_chain();
    events[2].metadata.insert("chunk".into(), json!(99));

    let report = verify_chain(&events, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert_eq!(report.violations.len(), 1);
    assert!(matches!(
        &report.violations[0],
        IntegrityViolation::HashMismatch { sequence: 2, .. }
    ));
}

#[test]
fn test_tampered_metadata_with_rehash_breaks_next_link() {
    let mut events = session_chain();
    events[2].metadata.insert("chunk".into(), json!(99));
    let recomputed = events[2].recompute_hash().unwrap();
    assert_ne!(recomputed, events[3].previous_hash);
    events[2].event_hash = recomputed;

    let report = verify_chain(&events, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert_eq!(report.violations.len(), 1);
    match &report.violations[0] {
        IntegrityViolation::BrokenLink { sequence, expected, found, .. } => {
            assert_eq!(*sequence, 3);
            assert_eq!(*expected, recomputed);
            assert_eq!(*found, events[3].previous_hash);
        }
        other => panic!("unexpected violation {:?}", other),
    }
}

#[test]
fn test_missing_event_is_sequence_gap() {
    let mut events = session_chain();
    events.remove(3);
    let report = verify_chain(&events, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert_eq!(
        report.violations,
        vec![IntegrityViolation::SequenceGap { after: 2, next: 4 }]
    );
}

#[test]
fn test_unsigned_critical_event_flagged() {
    let mut events = session_chain();
    let export = events
        .iter_mut()
        .find(|e| e.event_type == EventType::DataExported)
        .unwrap();
    export.signature = None;

    let report = verify_chain(&events, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert!(matches!(
        &report.violations[..],
        [IntegrityViolation::MissingSignature { event_type: EventType::DataExported, .. }]
    ));

    // A wider policy also demands signatures on session lifecycle events.
    let strict = CriticalEventPolicy::new([EventType::DataExported, EventType::SessionEnded]);
    let events = session_chain();
    let report = verify_chain(&events, ChainAnchor::Genesis, &strict);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].code(), "MISSING_SIGNATURE");
}

#[test]
fn test_mid_chain_window_anchors() {
    let events = session_chain();
    let tail = &events[3..];

    let unanchored = verify_chain(tail, ChainAnchor::Unanchored, &CriticalEventPolicy::default());
    assert!(unanchored.is_intact());

    let trusted = verify_chain(
        tail,
        ChainAnchor::Trusted(events[2].event_hash),
        &CriticalEventPolicy::default(),
    );
    assert!(trusted.is_intact());

    let wrong = verify_chain(
        tail,
        ChainAnchor::Trusted(events[1].event_hash),
        &CriticalEventPolicy::default(),
    );
    assert_eq!(wrong.violations[0].code(), "BROKEN_LINK");

    let genesis = verify_chain(tail, ChainAnchor::Genesis, &CriticalEventPolicy::default());
    assert!(!genesis.is_intact());
}
