// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod metadata_tests;
pub mod proof_tests;
pub mod e2e_tests;

use crate::canonical::MetadataLimits;
use crate::event::{EventRequest, EventType, LedgerEvent};
use crate::hash::{EventHash, GENESIS_HASH};
use chrono::{DateTime, Duration, Utc};

pub(crate) fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap() // 2025-01-01T00:00:00Z
}

/// Link a list of requests into a chain, one second apart, signing
/// exported events with a fixed placeholder signature.
pub(crate) fn link_all(requests: Vec<EventRequest>) -> Vec<LedgerEvent> {
    let mut previous = GENESIS_HASH;
    let mut events = Vec::new();
    for (i, req) in requests.into_iter().enumerate() {
        let draft = req.into_draft(&MetadataLimits::default()).unwrap();
        let mut event = draft.link(i as u64, base_time() + Duration::seconds(i as i64), previous);
        if event.event_type == EventType::DataExported {
            event = event.with_signature("test/key", "00".repeat(64));
        }
        previous = event.event_hash;
        events.push(event);
    }
    events
}

/// The session scenario: created, three ingests, one export, ended.
pub(crate) fn session_chain() -> Vec<LedgerEvent> {
    let mut requests = vec![EventRequest::new(EventType::SessionCreated)
        .session("sess-1")
        .user("clinician-9")
        .device("eeg-64")];
    for chunk in 0u8..3 {
        requests.push(
            EventRequest::new(EventType::DataIngested)
                .session("sess-1")
                .device("eeg-64")
                .data(EventHash::digest(&[chunk]).to_hex(), 4096)
                .meta("chunk", chunk),
        );
    }
    requests.push(
        EventRequest::new(EventType::DataExported)
            .session("sess-1")
            .user("clinician-9")
            .meta("destination", "s3://research-bucket"),
    );
    requests.push(EventRequest::new(EventType::SessionEnded).session("sess-1").user("clinician-9"));
    link_all(requests)
}
