// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::canonical::{canonical_bytes, canonicalize, MetadataLimits};
use crate::error::CoreError;
use crate::event::{EventRequest, EventType, Metadata};
use serde_json::json;

#[test]
fn test_canonical_form_is_sorted_and_compact() {
    let mut m = Metadata::new();
    m.insert("b".into(), json!([3, 1.5, "x"]));
    m.insert("a".into(), json!({"z": null, "k": true}));

    let bytes = canonical_bytes(&m).unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        r#"{"a":{"k":true,"z":null},"b":[3,1.5,"x"]}"#
    );
}

#[test]
fn test_canonical_number_format_is_stable() {
    let a: Metadata = serde_json::from_str(r#"{"n": 1.0}"#).unwrap();
    let b: Metadata = serde_json::from_str(r#"{"n": 1}"#).unwrap();
    assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
}

#[test]
fn test_blank_key_rejected() {
    let mut m = Metadata::new();
    m.insert(" ".into(), json!(1));
    assert!(matches!(
        canonicalize(&m, &MetadataLimits::default()),
        Err(CoreError::Validation(_))
    ));
}

#[test]
fn test_depth_limit() {
    let limits = MetadataLimits { max_bytes: 1024, max_depth: 2 };
    let mut ok = Metadata::new();
    ok.insert("k".into(), json!({"a": [1]}));
    assert!(canonicalize(&ok, &limits).is_ok());

    let mut deep = Metadata::new();
    deep.insert("k".into(), json!({"a": {"b": [1]}}));
    assert!(matches!(canonicalize(&deep, &limits), Err(CoreError::Validation(_))));
}

#[test]
fn test_size_limit_rejects_before_hashing() {
    let limits = MetadataLimits { max_bytes: 32, max_depth: 4 };
    let req = EventRequest::new(EventType::DataIngested).meta("blob", "x".repeat(64));
    let err = req.into_draft(&limits).unwrap_err();
    assert!(matches!(err, CoreError::Validation(msg) if msg.contains("max 32")));
}
