// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::filter::TimeWindow;
use crate::hash::EventHash;
use crate::merkle::{compute_merkle_root, inclusion_proof, verify_inclusion, Checkpoint};
use crate::tests::{base_time, session_chain};
use chrono::Duration;
use proptest::prelude::*;

fn leaves(n: usize) -> Vec<EventHash> {
    (0..n).map(|i| EventHash::digest(&(i as u64).to_le_bytes())).collect()
}

#[test]
fn test_root_deterministic() {
    let l = leaves(7);
    assert_eq!(compute_merkle_root(&l), compute_merkle_root(&l));
}

#[test]
fn test_root_is_order_sensitive() {
    let l = leaves(4);
    let mut swapped = l.clone();
    swapped.swap(1, 2);
    assert_ne!(compute_merkle_root(&l), compute_merkle_root(&swapped));
}

#[test]
fn test_no_duplicate_last_leaf_collision() {
    let l = leaves(3);
    let mut padded = l.clone();
    padded.push(l[2]);
    assert_ne!(compute_merkle_root(&l), compute_merkle_root(&padded));
}

#[test]
fn test_single_leaf_differs_from_leaf_itself() {
    let l = leaves(1);
    assert_ne!(compute_merkle_root(&l), l[0]);
}

#[test]
fn test_inclusion_proofs_verify() {
    for n in 1..=9 {
        let l = leaves(n);
        let root = compute_merkle_root(&l);
        for i in 0..n {
            let path = inclusion_proof(&l, i).unwrap();
            assert!(verify_inclusion(&l[i], &path, &root), "n={} i={}", n, i);
            assert!(!verify_inclusion(&EventHash::digest(b"x"), &path, &root));
        }
        assert!(inclusion_proof(&l, n).is_none());
    }
}

#[test]
fn test_checkpoint_from_events() {
    let events = session_chain();
    let window = TimeWindow::new(base_time(), base_time() + Duration::hours(1)).unwrap();
    let cp = Checkpoint::from_events(window, &events, base_time());

    assert_eq!(cp.event_count, 6);
    assert_eq!(cp.first_sequence, Some(0));
    assert_eq!(cp.last_sequence, Some(5));
    assert_eq!(cp.last_event_hash, Some(events[5].event_hash));
    assert_eq!(cp.id(), format!("{:020}-{:020}", 0, 5));

    let later = Checkpoint::from_events(window, &events, base_time() + Duration::days(1));
    assert!(cp.matches(&later), "created_at must not affect matching");

    let json = serde_json::to_string(&cp).unwrap();
    let decoded: Checkpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(cp, decoded);
}

proptest! {
    #[test]
    fn prop_single_leaf_change_changes_root(n in 1usize..40, idx in 0usize..40, salt in any::<u64>()) {
        let l = leaves(n);
        let i = idx % n;
        let mut changed = l.clone();
        changed[i] = EventHash::digest(&salt.to_le_bytes());
        prop_assume!(changed[i] != l[i]);
        prop_assert_ne!(compute_merkle_root(&l), compute_merkle_root(&changed));
    }
}
