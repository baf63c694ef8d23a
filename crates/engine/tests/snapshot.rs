//! Snapshot resolution across epochs and persisted checkpoints.

use dpos_core::ChainConfig;
use dpos_engine::testing::TestHarness;
use dpos_engine::{build_extra, DposConfig, Snapshot, CHECKPOINT_INTERVAL};

fn epoch_harness(validators: usize, epoch: u64) -> TestHarness {
    let config = DposConfig::default().with_epoch(epoch);
    TestHarness::with_config(validators, config, ChainConfig::new(1))
}

#[test]
fn test_epoch_block_replaces_validators_and_trims_recents() {
    let mut harness = epoch_harness(5, 5);
    for index in 1..=4 {
        harness.seal_next(index);
    }

    let shrunk = vec![harness.address(0), harness.address(1)];
    let mut header = harness.child(harness.address(0));
    header.extra = build_extra(b"", &shrunk, None);
    let header = TestHarness::sign(header, harness.key(0));
    harness.push(header.clone());

    let snap = harness
        .engine()
        .snapshot(header.number, header.hash(), &[])
        .unwrap();
    assert_eq!(snap.validators(), shrunk);
    assert_eq!(snap.signer_limit(), 2);
    assert_eq!(snap.recents.keys().copied().collect::<Vec<_>>(), vec![4, 5]);
}

#[test]
fn test_missing_history_falls_back_to_epoch_checkpoint() {
    let mut harness = epoch_harness(3, 5);
    let mut headers = Vec::new();
    for number in 1..=7u64 {
        headers.push(harness.seal_next((number % 3) as usize));
    }
    harness.chain().forget_number(4);

    let head = headers.last().unwrap();
    let snap = harness
        .engine()
        .snapshot(head.number, head.hash(), &[])
        .unwrap();
    assert_eq!(snap.validators(), harness.addresses());
    assert_eq!(snap.recents.keys().copied().collect::<Vec<_>>(), vec![6, 7]);

    let db = harness.db();
    let checkpoint = Snapshot::load(db.as_ref(), &headers[4].hash())
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.number, 5);
    assert!(checkpoint.recents.is_empty());
}

#[test]
fn test_checkpoint_persisted_at_interval() {
    let mut harness = TestHarness::new(3);
    let mut head = harness.genesis();
    for number in 1..=CHECKPOINT_INTERVAL {
        head = harness.seal_next((number % 3) as usize);
    }

    let db = harness.db();
    assert!(Snapshot::load(db.as_ref(), &head.hash()).unwrap().is_none());

    let snap = harness
        .engine()
        .snapshot(head.number, head.hash(), &[])
        .unwrap();
    let stored = Snapshot::load(db.as_ref(), &head.hash()).unwrap().unwrap();
    assert_eq!(stored, snap);

    let reloaded = harness
        .engine()
        .snapshot(head.number, head.hash(), &[])
        .unwrap();
    assert_eq!(reloaded, snap);
}
