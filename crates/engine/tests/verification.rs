//! Header and seal verification across a multi-validator chain.
//!
//! Builds chains with the test harness and checks that followers accept
//! correctly sealed headers, reject each kind of misbehaving sealer, and
//! stream batch results in order.

use dpos_core::{ChainConfig, MemoryDatabase};
use dpos_engine::testing::{MemoryChain, TestHarness};
use dpos_engine::{ecrecover, Dpos, DposConfig, DposError, DIFF_IN_TURN, DIFF_NO_TURN};
use dpos_types::{Header, KeyPair, U256};
use std::sync::Arc;
use std::time::Duration;

/// An engine over a chain holding only the harness genesis, so every later
/// header has to be supplied as a parent.
fn detached_engine(harness: &TestHarness) -> Arc<Dpos> {
    let chain = Arc::new(MemoryChain::new(ChainConfig::new(1)));
    chain.insert(harness.genesis());
    Arc::new(Dpos::new(
        DposConfig::default(),
        Arc::new(MemoryDatabase::new()),
        chain,
        harness.contracts(),
        harness.executor(),
    ))
}

#[test]
fn test_in_turn_chain_verifies() {
    let mut harness = TestHarness::new(3);
    let mut headers = Vec::new();
    for number in 1..=9u64 {
        headers.push(harness.seal_next((number % 3) as usize));
    }

    let engine = harness.engine();
    for header in &headers {
        assert_eq!(header.difficulty, U256::from(DIFF_IN_TURN));
        engine.verify_header(header).unwrap();
        assert_eq!(ecrecover(header).unwrap(), header.coinbase);
    }
}

#[test]
fn test_out_of_turn_block_verifies() {
    let mut harness = TestHarness::new(3);
    let header = harness.seal_next(0);

    assert_eq!(header.difficulty, U256::from(DIFF_NO_TURN));
    harness.engine().verify_header(&header).unwrap();
}

#[test]
fn test_recent_signer_rejected() {
    let mut harness = TestHarness::new(3);
    harness.seal_next(1);
    let again = harness.seal_next(1);

    let err = harness.engine().verify_header(&again).unwrap_err();
    assert!(matches!(err, DposError::RecentlySigned));
}

#[test]
fn test_signer_may_return_after_window() {
    let mut harness = TestHarness::new(3);
    harness.seal_next(1);
    harness.seal_next(2);
    let back = harness.seal_next(1);

    harness.engine().verify_header(&back).unwrap();
}

#[test]
fn test_outsider_rejected() {
    let mut harness = TestHarness::new(3);
    let header = harness.seal_with(&KeyPair::from_seed(99));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::UnauthorizedValidator));
}

#[test]
fn test_wrong_difficulty_rejected() {
    let harness = TestHarness::new(3);
    let mut header = harness.child(harness.address(1));
    header.difficulty = U256::from(DIFF_NO_TURN);
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::WrongDifficulty));

    let relaxed = Dpos::new(
        DposConfig::default(),
        harness.db(),
        harness.chain(),
        harness.contracts(),
        harness.executor(),
    )
    .with_fake_diff();
    relaxed.verify_header(&header).unwrap();
}

#[test]
fn test_coinbase_must_match_signer() {
    let harness = TestHarness::new(3);
    let header = harness.child(harness.address(2));
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::InvalidCoinbase));
}

#[test]
fn test_zero_difficulty_rejected() {
    let harness = TestHarness::new(3);
    let mut header = harness.child(harness.address(1));
    header.difficulty = U256::zero();
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::InvalidDifficulty));
}

#[test]
fn test_base_fee_before_london_rejected() {
    let harness = TestHarness::new(3);
    let mut header = harness.child(harness.address(1));
    header.base_fee = Some(U256::from(1_000_000_000u64));
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::InvalidBaseFee(_)));
}

#[test]
fn test_gas_limit_jump_rejected() {
    let harness = TestHarness::new(3);
    let mut header = harness.child(harness.address(1));
    header.gas_limit *= 2;
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::InvalidGasLimit { .. }));
}

#[test]
fn test_gas_used_above_limit_rejected() {
    let harness = TestHarness::new(3);
    let mut header = harness.child(harness.address(1));
    header.gas_used = header.gas_limit + 1;
    let header = TestHarness::sign(header, harness.key(1));

    let err = harness.engine().verify_header(&header).unwrap_err();
    assert!(matches!(err, DposError::InvalidGasUsed { .. }));
}

#[test]
fn test_verify_headers_uses_batch_parents() {
    let mut harness = TestHarness::new(3);
    let headers: Vec<Header> = (1..=5u64)
        .map(|number| harness.seal_next((number % 3) as usize))
        .collect();

    let engine = detached_engine(&harness);
    assert!(engine.verify_header(&headers[1]).is_err());

    let (_abort, results) = engine.verify_headers(headers.clone());
    let results: Vec<_> = results.iter().collect();
    assert_eq!(results.len(), headers.len());
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn test_verify_headers_reports_in_order() {
    let mut harness = TestHarness::new(3);
    let mut headers: Vec<Header> = (1..=4u64)
        .map(|number| harness.seal_next((number % 3) as usize))
        .collect();
    headers[2].extra.truncate(10);

    let (_abort, results) = harness.engine().verify_headers(headers);
    assert!(results.recv().unwrap().is_ok());
    assert!(results.recv().unwrap().is_ok());
    assert!(matches!(
        results.recv().unwrap(),
        Err(DposError::MissingVanity)
    ));
}

#[test]
fn test_verify_headers_dropped_handle_delivers_all() {
    let mut harness = TestHarness::new(3);
    let headers: Vec<Header> = (1..=30u64)
        .map(|number| harness.seal_next((number % 3) as usize))
        .collect();
    let total = headers.len();

    let (_, results) = harness.engine().verify_headers(headers);
    let results: Vec<_> = results.iter().collect();
    assert_eq!(results.len(), total);
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn test_verify_headers_abort_closes_results() {
    let mut harness = TestHarness::new(3);
    let headers: Vec<Header> = (1..=30u64)
        .map(|number| harness.seal_next((number % 3) as usize))
        .collect();

    let (abort, results) = harness.engine().verify_headers(headers);
    abort.abort();

    // The worker exits after the abort, so the channel disconnects rather
    // than timing out.
    let closed = loop {
        match results.recv_timeout(Duration::from_secs(5)) {
            Ok(result) => assert!(result.is_ok()),
            Err(err) => break err,
        }
    };
    assert!(closed.is_disconnected());
}

#[test]
fn test_verify_headers_empty_batch() {
    let harness = TestHarness::new(3);
    let (_abort, results) = harness.engine().verify_headers(Vec::new());
    assert!(results.recv_timeout(Duration::from_secs(5)).is_err());
}
