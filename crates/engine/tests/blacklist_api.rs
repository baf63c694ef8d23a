//! Address policy (blacklist, event rules, developer allow-list) and the
//! read-only engine API.

use dpos_core::system::{ADDRESS_LIST_CONTRACT, DEV_MAPPING_POSITION};
use dpos_core::{ChainConfig, CheckType, EventRuleEntry, StateDb, StateFn};
use dpos_engine::testing::{MemoryState, TestHarness};
use dpos_engine::{DposApi, DposConfig, DposError};
use dpos_types::{keccak256_concat, Address, Hash, Header, Log, Transaction, U256};
use std::sync::Arc;

fn black_from() -> Address {
    Address::repeat_byte(0xa1)
}

fn black_to() -> Address {
    Address::repeat_byte(0xa2)
}

fn clean() -> Address {
    Address::repeat_byte(0xa3)
}

fn transfer(to: Address) -> Transaction {
    Transaction::new(0, to, U256::one(), 21_000, U256::one(), Vec::new())
}

fn policy_setup(chain: ChainConfig) -> (TestHarness, Header) {
    let mut harness = TestHarness::with_config(3, DposConfig::default(), chain);
    harness.seal_next(1);
    harness
        .contracts()
        .set_blacklist(vec![black_from()], vec![black_to()]);
    let header = harness.child(harness.address(2));
    (harness, header)
}

#[test]
fn test_validate_tx_applies_directions() {
    let (harness, header) = policy_setup(ChainConfig::new(1).with_red_coast_block(0));
    let engine = harness.engine();
    let mut state = MemoryState::new();

    let denied = engine.validate_tx(&black_from(), &transfer(clean()), &header, &mut state);
    assert!(matches!(denied, Err(DposError::AddressDenied)));

    let denied = engine.validate_tx(&clean(), &transfer(black_to()), &header, &mut state);
    assert!(matches!(denied, Err(DposError::AddressDenied)));

    engine
        .validate_tx(&black_to(), &transfer(black_from()), &header, &mut state)
        .unwrap();
    engine
        .validate_tx(&clean(), &transfer(clean()), &header, &mut state)
        .unwrap();

    // One contract read per parent block.
    assert_eq!(harness.contracts().call_count("getBlacksFrom"), 1);
    assert_eq!(harness.contracts().call_count("getBlacksTo"), 1);
}

#[test]
fn test_validate_tx_inactive_before_fork() {
    let (harness, header) = policy_setup(ChainConfig::new(1).with_red_coast_block(2));
    let engine = harness.engine();

    engine
        .validate_tx(&black_from(), &transfer(clean()), &header, &mut MemoryState::new())
        .unwrap();
    assert!(harness.contracts().calls().is_empty());
}

#[test]
fn test_extra_validator_denies_addresses_and_events() {
    let chain = ChainConfig::new(1)
        .with_red_coast_block(0)
        .with_sophon_block(0);
    let (harness, header) = policy_setup(chain);
    let transfer_sig = Hash::repeat_byte(0xee);
    harness.contracts().set_rules(vec![EventRuleEntry {
        event_sig: transfer_sig,
        arg_index: 2,
        check: CheckType::To,
    }]);

    let policy = harness
        .engine()
        .create_evm_extra_validator(&header, &mut MemoryState::new())
        .unwrap();

    assert!(policy.is_address_denied(&black_from(), CheckType::From));
    assert!(!policy.is_address_denied(&black_from(), CheckType::To));
    assert!(policy.is_address_denied(&black_to(), CheckType::BothInAny));
    assert!(!policy.is_address_denied(&clean(), CheckType::BothInAny));

    let topic = |address: Address| Hash::from(address);
    let log = |to: Address| Log {
        topics: vec![transfer_sig, topic(clean()), topic(to)],
        ..Default::default()
    };
    assert!(policy.is_log_denied(&log(black_to())));
    assert!(!policy.is_log_denied(&log(black_from())));
    assert!(!policy.is_log_denied(&log(clean())));
}

#[test]
fn test_extra_validator_absent_before_sophon() {
    let (harness, header) = policy_setup(ChainConfig::new(1).with_red_coast_block(0));
    assert!(harness
        .engine()
        .create_evm_extra_validator(&header, &mut MemoryState::new())
        .is_none());
}

#[test]
fn test_extra_validator_absent_when_rules_fail() {
    let chain = ChainConfig::new(1)
        .with_red_coast_block(0)
        .with_sophon_block(0);
    let (harness, header) = policy_setup(chain);
    harness.contracts().fail_on("rulesLen");

    assert!(harness
        .engine()
        .create_evm_extra_validator(&header, &mut MemoryState::new())
        .is_none());
}

fn dev_slot(address: &Address) -> Hash {
    let mut key = [0u8; 32];
    key[12..].copy_from_slice(address.as_bytes());
    let mut position = [0u8; 32];
    position[30..].copy_from_slice(&DEV_MAPPING_POSITION.to_be_bytes());
    keccak256_concat(&[key.as_slice(), position.as_slice()])
}

#[test]
fn test_can_create_follows_dev_allow_list() {
    let config = DposConfig::default().with_dev_verification(true);
    let harness = TestHarness::with_config(1, config, ChainConfig::new(1).with_red_coast_block(0));
    let engine = harness.engine();
    let developer = Address::repeat_byte(0xd0);

    let mut state = MemoryState::new();
    assert!(engine.can_create(&state, &clean(), 5));

    let mut packed = [0u8; 32];
    packed[30] = 1;
    state.set_storage(ADDRESS_LIST_CONTRACT, Hash::zero(), Hash::from(packed));
    state.set_storage(ADDRESS_LIST_CONTRACT, dev_slot(&developer), Hash::from_low_u64_be(1));

    assert!(engine.can_create(&state, &developer, 5));
    assert!(!engine.can_create(&state, &clean(), 5));
}

#[test]
fn test_can_create_without_dev_verification() {
    let harness = TestHarness::with_config(
        1,
        DposConfig::default(),
        ChainConfig::new(1).with_red_coast_block(0),
    );
    let mut state = MemoryState::new();
    let mut packed = [0u8; 32];
    packed[30] = 1;
    state.set_storage(ADDRESS_LIST_CONTRACT, Hash::zero(), Hash::from(packed));

    assert!(harness.engine().can_create(&state, &clean(), 5));
}

#[test]
fn test_status_over_mixed_turns() {
    let mut harness = TestHarness::new(3);
    for index in [0, 2, 1, 0, 2] {
        harness.seal_next(index);
    }

    let status = DposApi::new(harness.engine()).status().unwrap();
    assert_eq!(status.num_blocks, 4);
    assert!((status.inturn_percent - 25.0).abs() < f64::EPSILON);
    assert_eq!(status.sealer_activity[&harness.address(0)], 2);
    assert_eq!(status.sealer_activity[&harness.address(1)], 1);
    assert_eq!(status.sealer_activity[&harness.address(2)], 1);
}

#[test]
fn test_contract_queries_through_state_fn() {
    let harness = TestHarness::new(3);
    let contracts = harness.contracts();
    contracts.set_elected(vec![harness.address(2)]);
    contracts.set_block_reward(U256::from(77));

    let engine = harness.engine();
    let state_fn: StateFn =
        Arc::new(|_: &Hash| Ok(Box::new(MemoryState::new()) as Box<dyn StateDb + Send>));
    engine.set_state_fn(state_fn);

    let api = DposApi::new(engine);
    assert_eq!(
        api.get_current_epoch_validators(None).unwrap(),
        vec![harness.address(2)]
    );
    assert_eq!(
        api.get_epoch_info(0, Some(0)).unwrap().block_reward,
        U256::from(77)
    );
    assert!(matches!(
        api.get_epoch_info(0, Some(42)),
        Err(DposError::UnknownBlock)
    ));
}
