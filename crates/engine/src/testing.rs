//! In-memory collaborators for tests and simulations.
//!
//! - [`MemoryChain`]: header store implementing [`ChainHeaderReader`]
//! - [`MemoryState`]: account state implementing [`StateDb`]
//! - [`MockContracts`]: scriptable [`SystemContracts`] that records every call
//! - [`RecordingExecutor`]: [`TransactionExecutor`] that records messages and
//!   emits one log per successful call
//! - [`TestHarness`]: a genesis plus helpers that extend a correctly sealed
//!   chain and build engines over it

use crate::extra::build_extra;
use crate::signer::{key_signer, key_tx_signer, seal_hash};
use crate::snapshot::Snapshot;
use crate::{Dpos, DposConfig, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL};
use dpos_core::{
    CallOpts, ChainConfig, ChainHeaderReader, ContractError, EpochInfo, EventRuleEntry,
    ExecutionError, Message, MemoryDatabase, StateDb, SystemContracts, TransactionExecutor,
    ValidatorsInit,
};
use dpos_types::test_utils::{addresses, sorted_keys};
use dpos_types::{
    keccak256, ordered_list_hash, Address, Hash, Header, KeyPair, Log, Proposal, EMPTY_UNCLE_HASH,
    U256,
};
use parking_lot::{Mutex, RwLock};
use rlp::RlpStream;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════
// Chain
// ═══════════════════════════════════════════════════════════════════════════

/// Headers by hash plus a canonical number index.
pub struct MemoryChain {
    config: ChainConfig,
    headers: RwLock<HashMap<Hash, Header>>,
    canonical: RwLock<BTreeMap<u64, Hash>>,
}

impl MemoryChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            headers: RwLock::new(HashMap::new()),
            canonical: RwLock::new(BTreeMap::new()),
        }
    }

    /// Store `header` and make it canonical at its height.
    pub fn insert(&self, header: Header) {
        let hash = header.hash();
        self.canonical.write().insert(header.number, hash);
        self.headers.write().insert(hash, header);
    }

    /// Drop the canonical index entry at `number`, leaving the header
    /// reachable by hash only.
    pub fn forget_number(&self, number: u64) {
        self.canonical.write().remove(&number);
    }
}

impl ChainHeaderReader for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_header(&self) -> Option<Header> {
        let hash = *self.canonical.read().values().next_back()?;
        self.headers.read().get(&hash).cloned()
    }

    fn get_header(&self, hash: &Hash, number: u64) -> Option<Header> {
        self.headers
            .read()
            .get(hash)
            .filter(|h| h.number == number)
            .cloned()
    }

    fn get_header_by_number(&self, number: u64) -> Option<Header> {
        let hash = *self.canonical.read().get(&number)?;
        self.headers.read().get(&hash).cloned()
    }

    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header> {
        self.headers.read().get(hash).cloned()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════════════════════

/// Flat account state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    balances: BTreeMap<Address, U256>,
    nonces: BTreeMap<Address, u64>,
    storage: BTreeMap<(Address, Hash), Hash>,
    code: BTreeMap<Address, Vec<u8>>,
    logs: Vec<Log>,
    tx_hash: Hash,
    tx_index: usize,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_code(&mut self, address: Address, code: Vec<u8>) {
        self.code.insert(address, code);
    }

    pub fn code(&self, address: &Address) -> Option<&Vec<u8>> {
        self.code.get(address)
    }

    pub fn set_storage(&mut self, address: Address, slot: Hash, value: Hash) {
        self.storage.insert((address, slot), value);
    }

    /// Every log recorded so far, in order.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }
}

fn state_entry(kind: u8, address: &Address, key: Vec<u8>, value: Vec<u8>) -> Vec<u8> {
    let mut s = RlpStream::new_list(4);
    s.append(&kind);
    s.append(address);
    s.append(&key);
    s.append(&value);
    s.out().to_vec()
}

impl StateDb for MemoryState {
    fn get_balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, amount: U256) {
        let balance = self.balances.entry(*address).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn set_balance(&mut self, address: &Address, amount: U256) {
        self.balances.insert(*address, amount);
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or_default()
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.nonces.insert(*address, nonce);
    }

    fn get_state(&self, address: &Address, slot: &Hash) -> Hash {
        self.storage
            .get(&(*address, *slot))
            .copied()
            .unwrap_or_default()
    }

    fn erase(&mut self, address: &Address) -> bool {
        let existed = self.code.remove(address).is_some();
        self.storage.retain(|(owner, _), _| owner != address);
        existed
    }

    fn prepare(&mut self, tx_hash: Hash, tx_index: usize) {
        self.tx_hash = tx_hash;
        self.tx_index = tx_index;
    }

    fn tx_index(&self) -> usize {
        self.tx_index
    }

    fn add_log(&mut self, mut log: Log) {
        log.tx_hash = self.tx_hash;
        log.tx_index = self.tx_index;
        log.index = self.logs.len();
        self.logs.push(log);
    }

    fn get_logs(&self, tx_hash: &Hash, block_hash: &Hash) -> Vec<Log> {
        self.logs
            .iter()
            .filter(|log| log.tx_hash == *tx_hash)
            .cloned()
            .map(|mut log| {
                log.block_hash = *block_hash;
                log
            })
            .collect()
    }

    fn intermediate_root(&mut self, _delete_empty_objects: bool) -> Hash {
        let balances = self
            .balances
            .iter()
            .map(|(a, b)| state_entry(0, a, Vec::new(), rlp::encode(b).to_vec()));
        let nonces = self
            .nonces
            .iter()
            .map(|(a, n)| state_entry(1, a, Vec::new(), rlp::encode(n).to_vec()));
        let storage = self
            .storage
            .iter()
            .map(|((a, k), v)| state_entry(2, a, k.as_bytes().to_vec(), v.as_bytes().to_vec()));
        let code = self
            .code
            .iter()
            .map(|(a, c)| state_entry(3, a, Vec::new(), keccak256(c).as_bytes().to_vec()));
        ordered_list_hash(balances.chain(nonces).chain(storage).chain(code))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// System contracts
// ═══════════════════════════════════════════════════════════════════════════

/// One recorded contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub method: &'static str,
    pub opts: CallOpts,
    pub block: u64,
}

#[derive(Default)]
struct MockContractsInner {
    calls: Vec<ContractCall>,
    failing: HashSet<&'static str>,
    elected: Vec<Address>,
    kickout: bool,
    block_reward: U256,
    proposals: Vec<Proposal>,
    blacks_from: Vec<Address>,
    blacks_to: Vec<Address>,
    rules: Vec<EventRuleEntry>,
    validators_init: Option<ValidatorsInit>,
    punished: Vec<Address>,
    distributed: Vec<U256>,
}

/// Scriptable system contracts. State-changing calls check and bump the
/// caller's nonce the way a real call would.
#[derive(Default)]
pub struct MockContracts {
    inner: Mutex<MockContractsInner>,
}

impl MockContracts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `method` fail.
    pub fn fail_on(&self, method: &'static str) {
        self.inner.lock().failing.insert(method);
    }

    pub fn set_elected(&self, validators: Vec<Address>) {
        self.inner.lock().elected = validators;
    }

    pub fn set_kickout(&self, kickout: bool) {
        self.inner.lock().kickout = kickout;
    }

    pub fn set_block_reward(&self, reward: U256) {
        self.inner.lock().block_reward = reward;
    }

    pub fn set_proposals(&self, proposals: Vec<Proposal>) {
        self.inner.lock().proposals = proposals;
    }

    pub fn set_blacklist(&self, from: Vec<Address>, to: Vec<Address>) {
        let mut inner = self.inner.lock();
        inner.blacks_from = from;
        inner.blacks_to = to;
    }

    pub fn set_rules(&self, rules: Vec<EventRuleEntry>) {
        self.inner.lock().rules = rules;
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.inner.lock().calls.clone()
    }

    /// Method names in call order.
    pub fn methods(&self) -> Vec<&'static str> {
        self.inner.lock().calls.iter().map(|c| c.method).collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn validators_init(&self) -> Option<ValidatorsInit> {
        self.inner.lock().validators_init.clone()
    }

    pub fn punished(&self) -> Vec<Address> {
        self.inner.lock().punished.clone()
    }

    pub fn distributed(&self) -> Vec<U256> {
        self.inner.lock().distributed.clone()
    }

    /// Remaining (unfinished) proposals.
    pub fn proposals(&self) -> Vec<Proposal> {
        self.inner.lock().proposals.clone()
    }

    fn record(
        &self,
        method: &'static str,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<(), ContractError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ContractCall {
            method,
            opts,
            block: header.number,
        });
        if inner.failing.contains(method) {
            return Err(ContractError::call(
                method,
                ExecutionError::Reverted("mock failure".into()),
            ));
        }
        if opts.check_nonce {
            let nonce = state.get_nonce(&opts.from);
            if nonce != opts.nonce {
                return Err(ContractError::call(
                    method,
                    ExecutionError::NonceMismatch {
                        address: opts.from,
                        expected: nonce,
                        got: opts.nonce,
                    },
                ));
            }
            state.set_nonce(&opts.from, nonce + 1);
        }
        Ok(())
    }
}

impl SystemContracts for MockContracts {
    fn initialize_proposals(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        _validators_contract: Address,
    ) -> Result<(), ContractError> {
        self.record("Proposals.initialize", state, header, opts)
    }

    fn initialize_system_rewards(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        _validators_contract: Address,
        _node_votes_contract: Address,
    ) -> Result<(), ContractError> {
        self.record("SystemRewards.initialize", state, header, opts)
    }

    fn initialize_validators(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        init: &ValidatorsInit,
    ) -> Result<(), ContractError> {
        self.record("Validators.initialize", state, header, opts)?;
        self.inner.lock().validators_init = Some(init.clone());
        Ok(())
    }

    fn initialize_node_votes(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        _validators_contract: Address,
        _system_rewards_contract: Address,
    ) -> Result<(), ContractError> {
        self.record("NodeVotes.initialize", state, header, opts)
    }

    fn initialize_address_list(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        _admin: Address,
    ) -> Result<(), ContractError> {
        self.record("AddressList.initialize", state, header, opts)
    }

    fn initialize_address_list_v2(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<(), ContractError> {
        self.record("AddressList.initializeV2", state, header, opts)
    }

    fn punish(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        validator: Address,
    ) -> Result<bool, ContractError> {
        self.record("punish", state, header, opts)?;
        let mut inner = self.inner.lock();
        inner.punished.push(validator);
        Ok(inner.kickout)
    }

    fn try_elect(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<(), ContractError> {
        self.record("tryElect", state, header, opts)
    }

    fn get_cur_epoch_validators(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError> {
        self.record("getCurEpochValidators", state, header, opts)?;
        Ok(self.inner.lock().elected.clone())
    }

    fn epoch_info(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        _epoch: u64,
    ) -> Result<EpochInfo, ContractError> {
        self.record("epochs", state, header, opts)?;
        Ok(EpochInfo {
            block_reward: self.inner.lock().block_reward,
            ..Default::default()
        })
    }

    fn distribute_block_reward(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        amount: U256,
    ) -> Result<(), ContractError> {
        self.record("distributeBlockReward", state, header, opts)?;
        self.inner.lock().distributed.push(amount);
        Ok(())
    }

    fn passed_proposal_count(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<u32, ContractError> {
        self.record("getPassedProposalCount", state, header, opts)?;
        Ok(self.inner.lock().proposals.len() as u32)
    }

    fn passed_proposal_by_index(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        index: u32,
    ) -> Result<Proposal, ContractError> {
        self.record("getPassedProposalByIndex", state, header, opts)?;
        self.inner
            .lock()
            .proposals
            .get(index as usize)
            .cloned()
            .ok_or(ContractError::InvalidOutput {
                method: "getPassedProposalByIndex",
                detail: format!("no proposal at index {index}"),
            })
    }

    fn finish_proposal_by_id(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        id: U256,
    ) -> Result<(), ContractError> {
        self.record("finishProposalById", state, header, opts)?;
        self.inner.lock().proposals.retain(|p| p.id != id);
        Ok(())
    }

    fn blacks_from(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError> {
        self.record("getBlacksFrom", state, header, opts)?;
        Ok(self.inner.lock().blacks_from.clone())
    }

    fn blacks_to(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError> {
        self.record("getBlacksTo", state, header, opts)?;
        Ok(self.inner.lock().blacks_to.clone())
    }

    fn rules_len(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<u32, ContractError> {
        self.record("rulesLen", state, header, opts)?;
        Ok(self.inner.lock().rules.len() as u32)
    }

    fn rule_by_index(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        index: u32,
    ) -> Result<EventRuleEntry, ContractError> {
        self.record("getRuleByIndex", state, header, opts)?;
        self.inner
            .lock()
            .rules
            .get(index as usize)
            .copied()
            .ok_or(ContractError::InvalidOutput {
                method: "getRuleByIndex",
                detail: format!("no rule at index {index}"),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════

/// Records every message. Successful calls return their input and emit one
/// log at the target whose topic is the Keccak-256 of the input.
#[derive(Default)]
pub struct RecordingExecutor {
    messages: Mutex<Vec<Message>>,
    fail: Mutex<bool>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

impl TransactionExecutor for RecordingExecutor {
    fn execute(
        &self,
        message: &Message,
        state: &mut dyn StateDb,
        header: &Header,
    ) -> Result<Vec<u8>, ExecutionError> {
        self.messages.lock().push(message.clone());
        if *self.fail.lock() {
            return Err(ExecutionError::Reverted("mock revert".into()));
        }
        state.add_log(Log {
            address: message.to.unwrap_or_default(),
            topics: vec![keccak256(&message.data)],
            data: message.data.clone(),
            block_number: header.number,
            ..Default::default()
        });
        Ok(message.data.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Harness
// ═══════════════════════════════════════════════════════════════════════════

/// A genesis over `n` deterministic validators and a chain that can be
/// extended with correctly sealed headers. Validator `i` is the `i`-th
/// address in ascending order, so it is in-turn at blocks `i mod n`.
pub struct TestHarness {
    keys: Vec<KeyPair>,
    config: DposConfig,
    chain: Arc<MemoryChain>,
    db: Arc<MemoryDatabase>,
    contracts: Arc<MockContracts>,
    executor: Arc<RecordingExecutor>,
    genesis: Header,
    head: Header,
}

impl TestHarness {
    pub fn new(validators: usize) -> Self {
        Self::with_config(validators, DposConfig::default(), ChainConfig::new(1))
    }

    pub fn with_config(validators: usize, config: DposConfig, chain_config: ChainConfig) -> Self {
        let keys = sorted_keys(validators);
        let genesis = Header {
            number: 0,
            time: crate::produce::now_unix().saturating_sub(100_000),
            gas_limit: 8_000_000,
            difficulty: U256::one(),
            uncle_hash: EMPTY_UNCLE_HASH,
            extra: build_extra(b"", &addresses(&keys), None),
            ..Default::default()
        };
        let chain = Arc::new(MemoryChain::new(chain_config));
        chain.insert(genesis.clone());
        Self {
            keys,
            config: config.normalized(),
            chain,
            db: Arc::new(MemoryDatabase::new()),
            contracts: Arc::new(MockContracts::new()),
            executor: Arc::new(RecordingExecutor::new()),
            head: genesis.clone(),
            genesis,
        }
    }

    pub fn key(&self, index: usize) -> &KeyPair {
        &self.keys[index]
    }

    pub fn address(&self, index: usize) -> Address {
        self.keys[index].address()
    }

    pub fn addresses(&self) -> Vec<Address> {
        addresses(&self.keys)
    }

    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    pub fn genesis(&self) -> Header {
        self.genesis.clone()
    }

    pub fn head(&self) -> Header {
        self.head.clone()
    }

    pub fn genesis_snapshot(&self) -> Snapshot {
        Snapshot::new(0, self.genesis.hash(), self.addresses())
    }

    pub fn chain(&self) -> Arc<MemoryChain> {
        Arc::clone(&self.chain)
    }

    pub fn db(&self) -> Arc<MemoryDatabase> {
        Arc::clone(&self.db)
    }

    pub fn contracts(&self) -> Arc<MockContracts> {
        Arc::clone(&self.contracts)
    }

    pub fn executor(&self) -> Arc<RecordingExecutor> {
        Arc::clone(&self.executor)
    }

    /// A fresh engine over the shared chain and store, with no local
    /// validator.
    pub fn unauthorized_engine(&self) -> Arc<Dpos> {
        Arc::new(Dpos::new(
            self.config.clone(),
            self.db.clone(),
            self.chain.clone(),
            self.contracts.clone(),
            self.executor.clone(),
        ))
    }

    /// A fresh engine sealing as validator `index`.
    pub fn engine_for(&self, index: usize) -> Arc<Dpos> {
        let engine = self.unauthorized_engine();
        let key = self.keys[index].clone();
        engine.authorize(key.address(), key_signer(key.clone()), key_tx_signer(key));
        engine
    }

    /// A fresh engine sealing as validator 0.
    pub fn engine(&self) -> Arc<Dpos> {
        self.engine_for(0)
    }

    /// Unsigned child of the head for `coinbase`, with the difficulty the
    /// turn order prescribes and the validator list on epoch blocks.
    pub fn child(&self, coinbase: Address) -> Header {
        let number = self.head.number + 1;
        let validators = self.addresses();
        let inturn = validators
            .iter()
            .position(|v| *v == coinbase)
            .map_or(false, |i| number % validators.len() as u64 == i as u64);
        let listed: &[Address] = if number % self.config.epoch == 0 {
            &validators
        } else {
            &[]
        };
        Header {
            parent_hash: self.head.hash(),
            uncle_hash: EMPTY_UNCLE_HASH,
            coinbase,
            difficulty: U256::from(if inturn { DIFF_IN_TURN } else { DIFF_NO_TURN }),
            number,
            gas_limit: self.head.gas_limit,
            time: self.head.time + self.config.period,
            extra: build_extra(b"", listed, None),
            ..Default::default()
        }
    }

    /// Sign `header` with `key`, writing the seal into `extra`.
    pub fn sign(mut header: Header, key: &KeyPair) -> Header {
        let hash = seal_hash(&header).expect("extra holds a seal");
        let signature = key.sign_hash(&hash).expect("signing succeeds");
        let start = header.extra.len() - EXTRA_SEAL;
        header.extra[start..].copy_from_slice(&signature);
        header
    }

    /// Sealed child of the head by validator `index`, not added to the chain.
    pub fn build_next(&self, index: usize) -> Header {
        Self::sign(self.child(self.address(index)), &self.keys[index])
    }

    /// Sealed child of the head by validator `index`, appended to the chain.
    pub fn seal_next(&mut self, index: usize) -> Header {
        let header = self.build_next(index);
        self.push(header.clone());
        header
    }

    /// Child of the head sealed by an arbitrary key, appended to the chain.
    pub fn seal_with(&mut self, key: &KeyPair) -> Header {
        let header = Self::sign(self.child(key.address()), key);
        self.push(header.clone());
        header
    }

    /// Append `header` to the chain and make it the head.
    pub fn push(&mut self, header: Header) {
        self.chain.insert(header.clone());
        self.head = header;
    }
}
