//! Address blacklist and event-check rules read from the AddressList system
//! contract.
//!
//! Both policies are cached per parent hash. Population is serialized by a
//! dedicated mutex per cache so that concurrent requests for the same parent
//! make a single round of contract calls. When the contract reports that the
//! policy was last updated more than one block ago, the entry cached for the
//! grandparent is reused instead of calling the contract.

use crate::signer::cache_size;
use crate::{Dpos, DposError};
use dpos_core::system::{
    ADDRESS_LIST_CONTRACT, BLACK_LAST_UPDATED_SLOT, DEV_MAPPING_POSITION, RULES_LAST_UPDATED_SLOT,
};
use dpos_core::{CallOpts, CheckType, EvmExtraValidator, StateDb};
use dpos_types::{keccak256_concat, Address, Hash, Header, Log, Transaction, U256};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, trace};

/// Which side of a transfer a blacklisted address is denied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    From,
    To,
    Both,
}

pub type Blacklist = HashMap<Address, Direction>;

/// Address checks applied to the indexed arguments of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCheckRule {
    pub event_sig: Hash,
    /// Topic index to check type.
    pub checks: BTreeMap<usize, CheckType>,
}

pub type EventCheckRules = HashMap<Hash, EventCheckRule>;

/// LRU of policies keyed by parent hash, with a single-flight populate path.
pub(crate) struct PolicyCache<V> {
    entries: Mutex<LruCache<Hash, Arc<V>>>,
    populate: Mutex<()>,
}

impl<V> PolicyCache<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(cache_size(capacity))),
            populate: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self, hash: &Hash) -> Option<Arc<V>> {
        self.entries.lock().get(hash).cloned()
    }

    /// Return the entry for `hash`, running `fill` at most once across
    /// concurrent callers. Nothing is cached when `fill` fails.
    pub(crate) fn get_or_populate(
        &self,
        hash: &Hash,
        fill: impl FnOnce() -> Result<Arc<V>, DposError>,
    ) -> Result<Arc<V>, DposError> {
        if let Some(value) = self.get(hash) {
            return Ok(value);
        }
        let _guard = self.populate.lock();
        if let Some(value) = self.get(hash) {
            return Ok(value);
        }
        let value = fill()?;
        self.entries.lock().put(*hash, Arc::clone(&value));
        Ok(value)
    }
}

/// Whether `fork` activated strictly before block `number`.
fn activated_before(fork: Option<u64>, number: u64) -> bool {
    fork.map_or(false, |f| f < number)
}

/// Block number stored in an AddressList bookkeeping slot.
fn last_updated(state: &dyn StateDb, slot: &Hash) -> u64 {
    let value = state.get_state(&ADDRESS_LIST_CONTRACT, slot);
    U256::from_big_endian(value.as_bytes()).low_u64()
}

/// Storage slot of `devs[addr]` in the AddressList contract.
fn dev_mapping_slot(address: &Address) -> Hash {
    let mut key = [0u8; 32];
    key[12..].copy_from_slice(address.as_bytes());
    let mut position = [0u8; 32];
    position[30..].copy_from_slice(&DEV_MAPPING_POSITION.to_be_bytes());
    keccak256_concat(&[key.as_slice(), position.as_slice()])
}

/// Whether the AddressList contract has developer verification switched on.
/// Slot 0 packs `[zero][admin][enabled][initialized]`.
fn dev_verification_enabled(state: &dyn StateDb) -> bool {
    let packed = state.get_state(&ADDRESS_LIST_CONTRACT, &Hash::zero());
    packed.as_bytes()[30] == 0x01
}

impl Dpos {
    /// Reject transactions whose sender or recipient is blacklisted.
    /// `parent_state` must be the state of the header's parent.
    pub fn validate_tx(
        &self,
        sender: &Address,
        tx: &Transaction,
        header: &Header,
        parent_state: &mut dyn StateDb,
    ) -> Result<(), DposError> {
        if !activated_before(self.chain.config().red_coast_block, header.number) {
            return Ok(());
        }
        let blacklist = self.get_blacklist(header, parent_state)?;
        if let Some(direction) = blacklist.get(sender) {
            if *direction != Direction::To {
                trace!(tx = ?tx.hash(), addr = ?sender, ?direction, "Hit blacklist");
                return Err(DposError::AddressDenied);
            }
        }
        if let Some(to) = tx.to() {
            if let Some(direction) = blacklist.get(&to) {
                if *direction != Direction::From {
                    trace!(tx = ?tx.hash(), addr = ?to, ?direction, "Hit blacklist");
                    return Err(DposError::AddressDenied);
                }
            }
        }
        Ok(())
    }

    /// Policy the executor applies to calls and events of the block built on
    /// `header`. `None` before the Sophon fork or when the policy cannot be
    /// loaded.
    pub fn create_evm_extra_validator(
        &self,
        header: &Header,
        parent_state: &mut dyn StateDb,
    ) -> Option<Box<dyn EvmExtraValidator>> {
        if !activated_before(self.chain.config().sophon_block, header.number) {
            return None;
        }
        let blacks = match self.get_blacklist(header, parent_state) {
            Ok(blacks) => blacks,
            Err(err) => {
                error!(%err, "Failed to load blacklist");
                return None;
            }
        };
        let rules = match self.get_event_check_rules(header, parent_state) {
            Ok(rules) => rules,
            Err(err) => {
                error!(%err, "Failed to load event check rules");
                return None;
            }
        };
        Some(Box::new(BlacklistValidator { blacks, rules }))
    }

    /// Whether `address` may deploy contracts at `height`.
    pub fn can_create(&self, state: &dyn StateDb, address: &Address, height: u64) -> bool {
        if self.chain.config().is_red_coast(height)
            && self.config.enable_dev_verification
            && dev_verification_enabled(state)
        {
            let value = state.get_state(&ADDRESS_LIST_CONTRACT, &dev_mapping_slot(address));
            return !value.is_zero();
        }
        true
    }

    pub(crate) fn get_blacklist(
        &self,
        header: &Header,
        parent_state: &mut dyn StateDb,
    ) -> Result<Arc<Blacklist>, DposError> {
        self.blacklists.get_or_populate(&header.parent_hash, || {
            if activated_before(self.chain.config().sophon_block, header.number) {
                let updated = last_updated(parent_state, &BLACK_LAST_UPDATED_SLOT);
                if let Some(cached) = self.reuse_grandparent(&self.blacklists, header, updated) {
                    return Ok(cached);
                }
            }

            let opts = CallOpts::view(header.coinbase);
            let froms = self
                .contracts
                .blacks_from(parent_state, header, opts)
                .map_err(|err| {
                    error!(%err, "getBlacksFrom failed");
                    err
                })?;
            let tos = self
                .contracts
                .blacks_to(parent_state, header, opts)
                .map_err(|err| {
                    error!(%err, "getBlacksTo failed");
                    err
                })?;

            let mut blacklist: Blacklist = froms.into_iter().map(|a| (a, Direction::From)).collect();
            for to in tos {
                blacklist
                    .entry(to)
                    .and_modify(|d| *d = Direction::Both)
                    .or_insert(Direction::To);
            }
            Ok(Arc::new(blacklist))
        })
    }

    pub(crate) fn get_event_check_rules(
        &self,
        header: &Header,
        parent_state: &mut dyn StateDb,
    ) -> Result<Arc<EventCheckRules>, DposError> {
        self.event_check_rules
            .get_or_populate(&header.parent_hash, || {
                let updated = last_updated(parent_state, &RULES_LAST_UPDATED_SLOT);
                if let Some(cached) =
                    self.reuse_grandparent(&self.event_check_rules, header, updated)
                {
                    return Ok(cached);
                }

                let opts = CallOpts::view(header.coinbase);
                let count = self
                    .contracts
                    .rules_len(parent_state, header, opts)
                    .map_err(|err| {
                        error!(%err, "rulesLen failed");
                        err
                    })?;
                let mut rules = EventCheckRules::new();
                for index in 0..count {
                    let entry = self
                        .contracts
                        .rule_by_index(parent_state, header, opts, index)
                        .map_err(|err| {
                            error!(index, number = header.number, %err, "getRuleByIndex failed");
                            err
                        })?;
                    rules
                        .entry(entry.event_sig)
                        .or_insert_with(|| EventCheckRule {
                            event_sig: entry.event_sig,
                            checks: BTreeMap::new(),
                        })
                        .checks
                        .insert(entry.arg_index, entry.check);
                }
                Ok(Arc::new(rules))
            })
    }

    /// The grandparent's cached policy, when the contract has not been
    /// updated since before the parent block.
    fn reuse_grandparent<V>(
        &self,
        cache: &PolicyCache<V>,
        header: &Header,
        last_updated: u64,
    ) -> Option<Arc<V>> {
        let number = header.number;
        if number < 2 || number <= last_updated.saturating_add(1) {
            return None;
        }
        match self.chain.get_header(&header.parent_hash, number - 1) {
            Some(parent) => {
                let cached = cache.get(&parent.parent_hash);
                if cached.is_some() {
                    trace!(number, "Reusing grandparent policy");
                }
                cached
            }
            None => {
                error!(
                    number,
                    parent_hash = ?header.parent_hash,
                    "Cannot get parent from chain"
                );
                None
            }
        }
    }
}

/// [`EvmExtraValidator`] backed by a blacklist and event-check rules.
pub struct BlacklistValidator {
    blacks: Arc<Blacklist>,
    rules: Arc<EventCheckRules>,
}

impl BlacklistValidator {
    pub fn new(blacks: Arc<Blacklist>, rules: Arc<EventCheckRules>) -> Self {
        Self { blacks, rules }
    }
}

impl EvmExtraValidator for BlacklistValidator {
    fn is_address_denied(&self, address: &Address, check: CheckType) -> bool {
        let Some(direction) = self.blacks.get(address) else {
            return false;
        };
        match check {
            CheckType::From => *direction != Direction::To,
            CheckType::To => *direction != Direction::From,
            CheckType::BothInAny => true,
            CheckType::None | CheckType::Unknown(_) => false,
        }
    }

    fn is_log_denied(&self, log: &Log) -> bool {
        if log.topics.len() <= 1 {
            return false;
        }
        let Some(rule) = self.rules.get(&log.topics[0]) else {
            return false;
        };
        rule.checks.iter().any(|(&idx, &check)| {
            idx < log.topics.len()
                && self.is_address_denied(&Address::from_slice(&log.topics[idx].as_bytes()[12..]), check)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryState;

    fn validator() -> BlacklistValidator {
        let mut blacks = Blacklist::new();
        blacks.insert(Address::repeat_byte(1), Direction::From);
        blacks.insert(Address::repeat_byte(2), Direction::To);
        blacks.insert(Address::repeat_byte(3), Direction::Both);

        let sig = Hash::repeat_byte(0xee);
        let mut checks = BTreeMap::new();
        checks.insert(1, CheckType::From);
        checks.insert(2, CheckType::To);
        let mut rules = EventCheckRules::new();
        rules.insert(sig, EventCheckRule { event_sig: sig, checks });

        BlacklistValidator::new(Arc::new(blacks), Arc::new(rules))
    }

    fn topic(address: Address) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(address.as_bytes());
        Hash::from(bytes)
    }

    #[test]
    fn test_address_denied_by_direction() {
        let v = validator();
        let from = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        let both = Address::repeat_byte(3);

        assert!(v.is_address_denied(&from, CheckType::From));
        assert!(!v.is_address_denied(&from, CheckType::To));
        assert!(v.is_address_denied(&to, CheckType::To));
        assert!(!v.is_address_denied(&to, CheckType::From));
        assert!(v.is_address_denied(&both, CheckType::From));
        assert!(v.is_address_denied(&both, CheckType::To));
        assert!(v.is_address_denied(&to, CheckType::BothInAny));
        assert!(!v.is_address_denied(&both, CheckType::None));
        assert!(!v.is_address_denied(&Address::repeat_byte(9), CheckType::BothInAny));
    }

    #[test]
    fn test_log_denied_by_rule() {
        let v = validator();
        let sig = Hash::repeat_byte(0xee);

        let single = Log {
            topics: vec![sig],
            ..Default::default()
        };
        assert!(!v.is_log_denied(&single));

        let clean = Log {
            topics: vec![sig, topic(Address::repeat_byte(2)), topic(Address::repeat_byte(1))],
            ..Default::default()
        };
        assert!(!v.is_log_denied(&clean));

        let denied = Log {
            topics: vec![sig, topic(Address::repeat_byte(1))],
            ..Default::default()
        };
        assert!(v.is_log_denied(&denied));

        let unknown_event = Log {
            topics: vec![Hash::repeat_byte(1), topic(Address::repeat_byte(3))],
            ..Default::default()
        };
        assert!(!v.is_log_denied(&unknown_event));
    }

    #[test]
    fn test_policy_cache_populates_once() {
        let cache: PolicyCache<u32> = PolicyCache::new(2);
        let hash = Hash::repeat_byte(1);
        let mut calls = 0;
        let first = cache
            .get_or_populate(&hash, || {
                calls += 1;
                Ok(Arc::new(7))
            })
            .unwrap();
        let second = cache
            .get_or_populate(&hash, || {
                calls += 1;
                Ok(Arc::new(8))
            })
            .unwrap();
        assert_eq!((*first, *second, calls), (7, 7, 1));
    }

    #[test]
    fn test_policy_cache_skips_failures() {
        let cache: PolicyCache<u32> = PolicyCache::new(2);
        let hash = Hash::repeat_byte(1);
        assert!(cache
            .get_or_populate(&hash, || Err(DposError::UnknownBlock))
            .is_err());
        assert!(cache.get(&hash).is_none());
    }

    #[test]
    fn test_dev_mapping_slot_layout() {
        let address = Address::repeat_byte(0xab);
        let mut key = [0u8; 32];
        key[12..].copy_from_slice(address.as_bytes());
        let position = Hash::from_low_u64_be(2);
        assert_eq!(
            dev_mapping_slot(&address),
            keccak256_concat(&[key.as_slice(), position.as_bytes()])
        );
    }

    #[test]
    fn test_last_updated_reads_slot() {
        let mut state = MemoryState::new();
        state.set_storage(
            ADDRESS_LIST_CONTRACT,
            BLACK_LAST_UPDATED_SLOT,
            Hash::from_low_u64_be(42),
        );
        assert_eq!(last_updated(&state, &BLACK_LAST_UPDATED_SLOT), 42);
        assert_eq!(last_updated(&state, &RULES_LAST_UPDATED_SLOT), 0);
    }
}
