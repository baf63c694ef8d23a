//! Typed access to the system contracts.
//!
//! Each method maps to exactly one contract operation. Implementations own the
//! ABI encoding and run the call through a [`crate::TransactionExecutor`]; the
//! engine only decides who sends the call, with which nonce and value.

use crate::{CheckType, ExecutionError, StateDb};
use dpos_types::{Address, Hash, Header, Proposal, U256};
use thiserror::Error;

/// Errors from a system contract call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The call itself failed.
    #[error("{method} failed: {source}")]
    Call {
        method: &'static str,
        #[source]
        source: ExecutionError,
    },

    /// The call returned data that does not decode to the expected type.
    #[error("{method} returned malformed output: {detail}")]
    InvalidOutput { method: &'static str, detail: String },
}

impl ContractError {
    pub fn call(method: &'static str, source: ExecutionError) -> Self {
        ContractError::Call { method, source }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ContractError::Call { method, .. } | ContractError::InvalidOutput { method, .. } => {
                method
            }
        }
    }
}

/// Sender-side parameters of a system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOpts {
    pub from: Address,
    pub nonce: u64,
    pub value: U256,
    pub gas: u64,
    /// State-changing calls check and bump the sender nonce.
    pub check_nonce: bool,
}

impl CallOpts {
    /// A state-changing call from `from` at its current `nonce`.
    pub fn transact(from: Address, nonce: u64) -> Self {
        Self {
            from,
            nonce,
            value: U256::zero(),
            gas: u64::MAX,
            check_nonce: true,
        }
    }

    /// A call that does not consume a nonce.
    pub fn view(from: Address) -> Self {
        Self {
            from,
            nonce: 0,
            value: U256::zero(),
            gas: u64::MAX,
            check_nonce: false,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }
}

/// Arguments of `Validators.initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsInit {
    pub proposals: Address,
    pub system_rewards: Address,
    pub node_votes: Address,
    /// Validator registered with the initial deposit.
    pub init_validator: Address,
    /// Full validator set of the genesis block.
    pub genesis_validators: Vec<Address>,
    pub init_deposit: U256,
    pub init_rate: u8,
}

/// Reward parameters of one epoch, as recorded by SystemRewards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochInfo {
    pub block_reward: U256,
    pub tvl: U256,
    pub validator_count: U256,
}

/// One row of the AddressList event-check rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRuleEntry {
    pub event_sig: Hash,
    pub arg_index: usize,
    pub check: CheckType,
}

/// One typed method per system-contract operation the engine performs.
pub trait SystemContracts: Send + Sync {
    // ═══════════════════════════════════════════════════════════════════════
    // Bootstrap (block 1)
    // ═══════════════════════════════════════════════════════════════════════

    fn initialize_proposals(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        validators_contract: Address,
    ) -> Result<(), ContractError>;

    fn initialize_system_rewards(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        validators_contract: Address,
        node_votes_contract: Address,
    ) -> Result<(), ContractError>;

    fn initialize_validators(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        init: &ValidatorsInit,
    ) -> Result<(), ContractError>;

    fn initialize_node_votes(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        validators_contract: Address,
        system_rewards_contract: Address,
    ) -> Result<(), ContractError>;

    fn initialize_address_list(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        admin: Address,
    ) -> Result<(), ContractError>;

    fn initialize_address_list_v2(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<(), ContractError>;

    // ═══════════════════════════════════════════════════════════════════════
    // Validators and rewards
    // ═══════════════════════════════════════════════════════════════════════

    /// Punish a validator that missed its slot. Returns whether it was kicked
    /// out of the active set.
    fn punish(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        validator: Address,
    ) -> Result<bool, ContractError>;

    fn try_elect(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<(), ContractError>;

    fn get_cur_epoch_validators(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError>;

    fn epoch_info(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        epoch: u64,
    ) -> Result<EpochInfo, ContractError>;

    fn distribute_block_reward(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        amount: U256,
    ) -> Result<(), ContractError>;

    // ═══════════════════════════════════════════════════════════════════════
    // Governance
    // ═══════════════════════════════════════════════════════════════════════

    fn passed_proposal_count(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<u32, ContractError>;

    fn passed_proposal_by_index(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        index: u32,
    ) -> Result<Proposal, ContractError>;

    fn finish_proposal_by_id(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        id: U256,
    ) -> Result<(), ContractError>;

    // ═══════════════════════════════════════════════════════════════════════
    // Address list
    // ═══════════════════════════════════════════════════════════════════════

    fn blacks_from(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError>;

    fn blacks_to(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<Vec<Address>, ContractError>;

    fn rules_len(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
    ) -> Result<u32, ContractError>;

    fn rule_by_index(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        opts: CallOpts,
        index: u32,
    ) -> Result<EventRuleEntry, ContractError>;
}
