//! Finalization: the ordered system-contract steps run on every block.
//!
//! Both entry points run the same steps in the same order:
//!
//! 1. **Bootstrap** (block 1): initialize the six system contracts
//! 2. **Punish** (out-of-turn blocks): punish the validator whose turn was
//!    skipped, if it has not signed recently
//! 3. **Governance** (after `red_coast_block`): apply passed proposals
//! 4. **Election** (epoch blocks): re-elect and read back the validator set
//! 5. **Reward**: split the block reward and collected fees
//!
//! Failures in steps 1, 2 and 4 are [`FatalError`]s. The producer writes the
//! elected set into `Header.extra`; followers require the header to already
//! carry exactly that set.

use crate::extra::{validators_bytes, validators_section_len, vanity_prefix};
use crate::{Dpos, DposError, FatalError, DIFF_IN_TURN, EXTRA_SEAL, EXTRA_VANITY, MAX_VALIDATORS};
use dpos_core::system::{
    init_deposit, INIT_RATE, NODE_VOTES_CONTRACT, PROPOSALS_CONTRACT,
    SYSTEM_REWARDS_CONTRACT, VALIDATORS_CONTRACT,
};
use dpos_core::{CallOpts, StateDb, ValidatorsInit};
use dpos_types::{Address, Block, Header, Receipt, Transaction, EMPTY_UNCLE_HASH, U256};
use tracing::{error, info};

/// Percentage of each block reward paid to the foundation.
pub const FOUNDATION_REWARD_PERCENT: u64 = 5;

fn transact_opts(state: &dyn StateDb, from: Address) -> CallOpts {
    CallOpts::transact(from, state.get_nonce(&from))
}

impl Dpos {
    /// Follower finalization of an imported block. `system_txs` are the
    /// governance transactions found in the block, in order.
    pub fn finalize(
        &self,
        header: &mut Header,
        state: &mut dyn StateDb,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
        system_txs: &[Transaction],
    ) -> Result<(), DposError> {
        if header.number == 1 {
            self.initialize_system_contracts(header, state)
                .map_err(FatalError::bootstrap)?;
        }
        if let Some(validators) = self.punish_step(header, state)? {
            info!(number = header.number, ?validators, "Validator kicked out");
        }

        if self.chain.config().is_red_coast(header.number) {
            self.replay_governance(header, state, txs, receipts, system_txs)?;
        }

        if header.number % self.config.epoch == 0 {
            let elected = self.elect_validators(header, state)?;
            let declared = validators_section_len(&header.extra)
                .map(|len| &header.extra[EXTRA_VANITY..EXTRA_VANITY + len])
                .ok_or(DposError::InvalidExtraValidators)?;
            if declared != validators_bytes(&elected).as_slice() {
                return Err(DposError::InvalidExtraValidators);
            }
        }

        self.distribute_block_reward(header, state)?;

        header.root = state.intermediate_root(true);
        header.uncle_hash = EMPTY_UNCLE_HASH;
        Ok(())
    }

    /// Producer finalization: run the finalization steps, write the
    /// validator section of `Header.extra`, and assemble the block.
    pub fn finalize_and_assemble(
        &self,
        mut header: Header,
        state: &mut dyn StateDb,
        mut txs: Vec<Transaction>,
        mut receipts: Vec<Receipt>,
    ) -> Result<(Block, Vec<Receipt>), DposError> {
        if header.number == 1 {
            self.initialize_system_contracts(&header, state)
                .map_err(FatalError::bootstrap)?;
        }
        let kicked = self.punish_step(&header, state)?;

        if self.chain.config().is_red_coast(header.number) {
            self.execute_governance(&header, state, &mut txs, &mut receipts)?;
        }

        let mut extra = vanity_prefix(&header.extra);
        if header.number % self.config.epoch == 0 {
            let elected = self.elect_validators(&header, state)?;
            extra.extend_from_slice(&validators_bytes(&elected));
        } else if let Some(validators) = kicked {
            info!(number = header.number, ?validators, "Validator kicked out");
            extra.extend_from_slice(&validators_bytes(&validators));
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        header.extra = extra;

        self.distribute_block_reward(&header, state)?;

        header.root = state.intermediate_root(true);
        header.uncle_hash = EMPTY_UNCLE_HASH;
        let block = Block::new(header, txs, &receipts);
        Ok((block, receipts))
    }

    /// Initialize the system contracts with the genesis validator set.
    fn initialize_system_contracts(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
    ) -> Result<(), DposError> {
        let coinbase = header.coinbase;
        if coinbase.is_zero() {
            return Ok(());
        }

        let genesis_validators = self.snapshot(0, header.parent_hash, &[])?.validators();
        if genesis_validators.is_empty() || genesis_validators.len() > MAX_VALIDATORS {
            return Err(DposError::InvalidValidatorsLength(genesis_validators.len()));
        }
        let init_validator = if self.config.init_validator.is_zero() {
            genesis_validators[0]
        } else {
            self.config.init_validator
        };

        let opts = transact_opts(state, coinbase);
        self.contracts
            .initialize_proposals(state, header, opts, VALIDATORS_CONTRACT)?;

        let opts = transact_opts(state, coinbase);
        self.contracts.initialize_system_rewards(
            state,
            header,
            opts,
            VALIDATORS_CONTRACT,
            NODE_VOTES_CONTRACT,
        )?;

        let init = ValidatorsInit {
            proposals: PROPOSALS_CONTRACT,
            system_rewards: SYSTEM_REWARDS_CONTRACT,
            node_votes: NODE_VOTES_CONTRACT,
            init_validator,
            genesis_validators,
            init_deposit: init_deposit(),
            init_rate: INIT_RATE,
        };
        let opts = transact_opts(state, coinbase).with_value(init_deposit());
        self.contracts
            .initialize_validators(state, header, opts, &init)?;

        let opts = transact_opts(state, coinbase);
        self.contracts.initialize_node_votes(
            state,
            header,
            opts,
            VALIDATORS_CONTRACT,
            SYSTEM_REWARDS_CONTRACT,
        )?;

        let opts = transact_opts(state, coinbase);
        self.contracts
            .initialize_address_list(state, header, opts, self.config.dev_admin)?;

        let opts = transact_opts(state, coinbase);
        self.contracts
            .initialize_address_list_v2(state, header, opts)?;

        info!(
            validators = init.genesis_validators.len(),
            init_validator = ?init.init_validator,
            "Initialized system contracts"
        );
        Ok(())
    }

    /// On out-of-turn blocks, punish the skipped validator. Returns the
    /// current validator set when the punishment kicked it out.
    fn punish_step(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
    ) -> Result<Option<Vec<Address>>, DposError> {
        if header.difficulty == U256::from(DIFF_IN_TURN) {
            return Ok(None);
        }
        let kickout = self
            .try_punish_validator(header, state)
            .map_err(FatalError::punish)?;
        if !kickout {
            return Ok(None);
        }
        let validators = self
            .contracts
            .get_cur_epoch_validators(state, header, CallOpts::view(header.coinbase))
            .map_err(FatalError::punish)?;
        Ok(Some(validators))
    }

    fn try_punish_validator(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
    ) -> Result<bool, DposError> {
        let snap = self.parent_snapshot(header, &[])?;
        let validators = snap.validators();
        if validators.is_empty() {
            return Ok(false);
        }
        let out_turn = validators[(header.number % validators.len() as u64) as usize];
        if snap.recents.values().any(|recent| *recent == out_turn) {
            return Ok(false);
        }

        let opts = transact_opts(state, header.coinbase);
        let kickout = self.contracts.punish(state, header, opts, out_turn)?;
        info!(number = header.number, validator = ?out_turn, kickout, "Punished validator");
        Ok(kickout)
    }

    /// Run the election and return the new validator set, sorted.
    fn elect_validators(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
    ) -> Result<Vec<Address>, DposError> {
        if !header.coinbase.is_zero() {
            let opts = transact_opts(state, header.coinbase);
            self.contracts
                .try_elect(state, header, opts)
                .map_err(FatalError::election)?;
        }
        let mut validators = self
            .contracts
            .get_cur_epoch_validators(state, header, CallOpts::view(header.coinbase))
            .map_err(FatalError::election)?;
        if validators.len() > MAX_VALIDATORS {
            return Err(DposError::InvalidValidatorsLength(validators.len()));
        }
        validators.sort();
        info!(number = header.number, ?validators, "Updated epoch validators");
        Ok(validators)
    }

    /// Pay the epoch block reward plus collected fees: a fixed share to the
    /// foundation, the rest to the SystemRewards pool.
    fn distribute_block_reward(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
    ) -> Result<(), DposError> {
        let coinbase = header.coinbase;
        if coinbase.is_zero() {
            return Ok(());
        }

        let epoch = header.number / self.config.epoch;
        let info = self
            .contracts
            .epoch_info(state, header, CallOpts::view(coinbase), epoch)
            .map_err(|err| {
                error!(epoch, %err, "Failed to read epoch info");
                err
            })?;

        let fees = state.get_balance(&self.config.fee_recoder);
        let total = info.block_reward.saturating_add(fees);
        let to_foundation = total.saturating_mul(U256::from(FOUNDATION_REWARD_PERCENT)) / 100;
        let to_miner = total - to_foundation;

        state.add_balance(&self.config.foundation, to_foundation);
        state.add_balance(&SYSTEM_REWARDS_CONTRACT, to_miner);
        state.set_balance(&self.config.fee_recoder, U256::zero());

        let opts = transact_opts(state, coinbase);
        self.contracts
            .distribute_block_reward(state, header, opts, to_miner)
            .map_err(|err| {
                error!(number = header.number, %err, "Failed to distribute block reward");
                err
            })?;
        info!(
            number = header.number,
            block_reward = %info.block_reward,
            %fees,
            %to_foundation,
            %to_miner,
            "Distributed block reward"
        );
        Ok(())
    }
}
