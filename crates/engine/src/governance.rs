//! System governance: applying contract-approved proposals through synthetic
//! zero-gas-price transactions.
//!
//! The block producer wraps each passed proposal in a signed transaction
//! addressed to [`SYS_GOV_TO`] and executes it ([`Dpos::execute_proposal`]).
//! Every other node replays the transactions found in the block against the
//! proposals it reads from its own state ([`Dpos::replay_proposal`]), so the
//! action applied is always the one carried in the block bytes.

use crate::{Dpos, DposError};
use dpos_core::system::{SYS_GOV_CONTRACT, SYS_GOV_TO};
use dpos_core::{CallOpts, ExecutionError, Message, StateDb};
use dpos_types::{logs_bloom, Address, Hash, Header, Proposal, Receipt, Transaction, U256};
use tracing::{info, warn};

/// Proposal action: run an EVM call.
pub const ACTION_EVM_CALL: u64 = 0;

/// Proposal action: delete the code at the target.
pub const ACTION_ERASE_CODE: u64 = 1;

impl Dpos {
    /// All passed proposals, in contract order.
    pub(crate) fn passed_proposals(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
    ) -> Result<Vec<Proposal>, DposError> {
        let opts = CallOpts::view(header.coinbase);
        let count = self
            .contracts
            .passed_proposal_count(state, header, opts)?;
        let mut proposals = Vec::with_capacity(count as usize);
        for index in 0..count {
            proposals.push(
                self.contracts
                    .passed_proposal_by_index(state, header, opts, index)?,
            );
        }
        Ok(proposals)
    }

    /// Mark a proposal as applied. Runs outside any transaction.
    pub(crate) fn finish_proposal(
        &self,
        state: &mut dyn StateDb,
        header: &Header,
        id: U256,
    ) -> Result<(), DposError> {
        state.prepare(Hash::zero(), 0);
        self.contracts
            .finish_proposal_by_id(state, header, CallOpts::view(header.coinbase), id)?;
        Ok(())
    }

    /// Producer side: build, sign, and execute the governance transaction for
    /// `prop`.
    pub fn execute_proposal(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        prop: &Proposal,
        total_tx_index: usize,
    ) -> Result<(Transaction, Receipt), DposError> {
        let (validator, sign_tx_fn) = {
            let signer = self.signer.read();
            (signer.validator, signer.sign_tx_fn.clone())
        };
        let sign_tx_fn = sign_tx_fn.ok_or(DposError::SignTxFnNotSet)?;

        let nonce = state.get_nonce(&validator);
        let value = if self.chain.config().is_sophon(header.number) {
            U256::zero()
        } else {
            prop.value
        };
        let tx = Transaction::new(
            nonce,
            SYS_GOV_TO,
            value,
            header.gas_limit,
            U256::zero(),
            prop.rlp_bytes(),
        );
        let tx = sign_tx_fn(validator, tx, self.chain.config().chain_id)?;
        state.set_nonce(&validator, nonce + 1);

        let receipt =
            self.execute_proposal_msg(header, state, prop, total_tx_index, tx.hash(), Hash::zero());
        Ok((tx, receipt))
    }

    /// Follower side: check that `tx` carries exactly `prop` and was sent by
    /// the block's coinbase, then apply it.
    pub fn replay_proposal(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        prop: &Proposal,
        total_tx_index: usize,
        tx: &Transaction,
    ) -> Result<Receipt, DposError> {
        let sender = tx.sender(self.chain.config().chain_id)?;
        if sender != header.coinbase {
            return Err(DposError::InvalidGovernanceSender);
        }
        if prop.rlp_bytes() != tx.data {
            return Err(DposError::ProposalDataMismatch {
                id: prop.id,
                tx_hash: tx.hash(),
            });
        }
        let nonce = state.get_nonce(&sender);
        state.set_nonce(&sender, nonce + 1);

        Ok(self.execute_proposal_msg(
            header,
            state,
            prop,
            total_tx_index,
            tx.hash(),
            header.hash(),
        ))
    }

    /// Apply the action of `prop`. Never fails: an unsupported action or a
    /// failed call yields a failed receipt. Governance consumes no gas.
    fn execute_proposal_msg(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        prop: &Proposal,
        total_tx_index: usize,
        tx_hash: Hash,
        block_hash: Hash,
    ) -> Receipt {
        state.prepare(tx_hash, total_tx_index);
        let mut receipt = match action_of(prop) {
            Some(ACTION_EVM_CALL) => {
                let msg = Message::call(prop.from, prop.to, prop.data.clone())
                    .with_value(prop.value)
                    .with_gas(header.gas_limit);
                let result = self.executor.execute(&msg, state, header);
                let mut receipt = Receipt::new(result.is_err(), header.gas_used);
                receipt.logs = state.get_logs(&tx_hash, &block_hash);
                receipt.bloom = logs_bloom(&receipt.logs);
                info!(
                    id = %prop.id,
                    from = ?prop.from,
                    to = ?prop.to,
                    value = %prop.value,
                    data = %hex::encode(&prop.data),
                    ?tx_hash,
                    err = ?result.err(),
                    "Executed governance call"
                );
                receipt
            }
            Some(ACTION_ERASE_CODE) => {
                let erased = state.erase(&prop.to);
                info!(id = %prop.id, to = ?prop.to, ?tx_hash, success = erased, "Erased contract code");
                Receipt::new(!erased, header.gas_used)
            }
            _ => {
                warn!(
                    action = %prop.action,
                    id = %prop.id,
                    from = ?prop.from,
                    to = ?prop.to,
                    value = %prop.value,
                    data = %hex::encode(&prop.data),
                    ?tx_hash,
                    "Unsupported governance action"
                );
                Receipt::new(true, header.gas_used)
            }
        };
        receipt.tx_hash = tx_hash;
        receipt.block_hash = block_hash;
        receipt.block_number = header.number;
        receipt.transaction_index = state.tx_index();
        receipt
    }

    /// Producer side of finalization: execute and finish every passed
    /// proposal, appending the transactions and receipts.
    pub(crate) fn execute_governance(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
    ) -> Result<(), DposError> {
        for prop in self.passed_proposals(state, header)? {
            let (tx, receipt) = self.execute_proposal(header, state, &prop, txs.len())?;
            self.finish_proposal(state, header, prop.id)?;
            txs.push(tx);
            receipts.push(receipt);
        }
        Ok(())
    }

    /// Follower side of finalization: replay `system_txs` one to one against
    /// the passed proposals.
    pub(crate) fn replay_governance(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
        system_txs: &[Transaction],
    ) -> Result<(), DposError> {
        let proposals = self.passed_proposals(state, header)?;
        if proposals.len() != system_txs.len() {
            return Err(DposError::InvalidSysGovCount {
                expected: proposals.len(),
                got: system_txs.len(),
            });
        }
        for (prop, tx) in proposals.iter().zip(system_txs) {
            let receipt = self.replay_proposal(header, state, prop, txs.len(), tx)?;
            self.finish_proposal(state, header, prop.id)?;
            txs.push(tx.clone());
            receipts.push(receipt);
        }
        Ok(())
    }

    /// Whether `tx` sent by `sender` is a system transaction of `header`.
    pub fn is_sys_transaction(&self, sender: &Address, tx: &Transaction, header: &Header) -> bool {
        let Some(to) = tx.to() else {
            return false;
        };
        if *sender != header.coinbase {
            return false;
        }
        (to == SYS_GOV_TO && tx.gas_price.is_zero()) || to == SYS_GOV_CONTRACT
    }

    /// Re-apply a governance transaction for tracing. Returns the call's
    /// return data and the execution error, if any; the outer error is only
    /// for undecodable payloads.
    pub fn apply_sys_tx(
        &self,
        header: &Header,
        state: &mut dyn StateDb,
        tx_index: usize,
        sender: &Address,
        tx: &Transaction,
    ) -> Result<(Vec<u8>, Option<ExecutionError>), DposError> {
        let prop: Proposal = rlp::decode(&tx.data)?;
        let nonce = state.get_nonce(sender);
        state.set_nonce(sender, nonce + 1);

        match action_of(&prop) {
            Some(ACTION_EVM_CALL) => {
                let msg = Message::call(prop.from, prop.to, prop.data.clone())
                    .with_value(prop.value)
                    .with_gas(tx.gas);
                state.prepare(tx.hash(), tx_index);
                match self.executor.execute(&msg, state, header) {
                    Ok(ret) => Ok((ret, None)),
                    Err(err) => Ok((Vec::new(), Some(err))),
                }
            }
            Some(ACTION_ERASE_CODE) => {
                state.erase(&prop.to);
                Ok((Vec::new(), None))
            }
            _ => Ok((
                Vec::new(),
                Some(ExecutionError::Reverted("unsupported action".into())),
            )),
        }
    }
}

fn action_of(prop: &Proposal) -> Option<u64> {
    (prop.action <= U256::from(u64::MAX)).then(|| prop.action.low_u64())
}
