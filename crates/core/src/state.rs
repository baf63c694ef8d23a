//! World-state access.

use crate::ExecutionError;
use dpos_types::{Address, Hash, Log, U256};
use std::sync::Arc;

/// Mutable world state a block is executed and finalized against.
pub trait StateDb {
    fn get_balance(&self, address: &Address) -> U256;
    fn add_balance(&mut self, address: &Address, amount: U256);
    fn set_balance(&mut self, address: &Address, amount: U256);

    fn get_nonce(&self, address: &Address) -> u64;
    fn set_nonce(&mut self, address: &Address, nonce: u64);

    /// Raw storage slot of a contract.
    fn get_state(&self, address: &Address, slot: &Hash) -> Hash;

    /// Delete the account's code and storage. Returns whether anything was
    /// removed.
    fn erase(&mut self, address: &Address) -> bool;

    /// Attribute subsequent logs to `tx_hash` at position `tx_index`.
    fn prepare(&mut self, tx_hash: Hash, tx_index: usize);
    fn tx_index(&self) -> usize;

    /// Record a log for the transaction set by the last [`StateDb::prepare`].
    fn add_log(&mut self, log: Log);

    /// Logs recorded for `tx_hash`, stamped with `block_hash`.
    fn get_logs(&self, tx_hash: &Hash, block_hash: &Hash) -> Vec<Log>;

    /// State root after applying all changes so far.
    fn intermediate_root(&mut self, delete_empty_objects: bool) -> Hash;
}

/// Opens the state at a given state root.
pub type StateFn =
    Arc<dyn Fn(&Hash) -> Result<Box<dyn StateDb + Send>, ExecutionError> + Send + Sync>;
