//! Synthetic calls and the executor that runs them.

use crate::StateDb;
use dpos_types::{Address, Hash, Header, U256};
use thiserror::Error;

/// A call the engine asks the executor to run on behalf of `from`, outside of
/// any user transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas: u64,
    pub gas_price: U256,
    pub data: Vec<u8>,
    /// When set, the executor verifies and increments the sender nonce.
    pub check_nonce: bool,
}

impl Message {
    /// A zero-value, zero-gas-price call to `to` with an unlimited gas budget.
    pub fn call(from: Address, to: Address, data: Vec<u8>) -> Self {
        Self {
            from,
            to: Some(to),
            nonce: 0,
            value: U256::zero(),
            gas: u64::MAX,
            gas_price: U256::zero(),
            data,
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

    /// Require the executor to check `nonce` against the sender's account.
    pub fn with_checked_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self.check_nonce = true;
        self
    }
}

/// Errors raised while executing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Execution reverted or ran out of gas.
    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Nonce mismatch for {address:?}: expected {expected}, got {got}")]
    NonceMismatch {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("Insufficient balance for {0:?}")]
    InsufficientBalance(Address),

    /// No state is available for the requested root.
    #[error("State unavailable for root {0:?}")]
    StateUnavailable(Hash),
}

/// Runs synthetic calls against a state.
pub trait TransactionExecutor: Send + Sync {
    /// Execute `message` in the context of `header`, returning the call's
    /// return data.
    fn execute(
        &self,
        message: &Message,
        state: &mut dyn StateDb,
        header: &Header,
    ) -> Result<Vec<u8>, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_defaults() {
        let msg = Message::call(Address::zero(), Address::repeat_byte(1), vec![1]);
        assert_eq!(msg.gas, u64::MAX);
        assert!(msg.value.is_zero());
        assert!(!msg.check_nonce);
    }

    #[test]
    fn test_builder_pattern() {
        let msg = Message::call(Address::zero(), Address::repeat_byte(1), vec![])
            .with_value(U256::from(5))
            .with_gas(21_000)
            .with_checked_nonce(3);
        assert_eq!(msg.value, U256::from(5));
        assert_eq!(msg.gas, 21_000);
        assert_eq!(msg.nonce, 3);
        assert!(msg.check_nonce);
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::Reverted("out of gas".to_string());
        assert!(err.to_string().contains("Execution reverted"));

        let err = ExecutionError::StateUnavailable(Hash::zero());
        assert!(err.to_string().contains("State unavailable"));
    }
}
