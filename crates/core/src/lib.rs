//! Collaborator boundaries for the DPoS consensus engine.
//!
//! The engine decides who may seal, validates what others sealed, and drives
//! the system contracts at epoch boundaries. Everything it needs from the rest
//! of the node is expressed here as a trait so it can be injected:
//!
//! - [`ChainHeaderReader`]: header lookups and the chain configuration
//! - [`StateDb`]: the mutable world state a block is finalized against
//! - [`TransactionExecutor`]: runs a synthetic [`Message`] against a state
//! - [`SystemContracts`]: one typed method per system-contract operation
//! - [`KeyValueStore`]: durable storage for snapshot checkpoints
//!
//! # Architecture
//!
//! ```text
//! import pipeline / miner
//!          │
//!          ▼
//!     Dpos engine ──► ChainHeaderReader, KeyValueStore
//!          │
//!          ├──► SystemContracts ──► (ABI + TransactionExecutor)
//!          └──► TransactionExecutor (governance calls)
//! ```
//!
//! All calls are synchronous and blocking from the caller's point of view.

mod chain;
mod contracts;
mod evm;
mod message;
mod state;
mod store;

pub mod system;

pub use chain::{ChainConfig, ChainHeaderReader};
pub use contracts::{
    CallOpts, ContractError, EpochInfo, EventRuleEntry, SystemContracts, ValidatorsInit,
};
pub use evm::{CheckType, EvmExtraValidator};
pub use message::{ExecutionError, Message, TransactionExecutor};
pub use state::{StateDb, StateFn};
pub use store::{KeyValueStore, MemoryDatabase, StorageError};
