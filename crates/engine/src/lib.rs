//! Delegated proof-of-stake consensus engine.
//!
//! A fixed-size set of validators, elected by the system contracts at every
//! epoch boundary, take turns sealing blocks. The engine:
//!
//! - resolves the validator [`Snapshot`] at any block by replaying headers
//!   from the nearest checkpoint
//! - verifies headers, seals and cascading fields of imported blocks
//! - prepares and seals local blocks when authorized
//! - finalizes blocks: system-contract bootstrap, punishment of absent
//!   validators, governance proposals, elections and reward distribution
//! - screens transactions and logs against the on-chain address blacklist
//!
//! # Turn order
//!
//! Validators are sorted by address. The validator at index `number % len`
//! is in turn for block `number` and seals with difficulty [`DIFF_IN_TURN`];
//! anyone else in the set may seal with [`DIFF_NO_TURN`] after a random
//! wiggle delay. A validator may seal at most once in any window of
//! `len / 2 + 1` consecutive blocks.
//!
//! # Header extra layout
//!
//! ```text
//! | vanity (32) | validators (20 * n, epoch blocks only) | seal (65) |
//! ```
//!
//! All entry points are synchronous. [`Dpos::verify_headers`] and
//! [`Dpos::seal`] hand work to a background thread and report back over
//! `crossbeam-channel`.

mod api;
mod blacklist;
mod config;
mod engine;
mod error;
mod extra;
mod finalize;
mod fork;
mod governance;
mod produce;
mod signer;
mod snapshot;
mod verify;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::time::Duration;

pub use api::{ApiDescriptor, DposApi, Status, STATUS_WINDOW};
pub use blacklist::{Blacklist, BlacklistValidator, Direction, EventCheckRule, EventCheckRules};
pub use config::{ConfigError, DposConfig, DEFAULT_EPOCH_LENGTH, DEFAULT_PERIOD};
pub use engine::Dpos;
pub use error::{DposError, FatalError};
pub use finalize::FOUNDATION_REWARD_PERCENT;
pub use extra::{build_extra, extra_validators, validators_bytes};
pub use fork::{
    calc_base_fee, verify_eip1559_header, verify_gas_limit, BASE_FEE_CHANGE_DENOMINATOR,
    ELASTICITY_MULTIPLIER, GAS_LIMIT_BOUND_DIVISOR, INITIAL_BASE_FEE, MIN_GAS_LIMIT,
};
pub use governance::{ACTION_ERASE_CODE, ACTION_EVM_CALL};
pub use signer::{
    dpos_rlp, ecrecover, key_signer, key_tx_signer, seal_hash, SignTxFn, SignatureCache,
    SignerError, SignerFn,
};
pub use snapshot::Snapshot;
pub use verify::AbortHandle;

/// Blocks between snapshot checkpoints persisted to the database.
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Recent snapshots kept in memory.
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Recent block signers kept in memory.
pub const INMEMORY_SIGNATURES: usize = 4096;

/// Blacklist and event-rule sets kept in memory, keyed by block.
pub const INMEMORY_BLACKLIST: usize = 21;

/// Upper bound of the random delay added by out-of-turn sealers.
pub const WIGGLE_TIME: Duration = Duration::from_millis(500);

pub const MAX_VALIDATORS: usize = 99;

/// Fixed vanity prefix of the header extra.
pub const EXTRA_VANITY: usize = 32;

/// Fixed seal suffix of the header extra.
pub const EXTRA_SEAL: usize = 65;

pub const DIFF_IN_TURN: u64 = 2;
pub const DIFF_NO_TURN: u64 = 1;

/// Largest gas limit a header may declare (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Depth past which a block is treated as immutable, so the snapshot at
/// that depth may be trusted as a checkpoint.
pub const FULL_IMMUTABILITY_THRESHOLD: usize = 90_000;
