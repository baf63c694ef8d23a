//! Chain types for the DPoS consensus engine.
//!
//! This crate provides the foundational types the engine reasons about:
//!
//! - **Primitives**: `Address`, `Hash`, `U256`, `Bloom` and the Keccak helpers
//! - **Crypto**: secp256k1 key pairs, recoverable signatures, signer recovery
//! - **Chain types**: `Header`, `Transaction`, `Receipt`, `Log`, `Block`
//! - **Governance**: the RLP-encoded `Proposal` payload
//!
//! # Design Philosophy
//!
//! This crate does not depend on any other workspace crates. Every encoding here
//! is consensus-critical: two nodes hashing the same header or proposal must
//! produce identical bytes, so all encodings are plain RLP with no optional
//! normalisation.

mod block;
mod crypto;
mod header;
mod primitives;
mod proposal;
mod receipt;
mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use block::{ordered_list_hash, Block};
pub use crypto::{
    keccak256, keccak256_concat, public_to_address, recover_address, CryptoError, KeyPair,
    SIGNATURE_LENGTH,
};
pub use header::Header;
pub use primitives::{
    Address, Bloom, BloomInput, Hash, H160, H256, H64, U256, ADDRESS_LENGTH, EMPTY_UNCLE_HASH, HASH_LENGTH,
};
pub use proposal::Proposal;
pub use receipt::{logs_bloom, Log, Receipt, RECEIPT_STATUS_FAILED, RECEIPT_STATUS_SUCCESSFUL};
pub use transaction::Transaction;
