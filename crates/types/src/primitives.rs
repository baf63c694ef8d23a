//! Fixed-size primitives shared by every crate in the workspace.

pub use ethereum_types::{Bloom, BloomInput, H160, H256, H64, U256};

/// 20-byte account address.
pub type Address = ethereum_types::H160;

/// 32-byte Keccak-256 digest.
pub type Hash = ethereum_types::H256;

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Length of a hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// Keccak-256 of the RLP encoding of an empty list.
///
/// Every valid header carries this as its uncle hash since uncles are never
/// permitted.
pub const EMPTY_UNCLE_HASH: Hash = ethereum_types::H256([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4, 0x1a,
    0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4, 0x93, 0x47,
]);
