//! Deterministic fixtures for tests and simulations.

use crate::{Address, KeyPair};

/// `count` deterministic key pairs ordered by ascending address, so index `i`
/// is also the validator's turn index in a snapshot built from them.
pub fn sorted_keys(count: usize) -> Vec<KeyPair> {
    let mut keys: Vec<KeyPair> = (0..count as u64).map(|i| KeyPair::from_seed(i + 1)).collect();
    keys.sort_by_key(|k| k.address());
    keys
}

/// Addresses of `keys`, in order.
pub fn addresses(keys: &[KeyPair]) -> Vec<Address> {
    keys.iter().map(KeyPair::address).collect()
}
