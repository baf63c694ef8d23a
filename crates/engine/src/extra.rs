//! `Header.extra` layout: `[32-byte vanity][N x 20-byte validators][65-byte seal]`.
//!
//! Validators are only present on epoch blocks (and on blocks where the
//! producer kicked a validator out of the active set).

use crate::{EXTRA_SEAL, EXTRA_VANITY};
use dpos_types::{Address, ADDRESS_LENGTH};

/// Validator addresses carried between the vanity and the seal. Malformed or
/// short extra data yields an empty list.
pub fn extra_validators(extra: &[u8]) -> Vec<Address> {
    if extra.len() <= EXTRA_VANITY + EXTRA_SEAL {
        return Vec::new();
    }
    let body = &extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL];
    if body.len() % ADDRESS_LENGTH != 0 {
        return Vec::new();
    }
    body.chunks_exact(ADDRESS_LENGTH)
        .map(Address::from_slice)
        .collect()
}

/// Length of the validator section, which must be a multiple of the address
/// length. `None` when the extra is too short to hold vanity and seal.
pub(crate) fn validators_section_len(extra: &[u8]) -> Option<usize> {
    extra.len().checked_sub(EXTRA_VANITY + EXTRA_SEAL)
}

/// Concatenated address bytes.
pub fn validators_bytes(validators: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(validators.len() * ADDRESS_LENGTH);
    for validator in validators {
        out.extend_from_slice(validator.as_bytes());
    }
    out
}

/// Assemble `vanity ‖ validators ‖ seal`. `vanity` is padded or truncated to
/// 32 bytes; a zero seal is written when `seal` is `None`.
pub fn build_extra(vanity: &[u8], validators: &[Address], seal: Option<&[u8; EXTRA_SEAL]>) -> Vec<u8> {
    let mut extra = vanity_prefix(vanity);
    extra.extend_from_slice(&validators_bytes(validators));
    match seal {
        Some(seal) => extra.extend_from_slice(seal),
        None => extra.extend_from_slice(&[0u8; EXTRA_SEAL]),
    }
    extra
}

/// First 32 bytes of `extra`, zero-padded.
pub(crate) fn vanity_prefix(extra: &[u8]) -> Vec<u8> {
    let mut vanity = extra[..extra.len().min(EXTRA_VANITY)].to_vec();
    vanity.resize(EXTRA_VANITY, 0);
    vanity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_validators_roundtrip() {
        let validators = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        let extra = build_extra(b"vanity", &validators, None);
        assert_eq!(extra.len(), EXTRA_VANITY + 40 + EXTRA_SEAL);
        assert_eq!(extra_validators(&extra), validators);
        assert_eq!(&extra[..6], b"vanity");
    }

    #[test]
    fn test_extra_validators_short_extra() {
        assert!(extra_validators(&[]).is_empty());
        assert!(extra_validators(&[0u8; EXTRA_VANITY + EXTRA_SEAL]).is_empty());
        assert_eq!(validators_section_len(&[0u8; 10]), None);
    }

    #[test]
    fn test_extra_validators_misaligned() {
        let extra = vec![0u8; EXTRA_VANITY + 21 + EXTRA_SEAL];
        assert!(extra_validators(&extra).is_empty());
        assert_eq!(validators_section_len(&extra), Some(21));
    }

    #[test]
    fn test_vanity_prefix_truncates() {
        let long = vec![7u8; 40];
        assert_eq!(vanity_prefix(&long), vec![7u8; EXTRA_VANITY]);
    }
}
