//! Seal hashing, signer recovery, and the local signing hooks.

use crate::{DposError, EXTRA_SEAL};
use dpos_types::{keccak256, recover_address, Address, CryptoError, Hash, Header, KeyPair, Transaction};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Errors raised by a signing hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("unknown account {0:?}")]
    UnknownAccount(Address),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Signs a seal pre-image on behalf of an account, returning a 65-byte
/// recoverable signature.
pub type SignerFn = Arc<dyn Fn(Address, &[u8]) -> Result<Vec<u8>, SignerError> + Send + Sync>;

/// Signs a transaction for `chain_id` on behalf of an account.
pub type SignTxFn =
    Arc<dyn Fn(Address, Transaction, u64) -> Result<Transaction, SignerError> + Send + Sync>;

/// RLP of the header with the trailing seal stripped from `extra`.
pub fn dpos_rlp(header: &Header) -> Result<Vec<u8>, DposError> {
    if header.extra.len() < EXTRA_SEAL {
        return Err(DposError::MissingSignature);
    }
    Ok(header.rlp_with_extra(&header.extra[..header.extra.len() - EXTRA_SEAL]))
}

/// Hash signed by the block producer.
pub fn seal_hash(header: &Header) -> Result<Hash, DposError> {
    Ok(keccak256(dpos_rlp(header)?))
}

/// Recover the address that sealed `header`.
pub fn ecrecover(header: &Header) -> Result<Address, DposError> {
    if header.extra.len() < EXTRA_SEAL {
        return Err(DposError::MissingSignature);
    }
    let signature = &header.extra[header.extra.len() - EXTRA_SEAL..];
    Ok(recover_address(&seal_hash(header)?, signature)?)
}

/// Recovered signers keyed by block hash.
pub struct SignatureCache {
    signers: Mutex<LruCache<Hash, Address>>,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            signers: Mutex::new(LruCache::new(cache_size(capacity))),
        }
    }

    /// Recover the sealer of `header`, consulting the cache first.
    pub fn recover(&self, header: &Header) -> Result<Address, DposError> {
        let hash = header.hash();
        if let Some(signer) = self.signers.lock().get(&hash) {
            trace!(number = header.number, "Signer cache hit");
            return Ok(*signer);
        }
        let signer = ecrecover(header)?;
        self.signers.lock().put(hash, signer);
        Ok(signer)
    }
}

pub(crate) fn cache_size(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

/// Seal signing hook backed by a local key. Requests for any other account
/// fail with [`SignerError::UnknownAccount`].
pub fn key_signer(key: KeyPair) -> SignerFn {
    Arc::new(move |account: Address, payload: &[u8]| {
        if account != key.address() {
            return Err(SignerError::UnknownAccount(account));
        }
        Ok(key.sign_message(payload)?.to_vec())
    })
}

/// Transaction signing hook backed by a local key.
pub fn key_tx_signer(key: KeyPair) -> SignTxFn {
    Arc::new(move |account, tx, chain_id| {
        if account != key.address() {
            return Err(SignerError::UnknownAccount(account));
        }
        Ok(tx.sign(&key, chain_id)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::build_extra;

    fn sealed_header(key: &KeyPair) -> Header {
        let mut header = Header {
            number: 7,
            coinbase: key.address(),
            extra: build_extra(b"", &[], None),
            ..Default::default()
        };
        let sig = key.sign_hash(&seal_hash(&header).unwrap()).unwrap();
        let len = header.extra.len();
        header.extra[len - EXTRA_SEAL..].copy_from_slice(&sig);
        header
    }

    #[test]
    fn test_seal_hash_excludes_seal() {
        let key = KeyPair::from_seed(1);
        let sealed = sealed_header(&key);
        let mut unsealed = sealed.clone();
        let len = unsealed.extra.len();
        unsealed.extra[len - EXTRA_SEAL..].fill(0);

        assert_eq!(seal_hash(&sealed).unwrap(), seal_hash(&unsealed).unwrap());
        assert_ne!(sealed.hash(), unsealed.hash());
    }

    #[test]
    fn test_seal_hash_requires_seal() {
        let header = Header {
            extra: vec![0u8; 10],
            ..Default::default()
        };
        assert!(matches!(seal_hash(&header), Err(DposError::MissingSignature)));
        assert!(matches!(ecrecover(&header), Err(DposError::MissingSignature)));
    }

    #[test]
    fn test_recover_signer_cached() {
        let key = KeyPair::from_seed(2);
        let header = sealed_header(&key);
        let cache = SignatureCache::new(4);

        assert_eq!(cache.recover(&header).unwrap(), key.address());
        assert_eq!(cache.recover(&header).unwrap(), key.address());
    }

    #[test]
    fn test_key_signer_rejects_other_account() {
        let key = KeyPair::from_seed(3);
        let sign = key_signer(key);
        let other = Address::repeat_byte(9);
        assert_eq!(
            sign(other, b"payload").unwrap_err(),
            SignerError::UnknownAccount(other)
        );
    }

    #[test]
    fn test_key_signer_signs_keccak_of_payload() {
        let key = KeyPair::from_seed(4);
        let address = key.address();
        let sign = key_signer(key);
        let header = Header {
            extra: build_extra(b"", &[], None),
            ..Default::default()
        };
        let payload = dpos_rlp(&header).unwrap();
        let sig = sign(address, &payload).unwrap();
        assert_eq!(
            recover_address(&seal_hash(&header).unwrap(), &sig).unwrap(),
            address
        );
    }
}
