//! Signed legacy transactions.

use crate::{keccak256, recover_address, Address, CryptoError, Hash, KeyPair, U256};
use rlp::RlpStream;

/// A legacy (pre-typed) transaction with an EIP-155 signature.
///
/// The engine only builds one kind of transaction itself: the zero-gas-price
/// governance transaction produced by the block proposer. Everything else is
/// treated as an opaque signed transaction whose sender can be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl Transaction {
    /// Build an unsigned call transaction.
    pub fn new(
        nonce: u64,
        to: Address,
        value: U256,
        gas: u64,
        gas_price: U256,
        data: Vec<u8>,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas,
            to: Some(to),
            value,
            data,
            ..Default::default()
        }
    }

    /// Recipient, or `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        self.to
    }

    /// Digest signed by the sender. With `Some(chain_id)` this is the EIP-155
    /// replay-protected payload.
    pub fn signing_hash(&self, chain_id: Option<u64>) -> Hash {
        let mut s = RlpStream::new_list(if chain_id.is_some() { 9 } else { 6 });
        self.append_unsigned(&mut s);
        if let Some(chain_id) = chain_id {
            s.append(&chain_id);
            s.append(&0u8);
            s.append(&0u8);
        }
        keccak256(s.out())
    }

    /// Sign with `key` for `chain_id`.
    pub fn sign(self, key: &KeyPair, chain_id: u64) -> Result<Self, CryptoError> {
        let sig = key.sign_hash(&self.signing_hash(Some(chain_id)))?;
        Ok(self.with_signature(&sig, chain_id))
    }

    /// Attach a 65-byte `r ‖ s ‖ recovery` signature.
    pub fn with_signature(mut self, sig: &[u8; 65], chain_id: u64) -> Self {
        self.r = U256::from_big_endian(&sig[..32]);
        self.s = U256::from_big_endian(&sig[32..64]);
        self.v = sig[64] as u64 + chain_id * 2 + 35;
        self
    }

    /// Keccak-256 of the signed encoding.
    pub fn hash(&self) -> Hash {
        keccak256(self.rlp_bytes())
    }

    /// RLP encoding including the signature.
    pub fn rlp_bytes(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(9);
        self.append_unsigned(&mut s);
        s.append(&self.v);
        s.append(&self.r);
        s.append(&self.s);
        s.out().to_vec()
    }

    /// Recover the sender. Accepts both EIP-155 signatures for `chain_id` and
    /// legacy `v ∈ {27, 28}` signatures.
    pub fn sender(&self, chain_id: u64) -> Result<Address, CryptoError> {
        let (recovery, digest) = if self.v == 27 || self.v == 28 {
            (self.v - 27, self.signing_hash(None))
        } else {
            let base = chain_id * 2 + 35;
            if self.v < base || self.v > base + 1 {
                return Err(CryptoError::InvalidRecoveryId(self.v));
            }
            (self.v - base, self.signing_hash(Some(chain_id)))
        };
        let mut sig = [0u8; 65];
        self.r.to_big_endian(&mut sig[..32]);
        self.s.to_big_endian(&mut sig[32..64]);
        sig[64] = recovery as u8;
        recover_address(&digest, &sig)
    }

    fn append_unsigned(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.data);
    }
}
