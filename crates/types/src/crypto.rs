//! Keccak hashing and secp256k1 recoverable signatures.

use crate::{Address, Hash};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

/// Length of a recoverable signature: `r ‖ s ‖ v`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Errors from signing or signer recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signature is not exactly 65 bytes.
    #[error("Invalid signature length: expected {expected}, got {got}")]
    InvalidSignatureLength { expected: usize, got: usize },

    /// Recovery byte is outside the accepted range.
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u64),

    /// Signature bytes do not describe a valid curve signature.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Secret key bytes are not a valid scalar.
    #[error("Invalid secret key")]
    InvalidSecretKey,
}

/// Keccak-256 of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> Hash {
    Hash::from_slice(&Keccak256::digest(data.as_ref()))
}

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::from_slice(&hasher.finalize())
}

/// Derive the account address of an uncompressed public key.
pub fn public_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag.
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest.as_bytes()[12..])
}

/// Recover the address that produced `signature` over `message_hash`.
pub fn recover_address(message_hash: &Hash, signature: &[u8]) -> Result<Address, CryptoError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignatureLength {
            expected: SIGNATURE_LENGTH,
            got: signature.len(),
        });
    }
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let v = signature[64];
    let recovery_id = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidRecoveryId(v as u64))?;
    let key = VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &sig, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(public_to_address(&key))
}

/// A secp256k1 signing key together with its derived address.
#[derive(Clone)]
pub struct KeyPair {
    secret: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Build a key pair from 32 secret bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(secret))
    }

    /// Deterministic key pair derived from a seed. Intended for tests and
    /// simulations where every run must produce the same validator set.
    pub fn from_seed(seed: u64) -> Self {
        let mut material = keccak256(seed.to_be_bytes());
        loop {
            if let Ok(pair) = Self::from_secret_bytes(material.as_bytes()) {
                return pair;
            }
            material = keccak256(material.as_bytes());
        }
    }

    fn from_signing_key(secret: SigningKey) -> Self {
        let address = public_to_address(secret.verifying_key());
        Self { secret, address }
    }

    /// Address controlled by this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, returning `r ‖ s ‖ v` with `v` in `{0, 1}`.
    pub fn sign_hash(&self, hash: &Hash) -> Result<[u8; SIGNATURE_LENGTH], CryptoError> {
        let (sig, recovery_id) = self
            .secret
            .sign_prehash_recoverable(hash.as_bytes())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(out)
    }

    /// Hash `message` with Keccak-256 and sign the digest.
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH], CryptoError> {
        self.sign_hash(&keccak256(message))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
