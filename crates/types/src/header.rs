//! Block header and its RLP encodings.

use crate::{keccak256, Address, Bloom, Hash, H64, U256};
use rlp::RlpStream;

/// Block header.
///
/// `extra` is laid out by the consensus engine as
/// `[32-byte vanity][0 or N x 20-byte validators][65-byte seal]`; this type
/// treats it as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub parent_hash: Hash,
    pub uncle_hash: Hash,
    pub coinbase: Address,
    pub root: Hash,
    pub tx_hash: Hash,
    pub receipt_hash: Hash,
    pub bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u64,
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: H64,
    /// Present from the London fork onwards.
    pub base_fee: Option<U256>,
}

impl Header {
    /// Keccak-256 of the full RLP encoding.
    pub fn hash(&self) -> Hash {
        keccak256(self.rlp_bytes())
    }

    /// Full RLP encoding of the header.
    pub fn rlp_bytes(&self) -> Vec<u8> {
        self.rlp_with_extra(&self.extra)
    }

    /// RLP encoding of the header with `extra` substituted for the extra-data
    /// field. Every other field is encoded exactly as in [`Header::rlp_bytes`].
    pub fn rlp_with_extra(&self, extra: &[u8]) -> Vec<u8> {
        let fields = if self.base_fee.is_some() { 16 } else { 15 };
        let mut s = RlpStream::new_list(fields);
        s.append(&self.parent_hash);
        s.append(&self.uncle_hash);
        s.append(&self.coinbase);
        s.append(&self.root);
        s.append(&self.tx_hash);
        s.append(&self.receipt_hash);
        s.append(&self.bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        s.append(&extra.to_vec());
        s.append(&self.mix_digest);
        s.append(&self.nonce);
        if let Some(base_fee) = &self.base_fee {
            s.append(base_fee);
        }
        s.out().to_vec()
    }
}
