//! Assembled blocks.

use crate::{keccak256, Bloom, Hash, Header, Receipt, Transaction, EMPTY_UNCLE_HASH};
use rlp::RlpStream;

/// A header with its transaction list. Uncles are kept only so that blocks
/// received from peers can be rejected; assembled blocks never have any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<Header>,
}

impl Block {
    /// Assemble a block, deriving the transaction and receipt commitments and
    /// the aggregated bloom from the body.
    pub fn new(mut header: Header, transactions: Vec<Transaction>, receipts: &[Receipt]) -> Self {
        header.tx_hash = ordered_list_hash(transactions.iter().map(|tx| tx.rlp_bytes()));
        header.receipt_hash = ordered_list_hash(receipts.iter().map(|r| rlp::encode(r).to_vec()));
        let mut bloom = Bloom::zero();
        for receipt in receipts {
            bloom.accrue_bloom(&receipt.bloom);
        }
        header.bloom = bloom;
        header.uncle_hash = EMPTY_UNCLE_HASH;
        Self {
            header,
            transactions,
            uncles: Vec::new(),
        }
    }

    /// Same body with `header` replacing the current header.
    pub fn with_seal(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}

/// Commitment over an ordered list of encoded items: Keccak-256 of the RLP
/// list of the items' encodings. An empty list commits to
/// [`EMPTY_UNCLE_HASH`].
pub fn ordered_list_hash(items: impl Iterator<Item = Vec<u8>>) -> Hash {
    let items: Vec<Vec<u8>> = items.collect();
    let mut s = RlpStream::new_list(items.len());
    for item in &items {
        s.append_raw(item, 1);
    }
    keccak256(s.out())
}
