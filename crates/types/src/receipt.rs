//! Execution receipts and contract event logs.

use crate::{Address, Bloom, BloomInput, Hash};
use rlp::{Encodable, RlpStream};

/// Receipt status of a failed execution.
pub const RECEIPT_STATUS_FAILED: u64 = 0;

/// Receipt status of a successful execution.
pub const RECEIPT_STATUS_SUCCESSFUL: u64 = 1;

/// A contract event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,

    // Derived fields, filled in by the state once the log is attributed to a
    // transaction. Not part of the consensus encoding.
    pub block_number: u64,
    pub tx_hash: Hash,
    pub tx_index: usize,
    pub block_hash: Hash,
    pub index: usize,
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.address);
        s.begin_list(self.topics.len());
        for topic in &self.topics {
            s.append(topic);
        }
        s.append(&self.data);
    }
}

/// Result of executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Receipt {
    pub status: u64,
    pub cumulative_gas_used: u64,
    pub bloom: Bloom,
    pub logs: Vec<Log>,

    pub tx_hash: Hash,
    pub block_hash: Hash,
    pub block_number: u64,
    pub transaction_index: usize,
    pub gas_used: u64,
}

impl Receipt {
    /// Create a receipt with no logs.
    pub fn new(failed: bool, cumulative_gas_used: u64) -> Self {
        Self {
            status: if failed {
                RECEIPT_STATUS_FAILED
            } else {
                RECEIPT_STATUS_SUCCESSFUL
            },
            cumulative_gas_used,
            ..Default::default()
        }
    }

    /// Whether execution succeeded.
    pub fn succeeded(&self) -> bool {
        self.status == RECEIPT_STATUS_SUCCESSFUL
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.status);
        s.append(&self.cumulative_gas_used);
        s.append(&self.bloom);
        s.begin_list(self.logs.len());
        for log in &self.logs {
            s.append(log);
        }
    }
}

/// Bloom filter over the addresses and topics of `logs`.
pub fn logs_bloom(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_bytes()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_bytes()));
        }
    }
    bloom
}
