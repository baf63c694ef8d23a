//! System governance proposals.

use crate::{Address, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// A governance proposal approved by the governance contract.
///
/// The proposer wraps the RLP encoding of this value in a zero-gas-price
/// transaction; every other node decodes the same bytes and applies the same
/// action rather than re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Proposal {
    pub id: U256,
    /// `0` runs an EVM call, `1` deletes the code at `to`.
    pub action: U256,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

impl Encodable for Proposal {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.id);
        s.append(&self.action);
        s.append(&self.from);
        s.append(&self.to);
        s.append(&self.value);
        s.append(&self.data);
    }
}

impl Decodable for Proposal {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            id: rlp.val_at(0)?,
            action: rlp.val_at(1)?,
            from: rlp.val_at(2)?,
            to: rlp.val_at(3)?,
            value: rlp.val_at(4)?,
            data: rlp.val_at(5)?,
        })
    }
}

impl Proposal {
    /// Canonical encoding carried in the governance transaction payload.
    pub fn rlp_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }
}
