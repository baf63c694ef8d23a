//! Addresses and storage layout of the system contracts.

use dpos_types::{Address, Hash, H160, H256, U256};

const fn system_address(suffix: u32) -> Address {
    let mut bytes = [0u8; 20];
    bytes[17] = (suffix >> 16) as u8;
    bytes[18] = (suffix >> 8) as u8;
    bytes[19] = suffix as u8;
    H160(bytes)
}

const fn slot(position: u8) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[31] = position;
    H256(bytes)
}

pub const VALIDATORS_CONTRACT: Address = system_address(0xfff001);
pub const PROPOSALS_CONTRACT: Address = system_address(0xfff002);
pub const NODE_VOTES_CONTRACT: Address = system_address(0xfff003);
pub const SYSTEM_REWARDS_CONTRACT: Address = system_address(0xfff004);
pub const ADDRESS_LIST_CONTRACT: Address = system_address(0xfff005);
pub const SYS_GOV_CONTRACT: Address = system_address(0xfff006);

/// Recipient of governance transactions. Not a contract.
pub const SYS_GOV_TO: Address = system_address(0xffff);

/// AddressList slot holding the block number of the last blacklist update.
pub const BLACK_LAST_UPDATED_SLOT: Hash = slot(0x07);

/// AddressList slot holding the block number of the last event-rule update.
pub const RULES_LAST_UPDATED_SLOT: Hash = slot(0x08);

/// Storage position of the AddressList `devs` mapping.
pub const DEV_MAPPING_POSITION: u16 = 2;

/// Initial commission rate of the bootstrap validator.
pub const INIT_RATE: u8 = 100;

/// Deposit staked for the bootstrap validator: 1000 tokens of 18 decimals.
pub fn init_deposit() -> U256 {
    U256::exp10(21)
}
