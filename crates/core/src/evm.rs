//! Extra checks the executor applies inside the EVM.

use dpos_types::{Address, Log};

/// How an address found in a contract event is checked against the
/// blacklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckType {
    None,
    /// Deny addresses blacklisted as senders.
    From,
    /// Deny addresses blacklisted as recipients.
    To,
    /// Deny any blacklisted address.
    BothInAny,
    /// A value this node does not understand. Never denies.
    Unknown(u8),
}

impl From<u8> for CheckType {
    fn from(value: u8) -> Self {
        match value {
            0 => CheckType::None,
            1 => CheckType::From,
            2 => CheckType::To,
            3 => CheckType::BothInAny,
            other => CheckType::Unknown(other),
        }
    }
}

/// Denial policy consulted by the executor for every call and event.
pub trait EvmExtraValidator: Send + Sync {
    /// Whether `address` is denied under `check`.
    fn is_address_denied(&self, address: &Address, check: CheckType) -> bool;

    /// Whether a contract event is denied.
    fn is_log_denied(&self, log: &Log) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_type_from_u8() {
        assert_eq!(CheckType::from(0), CheckType::None);
        assert_eq!(CheckType::from(1), CheckType::From);
        assert_eq!(CheckType::from(2), CheckType::To);
        assert_eq!(CheckType::from(3), CheckType::BothInAny);
        assert_eq!(CheckType::from(9), CheckType::Unknown(9));
    }
}
