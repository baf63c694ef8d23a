//! Chain configuration and header access.

use dpos_types::{Hash, Header};
use serde::{Deserialize, Serialize};

/// Chain-wide parameters the engine consults. Fork heights are optional: an
/// unset fork is never active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Activates transaction blacklisting, developer verification and system
    /// governance.
    pub red_coast_block: Option<u64>,
    /// Activates the EVM extra validator and the zero-value governance fix.
    pub sophon_block: Option<u64>,
    /// Activates EIP-1559 base fees.
    pub london_block: Option<u64>,
}

impl ChainConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }

    pub fn with_red_coast_block(mut self, block: u64) -> Self {
        self.red_coast_block = Some(block);
        self
    }

    pub fn with_sophon_block(mut self, block: u64) -> Self {
        self.sophon_block = Some(block);
        self
    }

    pub fn with_london_block(mut self, block: u64) -> Self {
        self.london_block = Some(block);
        self
    }

    pub fn is_red_coast(&self, number: u64) -> bool {
        is_forked(self.red_coast_block, number)
    }

    pub fn is_sophon(&self, number: u64) -> bool {
        is_forked(self.sophon_block, number)
    }

    pub fn is_london(&self, number: u64) -> bool {
        is_forked(self.london_block, number)
    }
}

fn is_forked(fork: Option<u64>, number: u64) -> bool {
    fork.map_or(false, |f| f <= number)
}

/// Read access to the local header chain.
pub trait ChainHeaderReader: Send + Sync {
    fn config(&self) -> &ChainConfig;

    /// Head of the canonical chain.
    fn current_header(&self) -> Option<Header>;

    /// Header by hash and number.
    fn get_header(&self, hash: &Hash, number: u64) -> Option<Header>;

    /// Canonical header at `number`.
    fn get_header_by_number(&self, number: u64) -> Option<Header>;

    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fork_is_inactive() {
        let config = ChainConfig::new(1);
        assert!(!config.is_red_coast(u64::MAX));
        assert!(!config.is_sophon(0));
    }

    #[test]
    fn test_fork_is_active_from_its_height() {
        let config = ChainConfig::new(1).with_london_block(10);
        assert!(!config.is_london(9));
        assert!(config.is_london(10));
        assert!(config.is_london(11));
    }

    #[test]
    fn test_config_from_json() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"chainId": 36, "redCoastBlock": 5}"#).unwrap();
        assert_eq!(config.chain_id, 36);
        assert_eq!(config.red_coast_block, Some(5));
        assert_eq!(config.sophon_block, None);
    }
}
