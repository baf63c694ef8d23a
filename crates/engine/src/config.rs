//! Engine configuration.

use dpos_types::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default number of blocks after which the validator set is re-elected.
pub const DEFAULT_EPOCH_LENGTH: u64 = 20;

/// Default minimum number of seconds between blocks.
pub const DEFAULT_PERIOD: u64 = 3;

/// Errors loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Consensus engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DposConfig {
    /// Minimum number of seconds between consecutive blocks.
    pub period: u64,

    /// Epoch length in blocks. Zero selects [`DEFAULT_EPOCH_LENGTH`].
    pub epoch: u64,

    /// Restrict contract creation to registered developers.
    pub enable_dev_verification: bool,

    /// Receives 5% of every block reward.
    pub foundation: Address,

    /// Account that accumulates transaction fees until they are distributed.
    pub fee_recoder: Address,

    /// Validator registered with the initial deposit at bootstrap. Zero selects
    /// the first genesis validator.
    pub init_validator: Address,

    /// Initial admin of the address list contract.
    pub dev_admin: Address,
}

impl Default for DposConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            epoch: DEFAULT_EPOCH_LENGTH,
            enable_dev_verification: false,
            foundation: Address::zero(),
            fee_recoder: Address::zero(),
            init_validator: Address::zero(),
            dev_admin: Address::zero(),
        }
    }
}

impl DposConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str::<Self>(json)?.normalized())
    }

    /// Replace unusable values with defaults.
    pub fn normalized(mut self) -> Self {
        if self.epoch == 0 {
            self.epoch = DEFAULT_EPOCH_LENGTH;
        }
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period;
        self
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_dev_verification(mut self, enabled: bool) -> Self {
        self.enable_dev_verification = enabled;
        self
    }

    pub fn with_foundation(mut self, foundation: Address) -> Self {
        self.foundation = foundation;
        self
    }

    pub fn with_fee_recoder(mut self, fee_recoder: Address) -> Self {
        self.fee_recoder = fee_recoder;
        self
    }

    pub fn with_init_validator(mut self, validator: Address) -> Self {
        self.init_validator = validator;
        self
    }

    pub fn with_dev_admin(mut self, admin: Address) -> Self {
        self.dev_admin = admin;
        self
    }

    /// Block period as a duration.
    pub fn period_duration(&self) -> Duration {
        Duration::from_secs(self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DposConfig::default();
        assert_eq!(config.epoch, DEFAULT_EPOCH_LENGTH);
        assert_eq!(config.period, DEFAULT_PERIOD);
        assert!(!config.enable_dev_verification);
    }

    #[test]
    fn test_builder_pattern() {
        let config = DposConfig::default()
            .with_period(1)
            .with_epoch(200)
            .with_dev_verification(true)
            .with_foundation(Address::repeat_byte(0xf0));

        assert_eq!(config.period, 1);
        assert_eq!(config.epoch, 200);
        assert!(config.enable_dev_verification);
        assert_eq!(config.foundation, Address::repeat_byte(0xf0));
        assert_eq!(config.period_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_epoch_is_normalized() {
        let config = DposConfig::default().with_epoch(0).normalized();
        assert_eq!(config.epoch, DEFAULT_EPOCH_LENGTH);
    }

    #[test]
    fn test_from_json() {
        let config = DposConfig::from_json(
            r#"{"period": 5, "epoch": 0, "feeRecoder": "0x00000000000000000000000000000000000000fe"}"#,
        )
        .unwrap();
        assert_eq!(config.period, 5);
        assert_eq!(config.epoch, DEFAULT_EPOCH_LENGTH);
        assert_eq!(config.fee_recoder, Address::from_low_u64_be(0xfe));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = DposConfig::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid config JSON"));
    }
}
