//! Gas limit and base fee rules across the London fork.

use crate::DposError;
use dpos_core::ChainConfig;
use dpos_types::{Header, U256};

/// Maximum gas limit change per block is `parent / GAS_LIMIT_BOUND_DIVISOR`.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Minimum gas limit of any block.
pub const MIN_GAS_LIMIT: u64 = 5000;

/// Base fee of the first London block.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Bounds the base fee change between blocks.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Bounds the gas limit a London block may have relative to the target.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Check that the gas limit stays within bounds of the parent's.
pub fn verify_gas_limit(parent_gas_limit: u64, gas_limit: u64) -> Result<(), DposError> {
    let diff = parent_gas_limit.abs_diff(gas_limit);
    let limit = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if diff >= limit {
        return Err(DposError::InvalidGasLimit {
            have: gas_limit,
            max: if gas_limit > parent_gas_limit {
                parent_gas_limit + limit.saturating_sub(1)
            } else {
                parent_gas_limit - limit.saturating_sub(1)
            },
        });
    }
    if gas_limit < MIN_GAS_LIMIT {
        return Err(DposError::InvalidGasLimit {
            have: gas_limit,
            max: MIN_GAS_LIMIT,
        });
    }
    Ok(())
}

/// Check the London-era fields of `header`: gas limit relative to the
/// (elasticity-adjusted) parent and the exact base fee.
pub fn verify_eip1559_header(
    config: &ChainConfig,
    parent: &Header,
    header: &Header,
) -> Result<(), DposError> {
    let parent_gas_limit = if config.is_london(parent.number) {
        parent.gas_limit
    } else {
        parent.gas_limit.saturating_mul(ELASTICITY_MULTIPLIER)
    };
    verify_gas_limit(parent_gas_limit, header.gas_limit)?;

    let Some(base_fee) = header.base_fee else {
        return Err(DposError::InvalidBaseFee("header is missing baseFee".into()));
    };
    let expected = calc_base_fee(config, parent);
    if base_fee != expected {
        return Err(DposError::InvalidBaseFee(format!(
            "have {base_fee}, want {expected}, parentBaseFee {:?}, parentGasUsed {}",
            parent.base_fee, parent.gas_used
        )));
    }
    Ok(())
}

/// Base fee of the child of `parent`.
pub fn calc_base_fee(config: &ChainConfig, parent: &Header) -> U256 {
    if !config.is_london(parent.number) {
        return U256::from(INITIAL_BASE_FEE);
    }
    let parent_base_fee = parent.base_fee.unwrap_or_default();
    let target = parent.gas_limit / ELASTICITY_MULTIPLIER;
    if target == 0 || parent.gas_used == target {
        return parent_base_fee;
    }

    let denominator = U256::from(target) * U256::from(BASE_FEE_CHANGE_DENOMINATOR);
    if parent.gas_used > target {
        let used_delta = U256::from(parent.gas_used - target);
        let delta = (parent_base_fee.saturating_mul(used_delta) / denominator).max(U256::one());
        parent_base_fee.saturating_add(delta)
    } else {
        let used_delta = U256::from(target - parent.gas_used);
        let delta = parent_base_fee.saturating_mul(used_delta) / denominator;
        parent_base_fee.saturating_sub(delta)
    }
}
