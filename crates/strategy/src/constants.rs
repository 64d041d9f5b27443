use alloy::primitives::{uint, I256};

use crate::types::ray::Ray;

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Seconds in a non-leap year, for annualising per-second reward emissions.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// ---------------------------------------------------------------------------
// Collateral safety margins (RAY fractions)
// ---------------------------------------------------------------------------

/// Margin subtracted from the market LTV to form the target collateral ratio.
pub const COLLAT_TARGET_MARGIN: Ray =
    Ray::from_raw(I256::from_raw(uint!(20_000_000_000_000_000_000_000_000_U256)));

/// Margin subtracted from the liquidation threshold (max ratio) and from the
/// LTV (borrow-halting ratio).
pub const COLLAT_MAX_MARGIN: Ray =
    Ray::from_raw(I256::from_raw(uint!(5_000_000_000_000_000_000_000_000_U256)));

// ---------------------------------------------------------------------------
// Optimizer tuning
// ---------------------------------------------------------------------------

/// Newton-Raphson iteration cap. Realistic market inputs converge in 3-6
/// steps; the cap only bounds pathological curvature.
pub const NEWTON_MAX_STEPS: usize = 10;

/// Relative step tolerance terminating the Newton iteration (1%).
/// Validated against the reference optimum vectors.
pub const NEWTON_REL_TOL: Ray =
    Ray::from_raw(I256::from_raw(uint!(10_000_000_000_000_000_000_000_000_U256)));

// ---------------------------------------------------------------------------
// Controller defaults
// ---------------------------------------------------------------------------

/// Default bound on supply/borrow (or repay/withdraw) rounds per cycle.
pub const DEFAULT_MAX_ITERATIONS: u8 = 6;

/// Default convergence tolerance on the collateral ratio (0.005).
pub const DEFAULT_MIN_RATIO: Ray = COLLAT_MAX_MARGIN;

/// Default dust threshold in native want units; amounts below this are not
/// worth a market call.
pub const DEFAULT_MIN_WANT: u128 = 100;

/// Default discount applied to reward valuations to price in selling
/// slippage (0.9 = rewards valued at 90%).
pub const DEFAULT_REWARD_DISCOUNT: Ray =
    Ray::from_raw(I256::from_raw(uint!(900_000_000_000_000_000_000_000_000_U256)));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_values() {
        assert_eq!(COLLAT_TARGET_MARGIN.to_string(), "0.02");
        assert_eq!(COLLAT_MAX_MARGIN.to_string(), "0.005");
        assert_eq!(NEWTON_REL_TOL.to_string(), "0.01");
        assert_eq!(DEFAULT_REWARD_DISCOUNT.to_string(), "0.9");
    }
}
