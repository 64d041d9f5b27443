use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::EngineConfig;

/// Validate a merged config. Called after env overrides, so whatever the
/// process actually runs with is what gets checked.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let s = &config.strategy;

    if s.want_decimals > 27 {
        bail!("strategy.want_decimals {} exceeds the RAY scale", s.want_decimals);
    }
    if s.max_iterations == 0 {
        bail!("strategy.max_iterations must be at least 1");
    }
    if s.reward_discount <= Decimal::ZERO || s.reward_discount > Decimal::ONE {
        bail!(
            "strategy.reward_discount {} must be in (0, 1]",
            s.reward_discount
        );
    }
    if s.bridge_ltv <= Decimal::ZERO || s.bridge_ltv >= Decimal::ONE {
        bail!("strategy.bridge_ltv {} must be in (0, 1)", s.bridge_ltv);
    }
    if s.min_ratio <= Decimal::ZERO || s.min_ratio > dec!(0.1) {
        bail!("strategy.min_ratio {} must be in (0, 0.1]", s.min_ratio);
    }
    if let Some(target) = s.pinned_target_collat_ratio {
        if target < Decimal::ZERO || target >= Decimal::ONE {
            bail!("strategy.pinned_target_collat_ratio {target} must be in [0, 1)");
        }
    }
    if s.flash_fee_bps >= 10_000 {
        bail!("strategy.flash_fee_bps {} must be below 10000", s.flash_fee_bps);
    }
    if config.app.logging.log_dir.is_empty() {
        bail!("app.logging.log_dir must not be empty");
    }

    Ok(())
}
