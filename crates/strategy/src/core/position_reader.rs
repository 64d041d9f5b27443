//! Cycle-start state acquisition and collateral-target derivation.
//!
//! Everything a cycle decides on is read here, once, at the top of the
//! cycle. Targets are re-derived from the market's live bounds every time:
//! a listing change to LTV or liquidation threshold must take effect on the
//! very next cycle, never a stale cached value.

use tracing::debug;

use crate::constants::{COLLAT_MAX_MARGIN, COLLAT_TARGET_MARGIN};
use crate::errors::StrategyError;
use crate::market::LendingMarket;
use crate::types::market::{MarketState, ReserveConfig, RewardRates};
use crate::types::position::{CollateralTargets, Position};
use crate::types::ray::Ray;

/// Everything read at the start of a rebalancing cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleSnapshot {
    pub position: Position,
    pub idle_want: u128,
    pub market: MarketState,
    pub reserve: ReserveConfig,
    pub rewards: RewardRates,
}

pub struct PositionReader;

impl PositionReader {
    /// Read the full cycle snapshot from the market.
    pub fn snapshot(market: &dyn LendingMarket) -> Result<CycleSnapshot, StrategyError> {
        let snapshot = CycleSnapshot {
            position: market.position()?,
            idle_want: market.want_balance()?,
            market: market.market_state()?,
            reserve: market.reserve_config()?,
            rewards: market.reward_rates()?,
        };
        debug!(
            deposits = snapshot.position.deposits,
            borrows = snapshot.position.borrows,
            idle = snapshot.idle_want,
            liquidity = snapshot.market.available_liquidity,
            "cycle snapshot"
        );
        Ok(snapshot)
    }

    /// Derive collateral targets from the live market bounds.
    ///
    /// The max ratio sits a margin below the liquidation threshold, the
    /// target a larger margin below the LTV, and the borrow-halting ratio
    /// between the two. `bridge_ltv` is the flash-bridge asset's own LTV.
    pub fn derive_targets(reserve: &ReserveConfig, bridge_ltv: Ray) -> CollateralTargets {
        let targets = CollateralTargets {
            target_collat_ratio: (reserve.ltv - COLLAT_TARGET_MARGIN).max(Ray::ZERO),
            max_collat_ratio: (reserve.liquidation_threshold - COLLAT_MAX_MARGIN).max(Ray::ZERO),
            max_borrow_collat_ratio: (reserve.ltv - COLLAT_MAX_MARGIN).max(Ray::ZERO),
            bridge_collat_ratio: (bridge_ltv - COLLAT_MAX_MARGIN).max(Ray::ZERO),
        };
        debug!(
            target = %targets.target_collat_ratio,
            max = %targets.max_collat_ratio,
            max_borrow = %targets.max_borrow_collat_ratio,
            "derived collateral targets"
        );
        targets
    }
}
