//! Boundary to the external money market and flash-bridge provider.
//!
//! Everything the engine knows about the outside world goes through these
//! traits. Calls are synchronous: a rebalancing cycle is one non-reentrant
//! unit of work, and every market call either completes or fails inside it.

pub mod sim;

use crate::core::flash::FlashPlan;
use crate::errors::StrategyError;
use crate::types::market::{MarketState, ReserveConfig, RewardRates};
use crate::types::position::Position;

pub use sim::SimulatedMarket;

/// Read/write access to the want reserve of the external lending market.
///
/// Amounts are native want units. `withdraw` and `repay` return the amount
/// actually moved — the market may fill less than requested when liquidity
/// is short, and callers degrade to the partial amount rather than failing.
pub trait LendingMarket {
    fn market_state(&self) -> Result<MarketState, StrategyError>;
    fn reserve_config(&self) -> Result<ReserveConfig, StrategyError>;
    /// Per-second reward emissions, valued in want by the adapter's oracle.
    fn reward_rates(&self) -> Result<RewardRates, StrategyError>;
    /// The strategy's own deposits and borrows.
    fn position(&self) -> Result<Position, StrategyError>;
    /// Idle want held by the strategy outside the market.
    fn want_balance(&self) -> Result<u128, StrategyError>;

    fn supply(&mut self, amount: u128) -> Result<(), StrategyError>;
    fn withdraw(&mut self, amount: u128) -> Result<u128, StrategyError>;
    fn borrow(&mut self, amount: u128) -> Result<(), StrategyError>;
    fn repay(&mut self, amount: u128) -> Result<u128, StrategyError>;

    /// Credit want arriving from outside the market — the output leg of a
    /// bridge swap inside a flash plan.
    fn credit_want(&mut self, amount: u128) -> Result<(), StrategyError>;
    /// Debit want leaving the strategy — the input leg of a bridge swap.
    fn debit_want(&mut self, amount: u128) -> Result<(), StrategyError>;
}

/// Flash-bridge provider executing a pre-computed plan atomically.
///
/// The plan is the explicit continuation of the flash callback: the lender
/// applies its ordered operations against the market and must end with the
/// principal plus fee repaid, or reject the plan wholly. A partially applied
/// plan must never be observable.
pub trait FlashLender {
    /// Fee charged on a flash borrow of `amount` bridge units.
    fn flash_fee(&self, amount: u128) -> u128;

    /// Execute the plan all-or-nothing. On `Err` the market state is exactly
    /// what it was before the call.
    fn execute(
        &self,
        plan: &FlashPlan,
        market: &mut dyn LendingMarket,
    ) -> Result<(), StrategyError>;
}
