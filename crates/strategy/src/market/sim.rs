//! In-memory money market with the same kinked-curve behaviour as the live
//! venue. Used by the test suite and for off-chain what-if simulation; the
//! engine drives it through the same [`LendingMarket`] trait as a real
//! adapter, so controller behaviour is identical on both.

use rust_decimal_macros::dec;
use tracing::debug;

use crate::core::flash::{FlashPlan, PlannedOp};
use crate::core::rate_model::{PoolAmounts, RateCurve};
use crate::errors::StrategyError;
use crate::types::market::{MarketState, ReserveConfig, RewardRates};
use crate::types::position::Position;
use crate::types::ray::Ray;

use super::{FlashLender, LendingMarket};

/// Simulated reserve plus the strategy's own wallet.
///
/// Pool totals move with every operation, so borrow rates shift under the
/// strategy's feet exactly as they do on the live market. Liquidity is
/// finite: withdrawals fill partially when the pool runs dry.
#[derive(Debug, Clone)]
pub struct SimulatedMarket {
    reserve: ReserveConfig,
    rewards: RewardRates,
    stable_debt: u128,
    variable_debt: u128,
    available_liquidity: u128,
    position: Position,
    want_balance: u128,
    /// Strategy position after every executed operation, for invariant
    /// checks in tests.
    op_log: Vec<Position>,
}

impl SimulatedMarket {
    pub fn new(
        reserve: ReserveConfig,
        stable_debt: u128,
        variable_debt: u128,
        available_liquidity: u128,
    ) -> Self {
        Self {
            reserve,
            rewards: RewardRates::default(),
            stable_debt,
            variable_debt,
            available_liquidity,
            position: Position::default(),
            want_balance: 0,
            op_log: Vec::new(),
        }
    }

    /// A deep, mostly-idle reserve: enough liquidity that only tests which
    /// drain it on purpose ever see a shortfall.
    pub fn with_defaults(available_liquidity: u128) -> Self {
        Self::new(
            ReserveConfig {
                ltv: Ray::from_decimal(dec!(0.8)),
                liquidation_threshold: Ray::from_decimal(dec!(0.85)),
                reserve_factor: Ray::from_decimal(dec!(0.1)),
                base_rate: Ray::ZERO,
                slope1: Ray::from_decimal(dec!(0.04)),
                slope2: Ray::from_decimal(dec!(0.6)),
                u_optimal: Ray::from_decimal(dec!(0.9)),
            },
            10_000_000,
            500_000_000,
            available_liquidity,
        )
    }

    pub fn set_want_balance(&mut self, amount: u128) {
        self.want_balance = amount;
    }

    pub fn set_available_liquidity(&mut self, amount: u128) {
        self.available_liquidity = amount;
    }

    pub fn set_reward_rates(&mut self, rewards: RewardRates) {
        self.rewards = rewards;
    }

    pub fn set_reserve_config(&mut self, reserve: ReserveConfig) {
        self.reserve = reserve;
    }

    pub fn op_log(&self) -> &[Position] {
        &self.op_log
    }

    fn total_deposits(&self) -> u128 {
        self.stable_debt + self.variable_debt + self.available_liquidity
    }

    fn log_op(&mut self) {
        self.op_log.push(self.position);
    }
}

impl LendingMarket for SimulatedMarket {
    fn market_state(&self) -> Result<MarketState, StrategyError> {
        let curve = RateCurve::from(&self.reserve);
        let pool = PoolAmounts {
            total_deposits: Ray::from_units(self.total_deposits(), 0),
            stable_debt: Ray::from_units(self.stable_debt, 0),
            variable_debt: Ray::from_units(self.variable_debt, 0),
        };
        let utilization = pool.utilization(Ray::ZERO);
        Ok(MarketState {
            total_deposits: self.total_deposits(),
            total_stable_debt: self.stable_debt,
            total_variable_debt: self.variable_debt,
            available_liquidity: self.available_liquidity,
            variable_borrow_rate: curve.borrow_rate_at(utilization),
            stable_borrow_rate: Ray::from_decimal(dec!(0.05)),
            liquidity_rate: curve.supply_rate_at(utilization, self.reserve.reserve_factor),
        })
    }

    fn reserve_config(&self) -> Result<ReserveConfig, StrategyError> {
        Ok(self.reserve)
    }

    fn reward_rates(&self) -> Result<RewardRates, StrategyError> {
        Ok(self.rewards)
    }

    fn position(&self) -> Result<Position, StrategyError> {
        Ok(self.position)
    }

    fn want_balance(&self) -> Result<u128, StrategyError> {
        Ok(self.want_balance)
    }

    fn supply(&mut self, amount: u128) -> Result<(), StrategyError> {
        if amount > self.want_balance {
            return Err(StrategyError::MarketCall {
                op: "supply",
                reason: format!("amount {amount} exceeds want balance {}", self.want_balance),
            });
        }
        self.want_balance -= amount;
        self.position.deposits += amount;
        self.available_liquidity += amount;
        debug!(amount, "sim: supplied");
        self.log_op();
        Ok(())
    }

    fn withdraw(&mut self, amount: u128) -> Result<u128, StrategyError> {
        // partial fill when the pool is short
        let fill = amount
            .min(self.available_liquidity)
            .min(self.position.deposits);
        self.position.deposits -= fill;
        self.available_liquidity -= fill;
        self.want_balance += fill;
        debug!(amount, fill, "sim: withdrew");
        self.log_op();
        Ok(fill)
    }

    fn borrow(&mut self, amount: u128) -> Result<(), StrategyError> {
        if amount > self.available_liquidity {
            return Err(StrategyError::MarketCall {
                op: "borrow",
                reason: format!(
                    "amount {amount} exceeds available liquidity {}",
                    self.available_liquidity
                ),
            });
        }
        self.position.borrows += amount;
        self.variable_debt += amount;
        self.available_liquidity -= amount;
        self.want_balance += amount;
        debug!(amount, "sim: borrowed");
        self.log_op();
        Ok(())
    }

    fn repay(&mut self, amount: u128) -> Result<u128, StrategyError> {
        let fill = amount.min(self.position.borrows).min(self.want_balance);
        self.position.borrows -= fill;
        self.variable_debt -= fill;
        self.available_liquidity += fill;
        self.want_balance -= fill;
        debug!(amount, fill, "sim: repaid");
        self.log_op();
        Ok(fill)
    }

    fn credit_want(&mut self, amount: u128) -> Result<(), StrategyError> {
        self.want_balance += amount;
        Ok(())
    }

    fn debit_want(&mut self, amount: u128) -> Result<(), StrategyError> {
        if amount > self.want_balance {
            return Err(StrategyError::MarketCall {
                op: "debit_want",
                reason: format!("amount {amount} exceeds want balance {}", self.want_balance),
            });
        }
        self.want_balance -= amount;
        Ok(())
    }
}

/// Flash lender over a like-valued bridge asset with a flat fee in basis
/// points (zero for a fee-less flash mint).
#[derive(Debug, Clone, Copy)]
pub struct SimFlashLender {
    pub fee_bps: u32,
}

impl SimFlashLender {
    pub fn new(fee_bps: u32) -> Self {
        Self { fee_bps }
    }
}

impl FlashLender for SimFlashLender {
    fn flash_fee(&self, amount: u128) -> u128 {
        amount * u128::from(self.fee_bps) / 10_000
    }

    /// Apply the plan against the market.
    ///
    /// The plan is re-validated against a fresh snapshot first, so the
    /// individual legs below cannot come up short; a plan that would is
    /// rejected before anything moves, which is what keeps this
    /// all-or-nothing.
    fn execute(
        &self,
        plan: &FlashPlan,
        market: &mut dyn LendingMarket,
    ) -> Result<(), StrategyError> {
        let state = market.market_state()?;
        plan.validate(&state, Ray::ONE)?;

        let mut bridge: u128 = 0;
        for op in &plan.ops {
            match *op {
                PlannedOp::FlashBorrow { amount } => {
                    bridge += amount;
                }
                PlannedOp::SwapToWant { amount_in } => {
                    bridge -= amount_in;
                    market.credit_want(amount_in)?;
                }
                PlannedOp::Supply { amount } => market.supply(amount)?,
                PlannedOp::Borrow { amount } => market.borrow(amount)?,
                PlannedOp::Repay { amount } => {
                    let repaid = market.repay(amount)?;
                    if repaid < amount {
                        return Err(StrategyError::FlashRejected {
                            reason: format!("repay leg filled {repaid} of {amount}"),
                        });
                    }
                }
                PlannedOp::Withdraw { amount } => {
                    let got = market.withdraw(amount)?;
                    if got < amount {
                        return Err(StrategyError::FlashUnrepayable {
                            short: amount - got,
                        });
                    }
                }
                PlannedOp::SwapFromWant { amount_in } => {
                    market.debit_want(amount_in)?;
                    bridge += amount_in;
                }
                PlannedOp::FlashRepay { amount } => {
                    if bridge < amount {
                        return Err(StrategyError::FlashUnrepayable {
                            short: amount - bridge,
                        });
                    }
                    bridge -= amount;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flash::plan_lever_up;

    #[test]
    fn test_supply_and_borrow_move_the_pool() {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(1_000_000);
        let before = market.market_state().unwrap();

        market.supply(1_000_000).unwrap();
        market.borrow(500_000).unwrap();

        let after = market.market_state().unwrap();
        assert_eq!(after.total_variable_debt, before.total_variable_debt + 500_000);
        assert!(after.variable_borrow_rate >= before.variable_borrow_rate);
        assert_eq!(market.position().unwrap().deposits, 1_000_000);
        assert_eq!(market.position().unwrap().borrows, 500_000);
        assert_eq!(market.want_balance().unwrap(), 500_000);
    }

    #[test]
    fn test_withdraw_partial_fill() {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(1_000_000);
        market.supply(1_000_000).unwrap();
        market.set_available_liquidity(300_000);

        let got = market.withdraw(800_000).unwrap();
        assert_eq!(got, 300_000);
        assert_eq!(market.position().unwrap().deposits, 700_000);
    }

    #[test]
    fn test_repay_caps_at_outstanding_debt() {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(1_000_000);
        market.supply(1_000_000).unwrap();
        market.borrow(200_000).unwrap();
        market.credit_want(500_000).unwrap();

        let repaid = market.repay(700_000).unwrap();
        assert_eq!(repaid, 200_000);
        assert_eq!(market.position().unwrap().borrows, 0);
    }

    #[test]
    fn test_flash_lender_executes_a_valid_plan() {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(1_000_000);
        let lender = SimFlashLender::new(0);

        let pre = market.position().unwrap();
        let plan = plan_lever_up(pre, 1_000_000, 3_000_000, 0);
        lender.execute(&plan, &mut market).unwrap();

        let pos = market.position().unwrap();
        assert_eq!(pos, plan.post);
        assert_eq!(pos.deposits, 4_000_000);
        assert_eq!(pos.borrows, 3_000_000);
        assert_eq!(market.want_balance().unwrap(), 0);
    }

    #[test]
    fn test_flash_lender_rejects_on_thin_liquidity_before_any_op() {
        let mut market = SimulatedMarket::with_defaults(1_000_000);
        market.set_want_balance(1_000_000);
        let lender = SimFlashLender::new(0);

        let pre = market.position().unwrap();
        let plan = plan_lever_up(pre, 1_000_000, 3_000_000, 0);
        let err = lender.execute(&plan, &mut market).unwrap_err();
        assert!(matches!(err, StrategyError::FlashRejected { .. }));
        // nothing moved
        assert_eq!(market.position().unwrap(), pre);
        assert_eq!(market.want_balance().unwrap(), 1_000_000);
    }

    #[test]
    fn test_flash_fee_accrues_as_debt() {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(1_000_000);
        let lender = SimFlashLender::new(9); // 9 bps

        let delta = 1_000_000u128;
        let fee = lender.flash_fee(delta);
        assert_eq!(fee, 900);
        let plan = plan_lever_up(market.position().unwrap(), 1_000_000, delta, fee);
        lender.execute(&plan, &mut market).unwrap();
        assert_eq!(market.position().unwrap().borrows, delta + fee);
    }
}
