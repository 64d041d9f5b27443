//! Leverage controller: drives the live position toward a target collateral
//! ratio through bounded supply/borrow/repay/withdraw rounds, or through a
//! single atomic flash-bridge adjustment when one is available.
//!
//! Every round re-reads live market state — the position's own operations
//! shift utilization and available liquidity between rounds. The controller
//! never fails on slow convergence: an exhausted iteration budget leaves the
//! position at its best-effort state for the next cycle to continue.

use tracing::{debug, info, warn};

use crate::errors::StrategyError;
use crate::market::{FlashLender, LendingMarket};
use crate::types::market::ExecutionPath;
use crate::types::position::{
    CollateralTargets, ControllerState, CycleReport, Position,
};
use crate::types::ray::Ray;

use super::flash::{plan_lever_down, plan_lever_up};

/// Bounds on one controller invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationLimits {
    /// Maximum supply/borrow (or repay/withdraw) rounds per cycle.
    pub max_iterations: u8,
    /// Ratio delta below which convergence is declared.
    pub min_ratio: Ray,
    /// Dust threshold in want units; smaller amounts are not acted on.
    pub min_want: u128,
}

/// The borrow that puts `supply` net assets at `ratio`:
/// `supply * r / (1 - r)`.
pub fn borrow_from_supply(supply: u128, ratio: Ray) -> u128 {
    if ratio >= Ray::ONE {
        // a ratio of one needs infinite borrow; callers validate below one
        return u128::MAX;
    }
    Ray::from_units(supply, 0)
        .ray_mul(ratio)
        .ray_div(Ray::ONE - ratio)
        .to_units_floor(0)
}

/// The borrow a given deposit supports at `ratio`.
pub fn borrow_from_deposit(deposit: u128, ratio: Ray) -> u128 {
    Ray::from_units(deposit, 0).ray_mul(ratio).to_units_floor(0)
}

/// The smallest deposit that keeps `borrow` at or below `ratio`.
/// Rounds up: flooring would leave the position one unit past the bound.
pub fn deposit_from_borrow(borrow: u128, ratio: Ray) -> u128 {
    if borrow == 0 {
        return 0;
    }
    let floor = Ray::from_units(borrow, 0).ray_div(ratio).to_units_floor(0);
    if borrow_from_deposit(floor, ratio) < borrow {
        floor + 1
    } else {
        floor
    }
}

/// What one controller round did.
struct RoundOutcome {
    ops: u32,
    moved: u128,
}

pub struct LeverageController {
    pub targets: CollateralTargets,
    pub limits: IterationLimits,
}

impl LeverageController {
    pub fn new(targets: CollateralTargets, limits: IterationLimits) -> Self {
        Self { targets, limits }
    }

    /// Run one full cycle toward `target_ratio`.
    ///
    /// `emergency` forces the target to zero and winds the position down
    /// entirely (collateral is freed to idle want instead of redeposited).
    /// When a flash lender is supplied the whole delta is attempted in one
    /// atomic plan first; an infeasible plan falls back to the iterative
    /// path, an execution failure aborts the cycle with the position
    /// untouched.
    pub fn run_cycle(
        &self,
        market: &mut dyn LendingMarket,
        target_ratio: Ray,
        emergency: bool,
        flash: Option<&dyn FlashLender>,
    ) -> Result<CycleReport, StrategyError> {
        // the controller's own hard bound: whatever the caller asked for,
        // never aim past the borrow-halting ratio
        let target = if emergency {
            Ray::ZERO
        } else {
            target_ratio.clamp(Ray::ZERO, self.targets.max_borrow_collat_ratio)
        };

        let mut ops: u32 = 0;
        let mut rounds: u8 = 0;
        let mut path = ExecutionPath::None;
        let mut state = if emergency {
            ControllerState::EmergencyDeleverage
        } else {
            ControllerState::AtTarget
        };

        if let Some(lender) = flash {
            if let Some(flash_ops) = self.try_flash(market, lender, target)? {
                ops += flash_ops;
                path = ExecutionPath::Flash;
            }
        }

        for _ in 0..self.limits.max_iterations {
            let mut pos = market.position()?;
            let idle = market.want_balance()?;

            // idle want earns nothing; in normal operation it goes back to
            // work before the ratio is measured. A wind-down does the
            // opposite and accumulates idle want for the ledger.
            let mut round_ops: u32 = 0;
            if !emergency && idle > self.limits.min_want {
                market.supply(idle)?;
                round_ops += 1;
                pos = market.position()?;
            }

            let desired = borrow_from_supply(pos.net(), target);
            let ratio = pos.collat_ratio();
            let converged = if emergency {
                pos.is_empty()
            } else {
                (ratio - target).abs() <= self.limits.min_ratio
                    && pos.borrows.abs_diff(desired) <= self.limits.min_want
            };
            if converged {
                if round_ops > 0 {
                    ops += round_ops;
                    rounds += 1;
                }
                if !emergency {
                    state = ControllerState::AtTarget;
                }
                break;
            }

            let outcome = if desired > pos.borrows {
                state = ControllerState::LeverUp;
                self.lever_up_round(market, &pos, desired - pos.borrows)?
            } else {
                if !emergency {
                    state = ControllerState::LeverDown;
                }
                self.lever_down_round(market, &pos, pos.borrows - desired)?
            };

            ops += round_ops + outcome.ops;
            if round_ops + outcome.ops > 0 {
                rounds += 1;
            }
            if outcome.moved == 0 && round_ops == 0 {
                // bound or liquidity blocked all progress; the next cycle
                // retries with fresh state
                debug!(ratio = %ratio, target = %target, "no further progress this cycle");
                break;
            }
        }

        let position = market.position()?;
        let idle_want = market.want_balance()?;
        let ratio = position.collat_ratio();
        if ratio > self.targets.max_collat_ratio {
            // unreachable by construction; surfaced loudly if a market
            // adapter misreports
            warn!(ratio = %ratio, max = %self.targets.max_collat_ratio, "position above max collateral ratio");
        }
        if path == ExecutionPath::None && ops > 0 {
            path = ExecutionPath::Iterative;
        }
        if !emergency && ops == 0 {
            state = ControllerState::AtTarget;
        }

        let report = CycleReport {
            position,
            idle_want,
            total_assets: (position.deposits + idle_want).saturating_sub(position.borrows),
            state,
            path,
            iterations: rounds,
            ops_issued: ops,
        };
        info!(
            deposits = report.position.deposits,
            borrows = report.position.borrows,
            idle = report.idle_want,
            ratio = %ratio,
            state = report.state.as_str(),
            path = report.path.as_str(),
            rounds = report.iterations,
            ops = report.ops_issued,
            "cycle complete"
        );
        Ok(report)
    }

    /// Attempt the whole adjustment as one atomic flash plan.
    ///
    /// Returns `Ok(None)` when the plan is not worth attempting or is
    /// infeasible (iterative fallback), `Ok(Some(ops))` on success, and an
    /// error only when the lender itself failed mid-execution.
    fn try_flash(
        &self,
        market: &mut dyn LendingMarket,
        lender: &dyn FlashLender,
        target: Ray,
    ) -> Result<Option<u32>, StrategyError> {
        let pos = market.position()?;
        let idle = market.want_balance()?;
        let state = market.market_state()?;
        let net = (pos.deposits + idle).saturating_sub(pos.borrows);
        let desired = borrow_from_supply(net, target);

        let (plan, bound) = if desired > pos.borrows + self.limits.min_want {
            let delta = desired - pos.borrows;
            let fee = lender.flash_fee(delta);
            (
                plan_lever_up(pos, idle, delta, fee),
                self.targets
                    .bridge_collat_ratio
                    .min(self.targets.max_collat_ratio),
            )
        } else if pos.borrows > desired + self.limits.min_want {
            let delta = pos.borrows - desired;
            let fee = lender.flash_fee(delta);
            (
                plan_lever_down(pos, delta, fee),
                self.targets.max_collat_ratio,
            )
        } else {
            return Ok(None);
        };

        if let Err(err) = plan.validate(&state, bound) {
            debug!(%err, "flash plan infeasible, taking the iterative path");
            return Ok(None);
        }
        lender.execute(&plan, market)?;
        info!(
            flash_amount = plan.flash_amount,
            fee = plan.fee,
            ops = plan.ops.len(),
            "flash adjustment executed"
        );
        Ok(Some(plan.ops.len() as u32))
    }

    /// One lever-up round: borrow as much of `delta` as the borrow-halting
    /// ratio and market liquidity allow. The borrowed want is supplied at
    /// the start of the next round.
    fn lever_up_round(
        &self,
        market: &mut dyn LendingMarket,
        pos: &Position,
        delta: u128,
    ) -> Result<RoundOutcome, StrategyError> {
        let state = market.market_state()?;
        let capacity = borrow_from_deposit(pos.deposits, self.targets.max_borrow_collat_ratio)
            .saturating_sub(pos.borrows);
        let amount = delta.min(capacity).min(state.available_liquidity);
        if amount <= self.limits.min_want {
            return Ok(RoundOutcome { ops: 0, moved: 0 });
        }
        market.borrow(amount)?;
        debug!(amount, capacity, "lever up: borrowed");
        Ok(RoundOutcome {
            ops: 1,
            moved: amount,
        })
    }

    /// One lever-down round: free the collateral the max ratio no longer
    /// requires (bounded by market liquidity — a shortfall degrades to a
    /// partial withdrawal), then repay up to `delta` from idle want.
    fn lever_down_round(
        &self,
        market: &mut dyn LendingMarket,
        pos: &Position,
        delta: u128,
    ) -> Result<RoundOutcome, StrategyError> {
        let state = market.market_state()?;
        let mut ops = 0u32;
        let mut moved = 0u128;

        let required = deposit_from_borrow(pos.borrows, self.targets.max_collat_ratio);
        let freeable = pos.deposits.saturating_sub(required);
        if freeable > self.limits.min_want {
            let request = freeable.min(state.available_liquidity);
            if request > 0 {
                let got = market.withdraw(request)?;
                if got < request {
                    warn!(request, got, "market filled a partial withdrawal");
                }
                ops += 1;
                moved += got;
            }
        }

        if pos.borrows > 0 {
            let idle = market.want_balance()?;
            let to_repay = idle.min(delta);
            if to_repay > self.limits.min_want {
                let repaid = market.repay(to_repay)?;
                ops += 1;
                moved += repaid;
            }
        }

        Ok(RoundOutcome { ops, moved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::sim::SimulatedMarket;
    use rust_decimal_macros::dec;
    use rust_decimal::Decimal;

    fn ray(d: Decimal) -> Ray {
        Ray::from_decimal(d)
    }

    fn targets() -> CollateralTargets {
        CollateralTargets {
            target_collat_ratio: ray(dec!(0.75)),
            max_collat_ratio: ray(dec!(0.9)),
            max_borrow_collat_ratio: ray(dec!(0.895)),
            bridge_collat_ratio: ray(dec!(0.765)),
        }
    }

    fn limits() -> IterationLimits {
        IterationLimits {
            max_iterations: 6,
            min_ratio: ray(dec!(0.005)),
            min_want: 100,
        }
    }

    fn fresh_market(idle: u128) -> SimulatedMarket {
        let mut market = SimulatedMarket::with_defaults(1_000_000_000);
        market.set_want_balance(idle);
        market
    }

    #[test]
    fn test_conversion_helpers() {
        assert_eq!(borrow_from_supply(1_000_000, ray(dec!(0.75))), 3_000_000);
        assert_eq!(borrow_from_deposit(1_000_000, ray(dec!(0.895))), 895_000);
        assert_eq!(deposit_from_borrow(3_000_000, ray(dec!(0.75))), 4_000_000);
        // rounding: 3e6 / 0.845 has to round up
        let d = deposit_from_borrow(3_000_000, ray(dec!(0.845)));
        assert_eq!(d, 3_550_296);
        assert!(borrow_from_deposit(d, ray(dec!(0.845))) >= 3_000_000);
        assert_eq!(deposit_from_borrow(0, ray(dec!(0.845))), 0);
    }

    #[test]
    fn test_lever_up_from_zero_converges_within_six_rounds() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();

        assert_eq!(report.position.deposits, 4_000_000);
        assert_eq!(report.position.borrows, 3_000_000);
        assert_eq!(report.position.collat_ratio(), ray(dec!(0.75)));
        assert_eq!(report.state, ControllerState::AtTarget);
        assert!(report.iterations <= 6);
        // the ratio bound held at every intermediate step
        for pos in market.op_log() {
            assert!(
                pos.collat_ratio() <= targets().max_collat_ratio,
                "intermediate ratio {} above max",
                pos.collat_ratio()
            );
        }
    }

    #[test]
    fn test_lever_down_converges_and_redeposits_idle() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();

        let report = controller
            .run_cycle(&mut market, ray(dec!(0.5)), false, None)
            .unwrap();
        assert_eq!(report.position.deposits, 2_000_000);
        assert_eq!(report.position.borrows, 1_000_000);
        assert_eq!(report.idle_want, 0);
        assert_eq!(report.state, ControllerState::AtTarget);
        for pos in market.op_log() {
            assert!(pos.collat_ratio() <= targets().max_collat_ratio);
        }
    }

    #[test]
    fn test_repeated_cycle_is_noop() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        let first = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();
        assert!(first.ops_issued > 0);

        let second = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();
        assert_eq!(second.ops_issued, 0);
        assert_eq!(second.iterations, 0);
        assert_eq!(second.position, first.position);
        assert_eq!(second.state, ControllerState::AtTarget);
    }

    #[test]
    fn test_emergency_deleverage_clears_debt_and_frees_collateral() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();

        let report = controller
            .run_cycle(&mut market, ray(dec!(0.75)), true, None)
            .unwrap();
        assert_eq!(report.position.borrows, 0);
        assert_eq!(report.position.deposits, 0);
        assert_eq!(report.idle_want, 1_000_000);
        assert_eq!(report.state, ControllerState::EmergencyDeleverage);
        for pos in market.op_log() {
            assert!(pos.collat_ratio() <= targets().max_collat_ratio);
        }
    }

    #[test]
    fn test_iteration_budget_yields_best_effort() {
        let mut market = fresh_market(1_000_000);
        let mut tight = limits();
        tight.max_iterations = 2;
        let controller = LeverageController::new(targets(), tight);
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();

        // not converged, not failed: partial leverage with the bound intact
        assert!(report.position.borrows > 0);
        assert!(report.position.borrows < 3_000_000);
        assert_eq!(report.state, ControllerState::LeverUp);
        assert!(report.position.collat_ratio() <= targets().max_collat_ratio);

        // the next cycle continues from where this one stopped
        let controller = LeverageController::new(targets(), limits());
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();
        assert_eq!(report.position.collat_ratio(), ray(dec!(0.75)));
    }

    #[test]
    fn test_withdraw_liquidity_shortfall_degrades_to_partial() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();

        // the market dries up: only a sliver of liquidity is left
        market.set_available_liquidity(50_000);
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.5)), false, None)
            .unwrap();

        // made partial progress toward the target without erroring
        assert!(report.position.borrows < 3_000_000);
        assert!(report.position.collat_ratio() <= targets().max_collat_ratio);
    }

    #[test]
    fn test_target_above_borrow_bound_is_clamped() {
        let mut market = fresh_market(1_000_000);
        let controller = LeverageController::new(targets(), limits());
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.99)), false, None)
            .unwrap();
        assert!(report.position.collat_ratio() <= targets().max_borrow_collat_ratio);
        assert!(report.position.collat_ratio() <= targets().max_collat_ratio);
    }

    #[test]
    fn test_dust_position_is_left_alone() {
        let mut market = fresh_market(50); // below min_want
        let controller = LeverageController::new(targets(), limits());
        let report = controller
            .run_cycle(&mut market, ray(dec!(0.75)), false, None)
            .unwrap();
        assert_eq!(report.ops_issued, 0);
        assert_eq!(report.position, Position::default());
    }
}
