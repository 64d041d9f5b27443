//! Atomic leverage adjustment via a flash-borrowed bridge asset.
//!
//! Instead of a reentrant callback, the whole adjustment is planned up front
//! as a pure state transition: pre-state in, ordered list of external calls
//! plus fully-computed post-state out. The flash lender executes the ops and
//! owes the caller atomicity — either every op lands or none do. Planning is
//! pure so it can be validated (and tested) without touching any market.

use crate::errors::StrategyError;
use crate::types::market::MarketState;
use crate::types::position::Position;
use crate::types::ray::Ray;

/// One external call inside a flash plan, in execution order.
///
/// Bridge-asset amounts are bridge units, market amounts are want units; the
/// bridge is a like-valued stable asset swapped 1:1 up to the quoted swap
/// output, so the planner works in a single unit domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedOp {
    /// Take the uncollateralised bridge loan.
    FlashBorrow { amount: u128 },
    /// Swap bridge to want.
    SwapToWant { amount_in: u128 },
    /// Supply want collateral to the market.
    Supply { amount: u128 },
    /// Borrow want from the market.
    Borrow { amount: u128 },
    /// Repay want debt.
    Repay { amount: u128 },
    /// Withdraw want collateral.
    Withdraw { amount: u128 },
    /// Swap want back to bridge.
    SwapFromWant { amount_in: u128 },
    /// Repay the bridge loan plus fee; must close the plan.
    FlashRepay { amount: u128 },
}

/// A fully-computed atomic adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashPlan {
    pub ops: Vec<PlannedOp>,
    /// Position after the plan lands.
    pub post: Position,
    pub flash_amount: u128,
    pub fee: u128,
}

/// Plan a one-shot lever-up: supply everything, take the whole borrow delta
/// in a single pass funded by the bridge loan.
///
/// The fee is borrowed on top of the delta so the swap back covers the
/// repayment exactly; it becomes part of the position's debt.
pub fn plan_lever_up(pre: Position, idle_want: u128, borrow_delta: u128, fee: u128) -> FlashPlan {
    let flash_amount = borrow_delta;
    let ops = vec![
        PlannedOp::FlashBorrow {
            amount: flash_amount,
        },
        PlannedOp::SwapToWant {
            amount_in: flash_amount,
        },
        PlannedOp::Supply {
            amount: idle_want + borrow_delta,
        },
        PlannedOp::Borrow {
            amount: borrow_delta + fee,
        },
        PlannedOp::SwapFromWant {
            amount_in: borrow_delta + fee,
        },
        PlannedOp::FlashRepay {
            amount: flash_amount + fee,
        },
    ];
    FlashPlan {
        ops,
        post: Position {
            deposits: pre.deposits + idle_want + borrow_delta,
            borrows: pre.borrows + borrow_delta + fee,
        },
        flash_amount,
        fee,
    }
}

/// Plan a one-shot lever-down: repay the whole delta with bridge-funded
/// want, then free the matching collateral to settle the loan.
pub fn plan_lever_down(pre: Position, repay_delta: u128, fee: u128) -> FlashPlan {
    let flash_amount = repay_delta;
    let withdraw = repay_delta + fee;
    let ops = vec![
        PlannedOp::FlashBorrow {
            amount: flash_amount,
        },
        PlannedOp::SwapToWant {
            amount_in: flash_amount,
        },
        PlannedOp::Repay {
            amount: repay_delta,
        },
        PlannedOp::Withdraw { amount: withdraw },
        PlannedOp::SwapFromWant {
            amount_in: withdraw,
        },
        PlannedOp::FlashRepay {
            amount: flash_amount + fee,
        },
    ];
    FlashPlan {
        ops,
        post: Position {
            deposits: pre.deposits.saturating_sub(withdraw),
            borrows: pre.borrows.saturating_sub(repay_delta),
        },
        flash_amount,
        fee,
    }
}

impl FlashPlan {
    /// Feasibility check against a fresh market snapshot.
    ///
    /// Verifies that the loan is repaid in full from planned inflows, that
    /// every market leg fits the available liquidity, and that the post
    /// position respects `ratio_bound`. A plan that fails here is rejected
    /// wholly — the iterative path picks up instead.
    pub fn validate(&self, state: &MarketState, ratio_bound: Ray) -> Result<(), StrategyError> {
        let mut bridge: u128 = 0;
        let mut owed: u128 = 0;
        for op in &self.ops {
            match *op {
                PlannedOp::FlashBorrow { amount } => {
                    bridge += amount;
                    owed = amount + self.fee;
                }
                PlannedOp::SwapToWant { amount_in } => {
                    if amount_in > bridge {
                        return Err(StrategyError::FlashRejected {
                            reason: format!(
                                "swap of {amount_in} bridge units exceeds the {bridge} held"
                            ),
                        });
                    }
                    bridge -= amount_in;
                }
                PlannedOp::Borrow { amount } | PlannedOp::Withdraw { amount } => {
                    if amount > state.available_liquidity {
                        return Err(StrategyError::FlashRejected {
                            reason: format!(
                                "market leg of {amount} exceeds available liquidity {}",
                                state.available_liquidity
                            ),
                        });
                    }
                }
                PlannedOp::SwapFromWant { amount_in } => {
                    bridge += amount_in;
                }
                PlannedOp::Supply { .. } | PlannedOp::Repay { .. } => {}
                PlannedOp::FlashRepay { amount } => {
                    if amount < owed {
                        return Err(StrategyError::FlashRejected {
                            reason: format!("plan repays {amount} of {owed} owed"),
                        });
                    }
                    if amount > bridge {
                        return Err(StrategyError::FlashUnrepayable {
                            short: amount - bridge,
                        });
                    }
                    bridge -= amount;
                    owed = 0;
                }
            }
        }
        if owed > 0 {
            return Err(StrategyError::FlashUnrepayable { short: owed });
        }
        if self.post.collat_ratio() > ratio_bound {
            return Err(StrategyError::FlashRejected {
                reason: format!(
                    "post ratio {} above bound {}",
                    self.post.collat_ratio(),
                    ratio_bound
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state(available_liquidity: u128) -> MarketState {
        MarketState {
            total_deposits: 10_000_000,
            total_stable_debt: 1_000_000,
            total_variable_debt: 4_000_000,
            available_liquidity,
            variable_borrow_rate: Ray::ZERO,
            stable_borrow_rate: Ray::ZERO,
            liquidity_rate: Ray::ZERO,
        }
    }

    #[test]
    fn test_lever_up_plan_balances() {
        let pre = Position {
            deposits: 1_000_000,
            borrows: 0,
        };
        let plan = plan_lever_up(pre, 0, 3_000_000, 0);
        assert_eq!(plan.post.deposits, 4_000_000);
        assert_eq!(plan.post.borrows, 3_000_000);
        plan.validate(&state(5_000_000), Ray::from_decimal(dec!(0.75)))
            .unwrap();
    }

    #[test]
    fn test_lever_up_with_fee_repays_in_full() {
        let pre = Position {
            deposits: 1_000_000,
            borrows: 0,
        };
        let plan = plan_lever_up(pre, 0, 1_000_000, 500);
        // fee is borrowed on top and becomes debt
        assert_eq!(plan.post.borrows, 1_000_500);
        plan.validate(&state(5_000_000), Ray::ONE).unwrap();
        assert!(plan
            .ops
            .iter()
            .any(|op| *op == PlannedOp::FlashRepay { amount: 1_000_500 }));
    }

    #[test]
    fn test_lever_down_plan_balances() {
        let pre = Position {
            deposits: 4_000_000,
            borrows: 3_000_000,
        };
        let plan = plan_lever_down(pre, 2_000_000, 0);
        assert_eq!(plan.post.deposits, 2_000_000);
        assert_eq!(plan.post.borrows, 1_000_000);
        plan.validate(&state(5_000_000), Ray::from_decimal(dec!(0.845)))
            .unwrap();
    }

    #[test]
    fn test_liquidity_shortfall_rejects_wholly() {
        let pre = Position {
            deposits: 4_000_000,
            borrows: 3_000_000,
        };
        let plan = plan_lever_down(pre, 2_000_000, 0);
        let err = plan
            .validate(&state(1_500_000), Ray::ONE)
            .unwrap_err();
        assert!(matches!(err, StrategyError::FlashRejected { .. }));
    }

    #[test]
    fn test_ratio_bound_rejects() {
        let pre = Position {
            deposits: 1_000_000,
            borrows: 0,
        };
        let plan = plan_lever_up(pre, 0, 9_000_000, 0);
        // post ratio 0.9 > 0.75 bound
        let err = plan
            .validate(&state(20_000_000), Ray::from_decimal(dec!(0.75)))
            .unwrap_err();
        assert!(matches!(err, StrategyError::FlashRejected { .. }));
    }

    #[test]
    fn test_unrepayable_plan_is_detected() {
        // hand-build a plan that swaps back less than it owes
        let plan = FlashPlan {
            ops: vec![
                PlannedOp::FlashBorrow { amount: 1_000 },
                PlannedOp::SwapToWant { amount_in: 1_000 },
                PlannedOp::Repay { amount: 1_000 },
                PlannedOp::Withdraw { amount: 900 },
                PlannedOp::SwapFromWant { amount_in: 900 },
                PlannedOp::FlashRepay { amount: 1_000 },
            ],
            post: Position::default(),
            flash_amount: 1_000,
            fee: 0,
        };
        let err = plan.validate(&state(5_000_000), Ray::ONE).unwrap_err();
        assert!(matches!(err, StrategyError::FlashUnrepayable { short: 100 }));
    }
}
