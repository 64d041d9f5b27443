//! Net-revenue optimizer: finds the borrow amount that maximises annualised
//! strategy revenue against the kinked rate curve and live reward emissions.
//!
//! The solver never evaluates the revenue surface by search; it runs
//! Newton-Raphson on the closed-form marginal revenue `R'(x)`, with `R''(x)`
//! as the step denominator. Both derivatives come from differentiating the
//! revenue expression against the curve's analytic rate primes, so each
//! iteration costs one curve evaluation. All arithmetic stays at RAY
//! precision end to end; conversion to native units happens only at the
//! strategy boundary.

use tracing::{debug, warn};

use crate::constants::{NEWTON_MAX_STEPS, NEWTON_REL_TOL};
use crate::types::ray::Ray;

use super::rate_model::{PoolAmounts, RateCurve};

/// Inputs to one optimisation run. Snapshot semantics: nothing here is read
/// from live state after the run starts.
#[derive(Debug, Clone, Copy)]
pub struct ProfitabilityParams {
    pub curve: RateCurve,
    pub pool: PoolAmounts,
    pub stable_borrow_rate: Ray,
    pub reserve_factor: Ray,
    /// Annualised supplier-side reward emission, want-valued and already
    /// discounted for selling slippage.
    pub reward_deposit: Ray,
    /// Annualised variable-borrower-side reward emission, same valuation.
    pub reward_borrow: Ray,
    /// Assets the strategy can bring as collateral.
    pub strategy_assets: Ray,
    /// Hard ratio bound; consumed by the caller when the optimum is turned
    /// into a target ratio.
    pub max_collat_ratio: Ray,
}

/// Revenue and its first two derivatives at a given extra borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenuePrimes {
    pub revenue: Ray,
    pub d1: Ray,
    pub d2: Ray,
}

/// Evaluate `R(x)`, `R'(x)`, `R''(x)` at `borrow = x`.
///
/// Revenue decomposition (all terms annualised, want-valued):
/// - supply share: `(assets + x)/(D + x) * (1 - rf) * (SB*stable_rate + (VB + x)*rate)`
/// - borrow cost: `x * rate`
/// - rewards: `x/(VB + x) * reward_borrow + (assets + x)/(D + x) * reward_deposit`
///
/// The borrow-side reward divides over the variable debt only: the market
/// streams its borrow incentives to variable-debt holders, stable borrowers
/// are not in that denominator.
pub fn revenue_primes(borrow: Ray, p: &ProfitabilityParams) -> RevenuePrimes {
    let rates = p.curve.rate_primes(borrow, &p.pool);
    let one_minus_rf = Ray::ONE - p.reserve_factor;
    let pool_deposit = borrow + p.pool.total_deposits;
    let strat_deposit = borrow + p.strategy_assets;
    let variable_debt = borrow + p.pool.variable_debt;
    let stable_debt = p.pool.stable_debt;

    if pool_deposit.is_zero() {
        return RevenuePrimes {
            revenue: Ray::ZERO,
            d1: Ray::ZERO,
            d2: Ray::ZERO,
        };
    }

    // share of pool interest accruing to the strategy, net of reserve factor
    let share = strat_deposit.ray_div(pool_deposit).ray_mul(one_minus_rf);
    let pool_interest =
        stable_debt.ray_mul(p.stable_borrow_rate) + variable_debt.ray_mul(rates.rate);
    let earnings = share.ray_mul(pool_interest);
    let cost = borrow.ray_mul(rates.rate);
    let reward_borrow = if variable_debt.is_zero() {
        Ray::ZERO
    } else {
        borrow.mul_div(p.reward_borrow, variable_debt)
    };
    let reward_deposit = strat_deposit.mul_div(p.reward_deposit, pool_deposit);
    let revenue = earnings + reward_borrow + reward_deposit - cost;

    // first derivative, term by term
    let spread = p.pool.total_deposits - p.strategy_assets;
    let share_p = spread
        .ray_div(pool_deposit)
        .ray_mul(one_minus_rf)
        .ray_div(pool_deposit);
    let interest_p = rates.rate + variable_debt.ray_mul(rates.d1);
    let cost_p = rates.rate + borrow.ray_mul(rates.d1);
    let reward_borrow_p = if variable_debt.is_zero() {
        Ray::ZERO
    } else {
        p.reward_borrow
            .mul_div(p.pool.variable_debt, variable_debt)
            .ray_div(variable_debt)
    };
    let reward_deposit_p = p
        .reward_deposit
        .mul_div(spread, pool_deposit)
        .ray_div(pool_deposit);
    let d1 = share_p.ray_mul(pool_interest) + interest_p.ray_mul(share) - cost_p
        + reward_borrow_p
        + reward_deposit_p;

    // second derivative
    let share_p2 = (spread * -2)
        .ray_div(pool_deposit)
        .ray_mul(one_minus_rf)
        .ray_div(pool_deposit)
        .ray_div(pool_deposit);
    let interest_p2 = rates.d1 * 2 + variable_debt.ray_mul(rates.d2);
    let cost_p2 = rates.d1 * 2 + borrow.ray_mul(rates.d2);
    let reward_borrow_p2 = if variable_debt.is_zero() {
        Ray::ZERO
    } else {
        (p.reward_borrow * -2)
            .mul_div(p.pool.variable_debt, variable_debt)
            .ray_div(variable_debt)
            .ray_div(variable_debt)
    };
    let reward_deposit_p2 = (p.reward_deposit * -2)
        .mul_div(spread, pool_deposit)
        .ray_div(pool_deposit)
        .ray_div(pool_deposit);
    let d2 = share_p2.ray_mul(pool_interest) + share_p.ray_mul(interest_p) * 2
        + interest_p2.ray_mul(share)
        - cost_p2
        + reward_borrow_p2
        + reward_deposit_p2;

    RevenuePrimes { revenue, d1, d2 }
}

/// Find the borrow amount maximising net annualised revenue.
///
/// Newton-Raphson on `R'` seeded at the strategy's assets, stopping once the
/// applied step falls below [`NEWTON_REL_TOL`] relative or the iteration
/// budget runs out (best estimate is returned, never an error). Iterates are
/// clamped to `[0, available_liquidity]` — the market cannot lend more than
/// it holds, and the clamp keeps the arithmetic bounded on divergent curves.
/// A degenerate `R'' == 0` (possible exactly at the kink with flat rewards)
/// takes a bisection step toward zero instead of dividing.
///
/// Returns zero when the market is empty, when no liquidity is available, or
/// when no borrow level strictly beats the unlevered revenue.
pub fn find_optimal_borrow(p: &ProfitabilityParams) -> Ray {
    let available =
        p.pool.total_deposits - p.pool.stable_debt - p.pool.variable_debt;
    if p.pool.total_deposits <= Ray::ZERO || available <= Ray::ZERO {
        return Ray::ZERO;
    }

    let mut borrow = p.strategy_assets.clamp(Ray::ZERO, available);
    let mut converged = false;
    let mut steps = 0usize;
    for _ in 0..NEWTON_MAX_STEPS {
        let primes = revenue_primes(borrow, p);
        if primes.d1.is_zero() {
            converged = true;
            break;
        }
        let next = if primes.d2.is_zero() {
            borrow / 2
        } else {
            borrow - primes.d1.ray_div(primes.d2)
        };
        let next = next.clamp(Ray::ZERO, available);
        let delta = (next - borrow).abs();
        borrow = next;
        steps += 1;
        if borrow.is_zero() {
            converged = true;
            break;
        }
        if delta.ray_div(borrow) < NEWTON_REL_TOL {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            borrow = %borrow,
            steps,
            "optimizer exhausted its iteration budget, returning best estimate"
        );
    } else {
        debug!(borrow = %borrow, steps, "optimizer converged");
    }

    // leverage must strictly beat staying unlevered
    let at_optimum = revenue_primes(borrow, p).revenue;
    let unlevered = revenue_primes(Ray::ZERO, p).revenue;
    if at_optimum <= unlevered {
        debug!("unlevered revenue dominates, optimal borrow is zero");
        return Ray::ZERO;
    }
    borrow
}
