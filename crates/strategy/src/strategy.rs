//! Exposed surface of the strategy engine.
//!
//! The reserve-accounting ledger drives everything through [`Strategy`]:
//! `rebalance()` runs one PositionReader → ProfitabilityOptimizer →
//! LeverageController cycle, the accessors value the position, and the
//! setters reconfigure behaviour. Capability checks live here and only here
//! — the numeric core below never sees a role.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::constants::SECONDS_PER_YEAR;
use crate::core::controller::{IterationLimits, LeverageController};
use crate::core::optimizer::{find_optimal_borrow, ProfitabilityParams};
use crate::core::position_reader::{CycleSnapshot, PositionReader};
use crate::core::rate_model::{PoolAmounts, RateCurve};
use crate::errors::StrategyError;
use crate::market::{FlashLender, LendingMarket};
use crate::types::position::{CollateralTargets, CycleReport};
use crate::types::ray::Ray;

/// Caller capability, checked at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Full control of configuration and execution.
    Manager,
    /// May trigger rebalancing cycles, nothing else.
    Keeper,
    /// May halt: emergency exit and disabling the flash path.
    Guardian,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Keeper => "keeper",
            Self::Guardian => "guardian",
        }
    }
}

/// Manually configured ratio overrides (`set_targets`).
#[derive(Debug, Clone, Copy)]
struct ManualTargets {
    target: Ray,
    max: Ray,
    max_borrow: Ray,
}

/// The yield-strategy capital manager.
///
/// Holds configuration only; position and market state live outside and are
/// read fresh each cycle, so the computational core stays a pure function of
/// its inputs.
pub struct Strategy {
    want_decimals: u8,
    automatic_targeting: bool,
    flash_active: bool,
    reward_discount: Ray,
    bridge_ltv: Ray,
    pinned_target: Option<Ray>,
    manual_targets: Option<ManualTargets>,
    limits: IterationLimits,
    emergency_exit: bool,
}

impl Strategy {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            want_decimals: config.want_decimals,
            automatic_targeting: config.automatic_targeting,
            flash_active: config.flash_active,
            reward_discount: Ray::from_decimal(config.reward_discount),
            bridge_ltv: Ray::from_decimal(config.bridge_ltv),
            pinned_target: config.pinned_target_collat_ratio.map(Ray::from_decimal),
            manual_targets: None,
            limits: IterationLimits {
                max_iterations: config.max_iterations,
                min_ratio: Ray::from_decimal(config.min_ratio),
                min_want: u128::from(config.min_want),
            },
            emergency_exit: false,
        }
    }

    // -----------------------------------------------------------------------
    // Cycle execution
    // -----------------------------------------------------------------------

    /// Run one full rebalancing cycle and report the resulting position.
    ///
    /// The flash lender is only consulted when the flash path is active;
    /// passing one while it is disabled is harmless.
    pub fn rebalance(
        &self,
        role: Role,
        market: &mut dyn LendingMarket,
        flash: Option<&dyn FlashLender>,
    ) -> Result<CycleReport, StrategyError> {
        self.authorize(role, "rebalance", &[Role::Manager, Role::Keeper])?;

        let snapshot = PositionReader::snapshot(market)?;
        let derived = PositionReader::derive_targets(&snapshot.reserve, self.bridge_ltv);
        let targets = self.effective_targets(derived);

        let target_ratio = if self.emergency_exit {
            Ray::ZERO
        } else if self.automatic_targeting {
            self.auto_target(&snapshot, &targets)
        } else {
            self.pinned_target
                .unwrap_or(targets.target_collat_ratio)
                .min(targets.max_borrow_collat_ratio)
        };
        info!(
            target = %target_ratio,
            automatic = self.automatic_targeting,
            emergency = self.emergency_exit,
            "rebalance cycle starting"
        );

        let controller = LeverageController::new(targets, self.limits);
        let flash = if self.flash_active { flash } else { None };
        controller.run_cycle(market, target_ratio, self.emergency_exit, flash)
    }

    /// Valuation of the strategy in want terms: `deposits + idle - borrows`.
    pub fn estimated_total_assets(
        &self,
        market: &dyn LendingMarket,
    ) -> Result<u128, StrategyError> {
        let position = market.position()?;
        let idle = market.want_balance()?;
        Ok((position.deposits + idle).saturating_sub(position.borrows))
    }

    /// Net annualised yield of the current position: supply interest plus
    /// discounted rewards, minus borrow cost, over total assets.
    pub fn estimated_apr(&self, market: &dyn LendingMarket) -> Result<Ray, StrategyError> {
        let snapshot = PositionReader::snapshot(market)?;
        let d = self.want_decimals;
        let assets =
            (snapshot.position.deposits + snapshot.idle_want).saturating_sub(snapshot.position.borrows);
        if assets == 0 {
            return Ok(Ray::ZERO);
        }

        let curve = RateCurve::from(&snapshot.reserve);
        let pool = self.pool_amounts(&snapshot);
        let utilization = pool.utilization(Ray::ZERO);
        let deposits = Ray::from_units(snapshot.position.deposits, d);
        let borrows = Ray::from_units(snapshot.position.borrows, d);

        let supply_interest =
            deposits.ray_mul(curve.supply_rate_at(utilization, snapshot.reserve.reserve_factor));
        let borrow_cost = borrows.ray_mul(curve.borrow_rate_at(utilization));
        let deposit_reward = if pool.total_deposits.is_zero() {
            Ray::ZERO
        } else {
            deposits.mul_div(
                self.annualise(snapshot.rewards.deposit_per_second),
                pool.total_deposits,
            )
        };
        let borrow_reward = if pool.variable_debt.is_zero() {
            Ray::ZERO
        } else {
            borrows.mul_div(
                self.annualise(snapshot.rewards.borrow_per_second),
                pool.variable_debt,
            )
        };

        let net = supply_interest + deposit_reward + borrow_reward - borrow_cost;
        Ok(net.ray_div(Ray::from_units(assets, d)))
    }

    // -----------------------------------------------------------------------
    // Configuration surface
    // -----------------------------------------------------------------------

    /// Override the derived collateral ratios. Requires
    /// `target <= max_borrow <= max < 1`; live market bounds still cap the
    /// effective values every cycle.
    pub fn set_targets(
        &mut self,
        role: Role,
        target: Decimal,
        max: Decimal,
        max_borrow: Decimal,
    ) -> Result<(), StrategyError> {
        self.authorize(role, "set_targets", &[Role::Manager])?;
        let (target, max, max_borrow) = (
            Ray::from_decimal(target),
            Ray::from_decimal(max),
            Ray::from_decimal(max_borrow),
        );
        if target.is_negative() || target > max_borrow || max_borrow > max || max >= Ray::ONE {
            return Err(StrategyError::Config(format!(
                "targets must satisfy 0 <= target ({target}) <= max_borrow ({max_borrow}) <= max ({max}) < 1"
            )));
        }
        self.manual_targets = Some(ManualTargets {
            target,
            max,
            max_borrow,
        });
        info!(%target, %max, %max_borrow, "collateral targets set");
        Ok(())
    }

    pub fn set_automatic_targeting(
        &mut self,
        role: Role,
        enabled: bool,
    ) -> Result<(), StrategyError> {
        self.authorize(role, "set_automatic_targeting", &[Role::Manager])?;
        self.automatic_targeting = enabled;
        info!(enabled, "automatic targeting set");
        Ok(())
    }

    pub fn set_iteration_limits(
        &mut self,
        role: Role,
        max_iterations: u8,
        min_ratio: Decimal,
        min_want: u128,
    ) -> Result<(), StrategyError> {
        self.authorize(role, "set_iteration_limits", &[Role::Manager])?;
        if max_iterations == 0 {
            return Err(StrategyError::Config(
                "max_iterations must be at least 1".into(),
            ));
        }
        let min_ratio = Ray::from_decimal(min_ratio);
        if min_ratio.is_negative() || min_ratio >= Ray::ONE {
            return Err(StrategyError::Config("min_ratio must be in [0, 1)".into()));
        }
        self.limits = IterationLimits {
            max_iterations,
            min_ratio,
            min_want,
        };
        info!(max_iterations, %min_ratio, min_want, "iteration limits set");
        Ok(())
    }

    pub fn set_reward_discount(
        &mut self,
        role: Role,
        discount: Decimal,
    ) -> Result<(), StrategyError> {
        self.authorize(role, "set_reward_discount", &[Role::Manager])?;
        let discount = Ray::from_decimal(discount);
        if discount <= Ray::ZERO || discount > Ray::ONE {
            return Err(StrategyError::Config(
                "reward discount must be in (0, 1]".into(),
            ));
        }
        self.reward_discount = discount;
        Ok(())
    }

    pub fn set_flash_active(&mut self, role: Role, active: bool) -> Result<(), StrategyError> {
        self.authorize(role, "set_flash_active", &[Role::Manager, Role::Guardian])?;
        self.flash_active = active;
        info!(active, "flash path set");
        Ok(())
    }

    /// Force every subsequent cycle to wind the position down to zero.
    pub fn trigger_emergency_exit(&mut self, role: Role) -> Result<(), StrategyError> {
        self.authorize(role, "trigger_emergency_exit", &[Role::Manager, Role::Guardian])?;
        self.emergency_exit = true;
        info!("emergency exit triggered");
        Ok(())
    }

    pub fn emergency_exit(&self) -> bool {
        self.emergency_exit
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn authorize(
        &self,
        role: Role,
        action: &'static str,
        allowed: &[Role],
    ) -> Result<(), StrategyError> {
        if allowed.contains(&role) {
            Ok(())
        } else {
            Err(StrategyError::Unauthorized {
                role: role.as_str(),
                action,
            })
        }
    }

    /// Manual overrides capped by the live derived bounds, with the
    /// ordering `target <= max_borrow <= max` re-enforced after capping.
    fn effective_targets(&self, derived: CollateralTargets) -> CollateralTargets {
        let mut targets = match self.manual_targets {
            None => derived,
            Some(manual) => CollateralTargets {
                target_collat_ratio: manual.target,
                max_collat_ratio: manual.max.min(derived.max_collat_ratio),
                max_borrow_collat_ratio: manual.max_borrow.min(derived.max_borrow_collat_ratio),
                bridge_collat_ratio: derived.bridge_collat_ratio,
            },
        };
        targets.max_borrow_collat_ratio = targets
            .max_borrow_collat_ratio
            .min(targets.max_collat_ratio);
        targets.target_collat_ratio = targets
            .target_collat_ratio
            .min(targets.max_borrow_collat_ratio);
        targets
    }

    fn pool_amounts(&self, snapshot: &CycleSnapshot) -> PoolAmounts {
        let d = self.want_decimals;
        PoolAmounts {
            total_deposits: Ray::from_units(snapshot.market.total_deposits, d),
            stable_debt: Ray::from_units(snapshot.market.total_stable_debt, d),
            variable_debt: Ray::from_units(snapshot.market.total_variable_debt, d),
        }
    }

    fn annualise(&self, per_second: Ray) -> Ray {
        (per_second * SECONDS_PER_YEAR as i64).ray_mul(self.reward_discount)
    }

    /// Optimizer-driven target: solve for the revenue-optimal borrow, turn
    /// it into the ratio it implies on the post-leverage position, and cap
    /// at the configured target so an optimizer overshoot can never reach a
    /// market call.
    fn auto_target(&self, snapshot: &CycleSnapshot, targets: &CollateralTargets) -> Ray {
        let d = self.want_decimals;
        let assets =
            (snapshot.position.deposits + snapshot.idle_want).saturating_sub(snapshot.position.borrows);
        let params = ProfitabilityParams {
            curve: RateCurve::from(&snapshot.reserve),
            pool: self.pool_amounts(snapshot),
            stable_borrow_rate: snapshot.market.stable_borrow_rate,
            reserve_factor: snapshot.reserve.reserve_factor,
            reward_deposit: self.annualise(snapshot.rewards.deposit_per_second),
            reward_borrow: self.annualise(snapshot.rewards.borrow_per_second),
            strategy_assets: Ray::from_units(assets, d),
            max_collat_ratio: targets.max_collat_ratio,
        };
        let optimal = find_optimal_borrow(&params);
        if optimal.is_zero() {
            return Ray::ZERO;
        }
        let denom = params.strategy_assets + optimal;
        if denom.is_zero() {
            return Ray::ZERO;
        }
        let ratio = optimal.ray_div(denom);
        let capped = ratio.clamp(Ray::ZERO, targets.target_collat_ratio);
        debug!(optimal = %optimal, implied = %ratio, capped = %capped, "optimizer target");
        capped
    }
}
