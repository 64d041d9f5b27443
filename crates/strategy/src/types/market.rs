use serde::{Deserialize, Serialize};

use super::ray::Ray;

/// Snapshot of the external money market for the want reserve.
///
/// Totals are native want units; rates are RAY. Read fresh at the start of
/// every rebalancing cycle and after every controller round — never cached
/// across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketState {
    pub total_deposits: u128,
    pub total_stable_debt: u128,
    pub total_variable_debt: u128,
    /// Un-borrowed liquidity actually withdrawable right now.
    pub available_liquidity: u128,
    pub variable_borrow_rate: Ray,
    pub stable_borrow_rate: Ray,
    pub liquidity_rate: Ray,
}

impl MarketState {
    /// Current utilization of the reserve, zero when empty.
    pub fn utilization(&self) -> Ray {
        if self.total_deposits == 0 {
            return Ray::ZERO;
        }
        let debt = Ray::from_units(self.total_stable_debt + self.total_variable_debt, 0);
        debt.ray_div(Ray::from_units(self.total_deposits, 0))
    }
}

/// Reserve configuration: risk bounds plus the interest-rate curve.
///
/// `ltv` and `liquidation_threshold` are the market's own safety bounds; the
/// strategy derives its collateral targets from them each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConfig {
    pub ltv: Ray,
    pub liquidation_threshold: Ray,
    pub reserve_factor: Ray,
    pub base_rate: Ray,
    pub slope1: Ray,
    pub slope2: Ray,
    pub u_optimal: Ray,
}

/// Per-second reward emissions, already valued in the want asset (RAY).
///
/// The price-oracle conversion from reward token to want happens in the
/// market adapter; the core only ever sees want-valued emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewardRates {
    pub deposit_per_second: Ray,
    pub borrow_per_second: Ray,
}

impl RewardRates {
    pub fn is_zero(&self) -> bool {
        self.deposit_per_second.is_zero() && self.borrow_per_second.is_zero()
    }
}

/// Which execution path a cycle used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Iterative,
    Flash,
    None,
}

impl ExecutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iterative => "iterative",
            Self::Flash => "flash",
            Self::None => "none",
        }
    }
}
