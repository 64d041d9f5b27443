use serde::{Deserialize, Serialize};

use super::ray::Ray;

/// The strategy's live position on the money market, in native want units.
///
/// Mutated only by the leverage controller, one operation at a time, inside
/// a single non-reentrant cycle. Persisted across cycles by the external
/// ledger, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Supplied collateral.
    pub deposits: u128,
    /// Outstanding variable-rate debt.
    pub borrows: u128,
}

impl Position {
    /// Collateral ratio `borrows / deposits`. Zero for an empty position.
    pub fn collat_ratio(&self) -> Ray {
        if self.deposits == 0 {
            return Ray::ZERO;
        }
        Ray::from_units(self.borrows, 0).ray_div(Ray::from_units(self.deposits, 0))
    }

    /// Net assets locked in the market (`deposits - borrows`).
    pub fn net(&self) -> u128 {
        self.deposits.saturating_sub(self.borrows)
    }

    pub fn is_empty(&self) -> bool {
        self.deposits == 0 && self.borrows == 0
    }
}

/// Collateral ratio targets derived from the market's live bounds.
///
/// Invariants (enforced at derivation and configuration time):
/// `target_collat_ratio <= max_borrow_collat_ratio <= max_collat_ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralTargets {
    /// Ratio the controller converges to.
    pub target_collat_ratio: Ray,
    /// Hard bound the position must never exceed.
    pub max_collat_ratio: Ray,
    /// Ratio at which new borrow operations are halted, leaving a buffer
    /// below `max_collat_ratio`.
    pub max_borrow_collat_ratio: Ray,
    /// Bound applied inside a flash plan when the bridge asset differs from
    /// want and carries its own LTV.
    pub bridge_collat_ratio: Ray,
}

/// Controller state reached at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    AtTarget,
    LeverUp,
    LeverDown,
    EmergencyDeleverage,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtTarget => "at_target",
            Self::LeverUp => "lever_up",
            Self::LeverDown => "lever_down",
            Self::EmergencyDeleverage => "emergency_deleverage",
        }
    }
}

/// Post-cycle summary handed back to the reserve-accounting ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub position: Position,
    /// Idle want held outside the market after the cycle.
    pub idle_want: u128,
    /// `deposits + idle - borrows`, the ledger's valuation of the strategy.
    pub total_assets: u128,
    pub state: ControllerState,
    pub path: super::market::ExecutionPath,
    /// Supply/borrow/repay/withdraw rounds actually executed.
    pub iterations: u8,
    /// Individual market operations issued.
    pub ops_issued: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_collat_ratio() {
        let pos = Position {
            deposits: 4_000_000,
            borrows: 3_000_000,
        };
        assert_eq!(pos.collat_ratio(), Ray::from_decimal(dec!(0.75)));
        assert_eq!(pos.net(), 1_000_000);
    }

    #[test]
    fn test_empty_position_ratio_is_zero() {
        assert_eq!(Position::default().collat_ratio(), Ray::ZERO);
    }

    #[test]
    fn test_borrows_above_deposits_allowed() {
        // the ratio is bounded, not the absolute difference
        let pos = Position {
            deposits: 100,
            borrows: 150,
        };
        assert_eq!(pos.collat_ratio(), Ray::from_decimal(dec!(1.5)));
        assert_eq!(pos.net(), 0);
    }
}
