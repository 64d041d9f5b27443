use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level merged configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub strategy: StrategyConfig,
}

/// Application-wide settings (`app.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
}

/// Strategy behaviour (`strategy.json`).
///
/// Fractions are decimal strings at JSON level and converted to RAY at the
/// strategy boundary, so config files never carry 27-digit integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Native decimals of the want asset.
    pub want_decimals: u8,
    /// Let the optimizer pick the target ratio each cycle; when false the
    /// pinned target (or the bounds-derived default) is used.
    pub automatic_targeting: bool,
    /// Attempt the atomic flash-bridge path before iterating.
    pub flash_active: bool,
    /// Fee charged by the flash-bridge provider, in basis points.
    pub flash_fee_bps: u32,
    /// LTV of the flash-bridge asset on the market.
    #[serde(with = "rust_decimal::serde::str")]
    pub bridge_ltv: Decimal,
    /// Discount applied to reward valuations for selling slippage.
    #[serde(with = "rust_decimal::serde::str")]
    pub reward_discount: Decimal,
    /// Manually pinned target collateral ratio, used when automatic
    /// targeting is off. Absent means "derive from the market bounds".
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub pinned_target_collat_ratio: Option<Decimal>,
    /// Controller rounds per cycle.
    pub max_iterations: u8,
    /// Ratio delta below which the controller declares convergence.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_ratio: Decimal,
    /// Dust threshold in native want units.
    pub min_want: u64,
}
