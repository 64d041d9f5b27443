//! Leveraged yield strategy engine for stablecoin reserve collateral.
//!
//! Deposits idle reserve assets into an external variable-rate money market,
//! optionally levers the position by borrowing against supplied collateral,
//! and rebalances toward a revenue-optimal collateral ratio each cycle.
//!
//! The crate is a library invoked by the surrounding reserve-accounting
//! system: [`strategy::Strategy`] is the exposed surface, the
//! [`market::LendingMarket`] and [`market::FlashLender`] traits are the
//! boundary to the external venue, and everything in [`core`] is a pure
//! computation over snapshots read at cycle start.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod logging;
pub mod market;
pub mod strategy;
pub mod types;

pub use config::{load_config, EngineConfig, StrategyConfig};
pub use errors::StrategyError;
pub use strategy::{Role, Strategy};
pub use types::{
    CollateralTargets, ControllerState, CycleReport, ExecutionPath, MarketState, Position, Ray,
    ReserveConfig, RewardRates,
};
