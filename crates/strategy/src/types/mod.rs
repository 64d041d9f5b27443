pub mod market;
pub mod position;
pub mod ray;

pub use market::{ExecutionPath, MarketState, ReserveConfig, RewardRates};
pub use position::{CollateralTargets, ControllerState, CycleReport, Position};
pub use ray::Ray;
