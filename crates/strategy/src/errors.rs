use thiserror::Error;

/// Typed error hierarchy for the strategy engine.
///
/// Numerical edge cases (non-convergence, degenerate curve inputs) are
/// absorbed where they occur and never surface here; only external failures
/// abort a rebalancing cycle.
#[derive(Error, Debug)]
pub enum StrategyError {
    // -- Market boundary ----------------------------------------------------
    #[error("market call failed during {op}: {reason}")]
    MarketCall { op: &'static str, reason: String },

    // -- Flash bridge -------------------------------------------------------
    #[error("flash plan cannot repay principal + fee (short by {short} want units)")]
    FlashUnrepayable { short: u128 },

    #[error("flash plan rejected: {reason}")]
    FlashRejected { reason: String },

    // -- Permissions --------------------------------------------------------
    #[error("{role} is not allowed to {action}")]
    Unauthorized {
        role: &'static str,
        action: &'static str,
    },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
