pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load config JSON files into a single [`EngineConfig`], apply environment
/// variable overrides, and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   strategy.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                     | Config Field                          |
/// |-----------------------------|---------------------------------------|
/// | `STRATEGY_AUTO_TARGETING`   | `strategy.automatic_targeting`        |
/// | `STRATEGY_FLASH_ACTIVE`     | `strategy.flash_active`               |
/// | `STRATEGY_MAX_ITERATIONS`   | `strategy.max_iterations`             |
/// | `STRATEGY_MIN_WANT`         | `strategy.min_want`                   |
/// | `STRATEGY_REWARD_DISCOUNT`  | `strategy.reward_discount`            |
/// | `STRATEGY_LOG_DIR`          | `app.logging.log_dir`                 |
pub fn load_config(config_dir: &Path) -> Result<EngineConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let strategy: StrategyConfig =
        serde_json::from_str(&read("strategy.json")?).context("parsing strategy.json")?;

    let mut config = EngineConfig { app, strategy };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are logged and
/// skipped (the JSON value remains).
fn apply_env_overrides(config: &mut EngineConfig) {
    if let Some(val) = env_bool("STRATEGY_AUTO_TARGETING") {
        info!(val, "env override: STRATEGY_AUTO_TARGETING");
        config.strategy.automatic_targeting = val;
    }

    if let Some(val) = env_bool("STRATEGY_FLASH_ACTIVE") {
        info!(val, "env override: STRATEGY_FLASH_ACTIVE");
        config.strategy.flash_active = val;
    }

    if let Some(val) = env_parse::<u8>("STRATEGY_MAX_ITERATIONS") {
        info!(val, "env override: STRATEGY_MAX_ITERATIONS");
        config.strategy.max_iterations = val;
    }

    if let Some(val) = env_parse::<u64>("STRATEGY_MIN_WANT") {
        info!(val, "env override: STRATEGY_MIN_WANT");
        config.strategy.min_want = val;
    }

    if let Some(val) = env_decimal("STRATEGY_REWARD_DISCOUNT") {
        info!(%val, "env override: STRATEGY_REWARD_DISCOUNT");
        config.strategy.reward_discount = val;
    }

    if let Some(val) = env_string("STRATEGY_LOG_DIR") {
        info!("env override: STRATEGY_LOG_DIR");
        config.app.logging.log_dir = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serial_test::serial;

    fn write_test_configs(dir: &Path) {
        std::fs::write(
            dir.join("app.json"),
            r#"{ "logging": { "log_dir": "logs" } }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("strategy.json"),
            r#"{
                "want_decimals": 6,
                "automatic_targeting": true,
                "flash_active": false,
                "flash_fee_bps": 0,
                "bridge_ltv": "0.77",
                "reward_discount": "0.9",
                "pinned_target_collat_ratio": "0.75",
                "max_iterations": 6,
                "min_ratio": "0.005",
                "min_want": 100
            }"#,
        )
        .unwrap();
    }

    /// Remove all strategy env vars so tests don't interfere.
    fn clean_env() {
        for key in [
            "STRATEGY_AUTO_TARGETING",
            "STRATEGY_FLASH_ACTIVE",
            "STRATEGY_MAX_ITERATIONS",
            "STRATEGY_MIN_WANT",
            "STRATEGY_REWARD_DISCOUNT",
            "STRATEGY_LOG_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_load_test_configs() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        let config = load_config(tmp.path()).expect("test config should load");
        assert_eq!(config.strategy.want_decimals, 6);
        assert!(config.strategy.automatic_targeting);
        assert_eq!(
            config.strategy.pinned_target_collat_ratio,
            Some(dec!(0.75))
        );
        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_config_file_errors() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(
            err.to_string().contains("failed to read config file"),
            "expected file-not-found error, got: {err}"
        );
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_auto_targeting() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_AUTO_TARGETING", "false");
        let config = load_config(tmp.path()).unwrap();
        assert!(!config.strategy.automatic_targeting);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_max_iterations() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_MAX_ITERATIONS", "3");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.strategy.max_iterations, 3);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_string_ignored() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_MIN_WANT", "");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.strategy.min_want, 100);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_parse_ignored() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_MAX_ITERATIONS", "not_a_number");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.strategy.max_iterations, 6);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_override_that_invalidates_config_is_rejected() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_MAX_ITERATIONS", "0");
        let err = load_config(tmp.path()).unwrap_err();
        assert!(
            err.to_string().contains("max_iterations"),
            "expected validation error, got: {err}"
        );
        clean_env();
    }
}
