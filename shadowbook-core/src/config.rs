//! Declarative run configuration (§1 ambient stack, §6).
//!
//! Configuration is loaded from a TOML file with `ENGINE__`-prefixed
//! environment variable overrides, via the `config` crate — the loader
//! `bog-core::config::mod` sketched in a `TODO` comment but never wired up.
//! Cross-field validation mirrors `bog-core::config::Config::validate`.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Backtest,
    Shadow,
    Optimization,
    WalkForward,
    MonteCarlo,
}

impl RunMode {
    /// Only `Backtest` and `Shadow` are implemented by this core; the
    /// remaining peripheral drivers are accepted by the parser but rejected
    /// here (§1 out-of-scope, §6).
    pub fn check_supported(self) -> Result<(), ConfigError> {
        match self {
            RunMode::Backtest | RunMode::Shadow => Ok(()),
            other => Err(ConfigError::UnsupportedRunMode(format!("{other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub trade_data_dir: String,
    pub book_data_dir: String,
    pub historical_data_fallback_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstanceConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub risk_per_trade_pct: f64,
    pub max_drawdown_pct: f64,
    pub portfolio_loss_threshold_pct: f64,
    #[serde(default)]
    pub use_volatility_sizing: bool,
    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback: usize,
}

fn default_volatility_lookback() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConfig {
    pub host: String,
    pub port: u16,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
}

fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001, per §4.6 / Design Notes §9
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub run_mode: RunMode,
    pub symbols: Vec<String>,
    pub initial_capital: Decimal,
    pub data: DataConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyInstanceConfig>,
    pub risk: RiskConfig,
    pub websocket: Option<WebsocketConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from a TOML file, applying `ENGINE__`-prefixed environment
    /// variable overrides (double underscore separates nested fields, e.g.
    /// `ENGINE__RISK__MAX_DRAWDOWN_PCT=0.25`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let loader = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("ENGINE").separator("__"))
            .build()?;

        let cfg: Config = loader.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate cross-field invariants beyond what serde's types already
    /// enforce, mirroring `bog-core::config::Config::validate`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run_mode.check_supported()?;

        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols must not be empty".into()));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::Invalid("initial_capital must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.risk.risk_per_trade_pct) {
            return Err(ConfigError::Invalid(
                "risk.risk_per_trade_pct must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.risk.max_drawdown_pct) {
            return Err(ConfigError::Invalid(
                "risk.max_drawdown_pct must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.risk.portfolio_loss_threshold_pct) {
            return Err(ConfigError::Invalid(
                "risk.portfolio_loss_threshold_pct must be in [0, 1]".into(),
            ));
        }
        if self.execution.commission_rate < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "execution.commission_rate must not be negative".into(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level '{}', must be one of {:?}",
                self.log_level, valid_log_levels
            )));
        }

        Ok(())
    }
}
