//! Shared CLI parsing and bootstrap code for both driver binaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use shadowbook_core::config::{Config, StrategyInstanceConfig};
use shadowbook_core::data_handler::FileDataHandler;
use shadowbook_core::errors::{ConfigError, DataHandlerError};
use shadowbook_core::strategy::Strategy;
use shadowbook_strategies::{OrderBookImbalanceStrategy, PairsTradingStrategy, SmaCrossoverStrategy};

/// CLI arguments shared by `shadowbook-backtest` and `shadowbook-shadow`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Path to the TOML configuration file.
    #[arg(long)]
    pub config: PathBuf,

    /// Log level, used only when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit one JSON object per log line instead of human-readable text.
    #[arg(long)]
    pub json_logs: bool,
}

/// Load and validate the configuration, overriding `log_level`/`json_logs`
/// from the CLI when the operator passed them explicitly (the config file's
/// own defaults otherwise stand).
pub fn load_config(args: &CommonArgs) -> Result<Config, ConfigError> {
    let mut config = Config::load(&args.config)?;
    config.log_level = args.log_level.clone();
    config.json_logs = config.json_logs || args.json_logs;
    Ok(config)
}

/// Build the file-backed `DataHandler` from `data`'s per-symbol CSV
/// directories, one `<symbol>.csv` per symbol under each of
/// `trade_data_dir`/`book_data_dir` (§6).
pub fn build_file_data_handler(
    symbols: &[String],
    data: &shadowbook_core::config::DataConfig,
) -> Result<FileDataHandler, DataHandlerError> {
    let trade_paths = discover_per_symbol_csvs(&data.trade_data_dir, symbols);
    let book_paths = discover_per_symbol_csvs(&data.book_data_dir, symbols);
    FileDataHandler::new(&trade_paths, &book_paths)
}

fn discover_per_symbol_csvs(dir: &str, symbols: &[String]) -> HashMap<String, PathBuf> {
    let mut paths = HashMap::new();
    for symbol in symbols {
        let path = Path::new(dir).join(format!("{symbol}.csv"));
        if path.exists() {
            paths.insert(symbol.clone(), path);
        }
    }
    paths
}

/// Construct the configured, `active` strategy set. Each instance's `params`
/// is dispatched by `name` to the matching constructor (§4.4); an unknown
/// strategy name or malformed params is a configuration error, not a panic.
pub fn build_strategies(configs: &[StrategyInstanceConfig]) -> Result<Vec<Box<dyn Strategy>>> {
    configs
        .iter()
        .filter(|c| c.active)
        .map(build_one_strategy)
        .collect()
}

fn build_one_strategy(cfg: &StrategyInstanceConfig) -> Result<Box<dyn Strategy>> {
    match cfg.name.as_str() {
        "order_book_imbalance" => {
            let lookback_levels = param_usize(cfg, "lookback_levels")?;
            let imbalance_threshold = param_f64(cfg, "imbalance_threshold")?;
            Ok(Box::new(OrderBookImbalanceStrategy::new(
                cfg.name.clone(),
                cfg.symbol.clone(),
                lookback_levels,
                imbalance_threshold,
            )))
        }
        "pairs_trading" => {
            let symbol_b = param_str(cfg, "symbol_b")?;
            let window = param_usize(cfg, "window")?;
            let z_score_threshold = param_f64(cfg, "z_score_threshold")?;
            Ok(Box::new(PairsTradingStrategy::new(
                cfg.name.clone(),
                cfg.symbol.clone(),
                symbol_b,
                window,
                z_score_threshold,
            )))
        }
        "sma_crossover" => {
            let short_window = param_usize(cfg, "short_window")?;
            let long_window = param_usize(cfg, "long_window")?;
            Ok(Box::new(SmaCrossoverStrategy::new(
                cfg.name.clone(),
                cfg.symbol.clone(),
                short_window,
                long_window,
            )))
        }
        other => anyhow::bail!("unknown strategy '{other}' in config"),
    }
}

fn param_usize(cfg: &StrategyInstanceConfig, key: &str) -> Result<usize> {
    cfg.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .with_context(|| format!("strategy '{}': missing or non-integer param '{key}'", cfg.name))
}

fn param_f64(cfg: &StrategyInstanceConfig, key: &str) -> Result<f64> {
    cfg.params
        .get(key)
        .and_then(|v| v.as_f64())
        .with_context(|| format!("strategy '{}': missing or non-numeric param '{key}'", cfg.name))
}

fn param_str(cfg: &StrategyInstanceConfig, key: &str) -> Result<String> {
    cfg.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .with_context(|| format!("strategy '{}': missing or non-string param '{key}'", cfg.name))
}

/// Write the equity-curve CSV (§6): `timestamp_ms, equity`.
pub fn write_equity_curve_csv(path: &Path, equity_curve: &[shadowbook_core::portfolio::EquitySample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating equity curve CSV at {}", path.display()))?;
    writer.write_record(["timestamp_ms", "equity"])?;
    for (timestamp_ms, equity) in shadowbook_core::performance::equity_curve_rows(equity_curve) {
        writer.write_record([timestamp_ms.to_string(), equity.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the trade-log CSV (§6): `symbol, direction, quantity, entry_price,
/// exit_price, pnl, entry_timestamp, exit_timestamp, volatility_regime, trend_regime`.
pub fn write_trade_log_csv(path: &Path, trade_log: &[shadowbook_core::types::ClosedTrade]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating trade log CSV at {}", path.display()))?;
    writer.write_record([
        "symbol",
        "direction",
        "quantity",
        "entry_price",
        "exit_price",
        "pnl",
        "entry_timestamp",
        "exit_timestamp",
        "volatility_regime",
        "trend_regime",
    ])?;
    for trade in trade_log {
        writer.write_record([
            trade.symbol.clone(),
            format!("{:?}", trade.direction),
            trade.quantity.to_string(),
            trade.entry_price.to_string(),
            trade.exit_price.to_string(),
            trade.pnl.to_string(),
            trade.entry_timestamp_ms.to_string(),
            trade.exit_timestamp_ms.to_string(),
            trade
                .volatility_regime
                .map(|r| format!("{r:?}"))
                .unwrap_or_default(),
            trade.trend_regime.map(|r| format!("{r:?}")).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Print a short human-readable summary of a completed run.
pub fn print_summary(summary: &shadowbook_core::engine::RunSummary) {
    tracing::info!("=== Run Summary ===");
    tracing::info!("trades closed: {}", summary.trade_log.len());
    tracing::info!("total return: {:.4}", summary.performance.total_return);
    tracing::info!("max drawdown: {:.4}", summary.performance.max_drawdown);
    tracing::info!("sharpe ratio: {:.4}", summary.performance.sharpe_ratio);
    tracing::info!("value at risk (95%): {:.4}", summary.performance.value_at_risk);
    tracing::info!(
        "win rate: {:.2}%, profit factor: {:.4}",
        summary.performance.win_rate * 100.0,
        summary.performance.profit_factor
    );
}
