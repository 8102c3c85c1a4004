//! Historical backtest driver: replays file-backed trade/book CSVs through
//! the full event pipeline and writes the equity-curve and trade-log CSVs
//! named in the external interfaces (§6).

use anyhow::Context;
use clap::Parser;
use shadowbook_bins::common::{
    build_file_data_handler, build_strategies, load_config, print_summary, write_equity_curve_csv,
    write_trade_log_csv, CommonArgs,
};
use shadowbook_core::config::RunMode;
use shadowbook_core::engine::Engine;
use shadowbook_core::errors::{ConfigError, DataHandlerError};
use shadowbook_core::execution::ExecutionHandler;
use shadowbook_core::logging::init_logger;
use shadowbook_core::performance::ANNUALIZATION_DAILY;
use shadowbook_core::portfolio::Portfolio;
use thiserror::Error;

/// Top-level failure, mapped to the exit codes named in §6: 1 for
/// configuration errors, 2 for fatal data errors.
#[derive(Debug, Error)]
enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataHandlerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunError {
    fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => 1,
            RunError::Data(_) => 2,
            RunError::Other(_) => 1,
        }
    }
}

fn main() {
    let args = CommonArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("shadowbook-backtest: fatal: {err:#}");
        std::process::exit(err.exit_code());
    }
}

fn run(args: CommonArgs) -> Result<(), RunError> {
    let config = load_config(&args)?;
    init_logger(&config.log_level, config.json_logs);

    tracing::info!(run_mode = ?config.run_mode, symbols = ?config.symbols, "starting backtest");
    if config.run_mode != RunMode::Backtest {
        tracing::warn!(
            run_mode = ?config.run_mode,
            "config requests a non-backtest run mode; running a historical replay anyway"
        );
    }

    let data_handler = build_file_data_handler(&config.symbols, &config.data)?;
    let strategies = build_strategies(&config.strategies).map_err(RunError::Other)?;
    let portfolio = Portfolio::new(config.initial_capital);
    let execution = ExecutionHandler::new(config.execution.clone());

    let engine = Engine::new(
        Box::new(data_handler),
        strategies,
        portfolio,
        config.risk.clone(),
        execution,
        ANNUALIZATION_DAILY,
    );

    let summary = engine.run();
    print_summary(&summary);

    write_equity_curve_csv(std::path::Path::new("equity_curve.csv"), &summary.equity_curve)
        .context("writing equity_curve.csv")
        .map_err(RunError::Other)?;
    write_trade_log_csv(std::path::Path::new("trade_log.csv"), &summary.trade_log)
        .context("writing trade_log.csv")
        .map_err(RunError::Other)?;

    Ok(())
}
