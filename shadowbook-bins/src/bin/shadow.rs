//! Live shadow-trading driver: streams a live WebSocket feed through the
//! same event pipeline as the backtest, falling back to historical replay
//! once reconnect attempts are exhausted (§4.2), and writes the same
//! equity-curve/trade-log CSVs on completion (§6).

use clap::Parser;
use shadowbook_bins::common::{
    build_file_data_handler, build_strategies, load_config, print_summary, write_equity_curve_csv,
    write_trade_log_csv, CommonArgs,
};
use shadowbook_core::data_handler::LiveDataHandler;
use shadowbook_core::engine::Engine;
use shadowbook_core::errors::{ConfigError, DataHandlerError};
use shadowbook_core::execution::ExecutionHandler;
use shadowbook_core::logging::init_logger;
use shadowbook_core::performance::ANNUALIZATION_HOURLY;
use shadowbook_core::portfolio::Portfolio;
use thiserror::Error;

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

#[tokio::main]
async fn main() {
    let args = CommonArgs::parse();
    if let Err(err) = run(args).await {
        eprintln!("shadowbook-shadow: fatal: {err:#}");
        std::process::exit(err.exit_code());
    }
}

async fn run(args: CommonArgs) -> Result<(), RunError> {
    let config = load_config(&args)?;
    init_logger(&config.log_level, config.json_logs);

    let Some(websocket) = &config.websocket else {
        return Err(RunError::Other(anyhow::anyhow!(
            "run_mode SHADOW requires a [websocket] section in config"
        )));
    };

    tracing::info!(symbols = ?config.symbols, "starting live shadow session");

    let fallback = if config.data.historical_data_fallback_dir.is_some() {
        Some(build_file_data_handler(&config.symbols, &config.data)?)
    } else {
        None
    };

    let data_handler = LiveDataHandler::connect(websocket, config.symbols.clone(), fallback);
    let strategies = build_strategies(&config.strategies).map_err(RunError::Other)?;
    let portfolio = Portfolio::new(config.initial_capital);
    let execution = ExecutionHandler::new(config.execution.clone());

    let engine = Engine::new(
        Box::new(data_handler),
        strategies,
        portfolio,
        config.risk.clone(),
        execution,
        ANNUALIZATION_HOURLY,
    );

    let shutdown = engine.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("received shutdown signal");
        shutdown.store(true, std::sync::atomic::Ordering::Release);
    }) {
        tracing::warn!("failed to install Ctrl+C handler: {e}");
    }

    // `Engine::run` drains to exhaustion synchronously via `try_recv` against
    // the channel `LiveDataHandler::connect` spawned; the background
    // reconnect task runs concurrently on the multi-threaded runtime's other
    // worker threads while this one polls.
    let summary = engine.run();

    print_summary(&summary);
    write_equity_curve_csv(std::path::Path::new("shadow_equity_curve.csv"), &summary.equity_curve)
        .map_err(RunError::Other)?;
    write_trade_log_csv(std::path::Path::new("shadow_trade_log.csv"), &summary.trade_log)
        .map_err(RunError::Other)?;

    Ok(())
}
