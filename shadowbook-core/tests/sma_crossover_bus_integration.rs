//! Drives `SmaCrossoverStrategy` through `FileDataHandler` and `Engine::run`
//! end to end, via the real event bus rather than direct `on_event` calls
//! (§2, §4.4): the strategy only reacts to `Event::Market`, so this confirms
//! a trade-only CSV stream actually produces bars on the bus.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use rust_decimal_macros::dec;

use shadowbook_core::config::{ExecutionConfig, RiskConfig};
use shadowbook_core::data_handler::FileDataHandler;
use shadowbook_core::engine::Engine;
use shadowbook_core::execution::ExecutionHandler;
use shadowbook_core::portfolio::Portfolio;
use shadowbook_core::strategy::Strategy;
use shadowbook_strategies::SmaCrossoverStrategy;

fn write_trade_csv(dir: &tempfile::TempDir, name: &str, closes: &[(i64, &str)]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    writeln!(f, "datetime,trade_id,price,qty,timestamp_ms,is_buyer_maker").unwrap();
    for (i, (ts, price)) in closes.iter().enumerate() {
        writeln!(f, "t,{i},{price},1,{ts},false").unwrap();
    }
    path
}

/// One deep snapshot well before the first trade tick, so every signal the
/// strategy emits during the run has a book to fill against.
fn write_book_csv(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    writeln!(f, "timestamp_s,side,price,quantity").unwrap();
    writeln!(f, "0.5,BID,99,10000").unwrap();
    writeln!(f, "0.5,ASK,101,10000").unwrap();
    path
}

fn risk_config() -> RiskConfig {
    RiskConfig {
        risk_per_trade_pct: 0.01,
        max_drawdown_pct: 0.5,
        portfolio_loss_threshold_pct: 0.5,
        use_volatility_sizing: false,
        volatility_lookback: 20,
    }
}

#[test]
fn sma_crossover_fires_off_the_bus_from_a_trade_only_csv() {
    let dir = tempfile::tempdir().unwrap();
    // A flat run, then a sharp climb: enough ticks to warm both SMA windows
    // and then force an upward crossover (§4.4).
    let closes: Vec<(i64, &str)> = vec![
        (1000, "100"),
        (2000, "100"),
        (3000, "100"),
        (4000, "110"),
        (5000, "120"),
        (6000, "130"),
    ];
    let trade_path = write_trade_csv(&dir, "trades.csv", &closes);
    let book_path = write_book_csv(&dir, "book.csv");

    let mut trade_paths = HashMap::new();
    trade_paths.insert("BTCUSD".to_string(), trade_path);
    let mut book_paths = HashMap::new();
    book_paths.insert("BTCUSD".to_string(), book_path);
    let handler = FileDataHandler::new(&trade_paths, &book_paths).unwrap();

    let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(SmaCrossoverStrategy::new(
        "sma", "BTCUSD", 2, 3,
    ))];

    let engine = Engine::new(
        Box::new(handler),
        strategies,
        Portfolio::new(dec!(100000)),
        risk_config(),
        ExecutionHandler::new(ExecutionConfig::default()),
        252.0,
    );

    let summary = engine.run();

    // The crossover buy signal should have been sized and filled against the
    // book, spending cash — none of which can happen unless FileDataHandler
    // actually put an `Event::Market` bar on the bus for the strategy to
    // react to (it never sees `Event::Trade`/`Event::Book` directly).
    let final_cash = summary.equity_curve.last().unwrap().equity;
    assert!(
        final_cash < dec!(100000),
        "expected the crossover buy to have spent cash, got equity {final_cash}"
    );
}
