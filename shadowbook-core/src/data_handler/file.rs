//! File-backed `DataHandler`: loads every symbol's trade and book-depth CSV
//! up front, same load-everything-into-memory shape as
//! `original_source/src/data/HistoricCSVDataHandler.cpp`, then replays
//! through a [`ChronoMerger`] instead of the original's single-kind,
//! earliest-timestamp string comparison.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use tracing::{error, warn};

use super::merge::ChronoMerger;
use super::{DataHandler, Effect};
use crate::errors::DataHandlerError;
use crate::event_bus::EventBus;
use crate::strategy::MarketView;
use crate::types::{Bar, Event, OrderBook, OrderBookLevel, Side, Symbol, Trade};

pub struct FileDataHandler {
    merger: ChronoMerger,
    symbols: Vec<Symbol>,
    latest_bar: HashMap<Symbol, Bar>,
    bar_history: HashMap<Symbol, Vec<Bar>>,
    latest_book: HashMap<Symbol, OrderBook>,
    last_published_ts: i64,
    finished: bool,
}

impl FileDataHandler {
    /// `trade_paths`/`book_paths` map symbol to its CSV file; a symbol need
    /// not appear in both maps (§4.2 allows trade-only or book-only streams).
    pub fn new(
        trade_paths: &HashMap<Symbol, PathBuf>,
        book_paths: &HashMap<Symbol, PathBuf>,
    ) -> Result<Self, DataHandlerError> {
        let mut merger = ChronoMerger::new();
        let mut symbols: Vec<Symbol> = trade_paths
            .keys()
            .chain(book_paths.keys())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();

        for (symbol, path) in trade_paths {
            merger.add_stream(parse_trade_csv(symbol, path)?);
        }
        for (symbol, path) in book_paths {
            merger.add_stream(parse_book_csv(symbol, path)?);
        }

        Ok(Self {
            merger,
            symbols,
            latest_bar: HashMap::new(),
            bar_history: HashMap::new(),
            latest_book: HashMap::new(),
            last_published_ts: i64::MIN,
            finished: false,
        })
    }
}

impl DataHandler for FileDataHandler {
    fn update(&mut self, bus: &mut EventBus) -> Effect {
        if self.merger.is_exhausted() {
            self.finished = true;
            return Effect::Exhausted;
        }

        let Some(event) = self.merger.next_event() else {
            self.finished = true;
            return Effect::Exhausted;
        };

        let ts = event.timestamp();
        if ts < self.last_published_ts {
            warn!(
                ts,
                last_published_ts = self.last_published_ts,
                "clock skew: dropping out-of-order event"
            );
            return Effect::Stalled("clock skew: dropped out-of-order event".into());
        }
        self.last_published_ts = ts;

        let mut synthesized_bar = None;
        match &event {
            Event::Trade(t) => {
                let bar = Bar {
                    symbol: t.symbol.clone(),
                    timestamp_ms: t.timestamp_ms,
                    open: t.price,
                    high: t.price,
                    low: t.price,
                    close: t.price,
                    volume: t.quantity,
                };
                self.bar_history
                    .entry(t.symbol.clone())
                    .or_default()
                    .push(bar.clone());
                self.latest_bar.insert(t.symbol.clone(), bar.clone());
                synthesized_bar = Some(bar);
            }
            Event::Book(b) => {
                self.latest_book.insert(b.symbol.clone(), b.clone());
            }
            _ => {}
        }

        if let Err(err) = bus.publish(event) {
            error!(%err, "failed to publish event onto bus");
            return Effect::Stalled(err.to_string());
        }

        // Every trade also produces a (degenerate, single-price) Bar onto the
        // bus, so bar-driven strategies see the same stream as the pull-based
        // MarketView cache (§2, §4.2).
        if let Some(bar) = synthesized_bar {
            if let Err(err) = bus.publish(Event::Market(bar)) {
                error!(%err, "failed to publish synthesized bar onto bus");
                return Effect::Stalled(err.to_string());
            }
        }
        Effect::Produced
    }

    fn is_finished(&self) -> bool {
        self.finished || self.merger.is_exhausted()
    }

    fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl MarketView for FileDataHandler {
    fn latest_bar(&self, symbol: &str) -> Option<Bar> {
        self.latest_bar.get(symbol).cloned()
    }

    fn latest_book(&self, symbol: &str) -> Option<OrderBook> {
        self.latest_book.get(symbol).cloned()
    }

    fn latest_bars(&self, symbol: &str, n: usize) -> Vec<Bar> {
        self.bar_history
            .get(symbol)
            .map(|bars| {
                let start = bars.len().saturating_sub(n);
                bars[start..].to_vec()
            })
            .unwrap_or_default()
    }
}

/// `datetime, trade_id, price, qty, timestamp_ms, is_buyer_maker` (§6).
fn parse_trade_csv(symbol: &str, path: &Path) -> Result<Vec<Event>, DataHandlerError> {
    let file = File::open(path).map_err(|source| DataHandlerError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut events = Vec::new();
    let mut logged = false;
    for (row_idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log_once_per_file(&mut logged, path, row_idx, "trade", &e.to_string());
                continue;
            }
        };
        match parse_trade_row(symbol, &record) {
            Ok(event) => events.push(event),
            Err(reason) => log_once_per_file(&mut logged, path, row_idx, "trade", &reason),
        }
    }
    Ok(events)
}

fn parse_trade_row(symbol: &str, record: &csv::StringRecord) -> Result<Event, String> {
    if record.len() < 6 {
        return Err("expected 6 columns".into());
    }
    let price: Decimal = record[2].trim().parse().map_err(|_| "bad price".to_string())?;
    let quantity: Decimal = record[3].trim().parse().map_err(|_| "bad qty".to_string())?;
    let timestamp_ms: i64 = record[4]
        .trim()
        .parse()
        .map_err(|_| "bad timestamp_ms".to_string())?;
    let is_buyer_maker = parse_bool_literal(record[5].trim())?;

    // is_buyer_maker means the resting order was a buy; the taker that
    // crossed the spread was therefore a seller.
    let side = if is_buyer_maker { Side::Sell } else { Side::Buy };

    Ok(Event::Trade(Trade {
        symbol: symbol.to_string(),
        timestamp_ms,
        price,
        quantity,
        side,
    }))
}

fn parse_bool_literal(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("invalid bool literal '{other}'")),
    }
}

/// `timestamp_s, side∈{BID,ASK}, price, quantity`; consecutive rows sharing
/// `timestamp_s` form one snapshot (§6).
fn parse_book_csv(symbol: &str, path: &Path) -> Result<Vec<Event>, DataHandlerError> {
    let file = File::open(path).map_err(|source| DataHandlerError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut events = Vec::new();
    let mut logged = false;

    let mut current_ts: Option<f64> = None;
    let mut bids: Vec<OrderBookLevel> = Vec::new();
    let mut asks: Vec<OrderBookLevel> = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log_once_per_file(&mut logged, path, row_idx, "book", &e.to_string());
                continue;
            }
        };

        match parse_book_row(&record) {
            Ok((ts, side, price, quantity)) => {
                if let Some(prev_ts) = current_ts {
                    if prev_ts != ts {
                        events.push(finalize_snapshot(
                            symbol,
                            prev_ts,
                            std::mem::take(&mut bids),
                            std::mem::take(&mut asks),
                        ));
                    }
                }
                current_ts = Some(ts);
                let level = OrderBookLevel { price, quantity };
                match side {
                    Side::Buy => bids.push(level),
                    Side::Sell => asks.push(level),
                }
            }
            Err(reason) => log_once_per_file(&mut logged, path, row_idx, "book", &reason),
        }
    }
    if let Some(ts) = current_ts {
        events.push(finalize_snapshot(symbol, ts, bids, asks));
    }
    Ok(events)
}

fn finalize_snapshot(
    symbol: &str,
    timestamp_s: f64,
    mut bids: Vec<OrderBookLevel>,
    mut asks: Vec<OrderBookLevel>,
) -> Event {
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));
    Event::Book(OrderBook {
        symbol: symbol.to_string(),
        timestamp_ms: (timestamp_s * 1000.0).round() as i64,
        bids,
        asks,
    })
}

fn parse_book_row(record: &csv::StringRecord) -> Result<(f64, Side, Decimal, Decimal), String> {
    if record.len() < 4 {
        return Err("expected 4 columns".into());
    }
    let timestamp_s: f64 = record[0]
        .trim()
        .parse()
        .map_err(|_| "bad timestamp_s".to_string())?;
    let side = match record[1].trim().to_ascii_uppercase().as_str() {
        "BID" => Side::Buy,
        "ASK" => Side::Sell,
        other => return Err(format!("invalid side '{other}'")),
    };
    let price: Decimal = record[2].trim().parse().map_err(|_| "bad price".to_string())?;
    // empty quantity is permitted on deletions (§4.2)
    let quantity: Decimal = record[3].trim().parse().unwrap_or(Decimal::ZERO);
    Ok((timestamp_s, side, price, quantity))
}

fn log_once_per_file(logged: &mut bool, path: &Path, row: usize, kind: &str, reason: &str) {
    if !*logged {
        error!(file = %path.display(), row, kind, reason, "skipping malformed row");
        *logged = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_trade_csv_with_side_from_is_buyer_maker() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "trades.csv",
            "datetime,trade_id,price,qty,timestamp_ms,is_buyer_maker\n\
             2024-01-01T00:00:00,1,100.5,2.0,1000,true\n\
             2024-01-01T00:00:01,2,101.0,1.0,2000,false\n",
        );
        let events = parse_trade_csv("BTCUSD", &path).unwrap();
        assert_eq!(events.len(), 2);
        let Event::Trade(t0) = &events[0] else {
            panic!("expected trade")
        };
        assert_eq!(t0.side, Side::Sell);
        let Event::Trade(t1) = &events[1] else {
            panic!("expected trade")
        };
        assert_eq!(t1.side, Side::Buy);
    }

    #[test]
    fn malformed_trade_row_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "trades.csv",
            "datetime,trade_id,price,qty,timestamp_ms,is_buyer_maker\n\
             2024-01-01T00:00:00,1,notanumber,2.0,1000,true\n\
             2024-01-01T00:00:01,2,101.0,1.0,2000,false\n",
        );
        let events = parse_trade_csv("BTCUSD", &path).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn groups_consecutive_book_rows_into_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "book.csv",
            "timestamp_s,side,price,quantity\n\
             1.0,BID,99,1\n\
             1.0,BID,98,2\n\
             1.0,ASK,101,1\n\
             2.0,BID,99,1\n\
             2.0,ASK,100,1\n",
        );
        let events = parse_book_csv("BTCUSD", &path).unwrap();
        assert_eq!(events.len(), 2);
        let Event::Book(first) = &events[0] else {
            panic!("expected book")
        };
        assert_eq!(first.bids.len(), 2);
        assert_eq!(first.asks.len(), 1);
        assert_eq!(first.bids[0].price, rust_decimal_macros::dec!(99));
        assert_eq!(first.timestamp_ms, 1000);
    }

    #[test]
    fn scenario_6_merge_via_file_handler() {
        let dir = tempfile::tempdir().unwrap();
        let trade_a = write_csv(
            &dir,
            "a.csv",
            "datetime,trade_id,price,qty,timestamp_ms,is_buyer_maker\n\
             t,1,100,1,100,false\n\
             t,2,100,1,300,false\n",
        );
        let trade_b = write_csv(
            &dir,
            "b.csv",
            "datetime,trade_id,price,qty,timestamp_ms,is_buyer_maker\n\
             t,1,50,1,200,false\n\
             t,2,50,1,250,false\n",
        );

        let mut trade_paths = HashMap::new();
        trade_paths.insert("A".to_string(), trade_a);
        trade_paths.insert("B".to_string(), trade_b);

        let mut handler = FileDataHandler::new(&trade_paths, &HashMap::new()).unwrap();
        let mut bus = EventBus::new();

        let mut order = Vec::new();
        while !handler.is_finished() {
            if let Effect::Produced = handler.update(&mut bus) {
                if let Some(ev) = bus.drain_next() {
                    order.push((ev.symbol().unwrap().to_string(), ev.timestamp()));
                }
            }
        }

        assert_eq!(
            order,
            vec![
                ("A".to_string(), 100),
                ("B".to_string(), 200),
                ("B".to_string(), 250),
                ("A".to_string(), 300),
            ]
        );
    }
}
