//! Live WebSocket `DataHandler` variant (§4.2 "Live variant").
//!
//! The reconnect loop is grounded on the pack's own `tokio-tungstenite`
//! feeds — specifically `cooprefr-bettersys`'s
//! `scrapers::binance_book_ticker::BinanceBookTickerFeed::run_loop`'s
//! doubling-backoff shape — retuned to this engine's exact policy (1s
//! initial, ×2, 30s cap, 5 attempts). Order-book reconstruction from
//! incremental deltas keeps plain owned `BTreeMap`s rather than atomics:
//! this handler has exactly one writer (the background feed task) and
//! exactly one reader (the driver loop via `try_recv`).
//!
//! Frames follow the exchange-standard `depthUpdate`/`trade` schema (§6),
//! grounded on `brbtavares-tucano`'s `binance_websocket_basic_integration`
//! example (its `BinanceMessage` enum and `de_str` string-or-number helper).

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use super::file::FileDataHandler;
use super::{DataHandler, Effect};
use crate::config::WebsocketConfig;
use crate::event_bus::EventBus;
use crate::strategy::MarketView;
use crate::types::{Bar, DataSourceStatus, Event, OrderBook, OrderBookLevel, Side, Symbol, Trade};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug)]
enum LiveMessage {
    Trade(Trade),
    BookDelta {
        symbol: Symbol,
        timestamp_ms: i64,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    },
    StatusChanged(DataSourceStatus),
    Closed,
}

/// Running per-symbol book built up from incremental deltas.
#[derive(Default)]
struct LiveBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl LiveBook {
    fn apply(&mut self, side: Side, price: Decimal, quantity: Decimal) {
        let side_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if quantity.is_zero() {
            side_map.remove(&price);
        } else {
            side_map.insert(price, quantity);
        }
    }

    fn snapshot(&self, symbol: &str, timestamp_ms: i64) -> OrderBook {
        OrderBook {
            symbol: symbol.to_string(),
            timestamp_ms,
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(price, quantity)| OrderBookLevel {
                    price: *price,
                    quantity: *quantity,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(price, quantity)| OrderBookLevel {
                    price: *price,
                    quantity: *quantity,
                })
                .collect(),
        }
    }
}

pub struct LiveDataHandler {
    rx: UnboundedReceiver<LiveMessage>,
    status: DataSourceStatus,
    symbols: Vec<Symbol>,
    books: HashMap<Symbol, LiveBook>,
    latest_book: HashMap<Symbol, OrderBook>,
    latest_bar: HashMap<Symbol, Bar>,
    bar_history: HashMap<Symbol, Vec<Bar>>,
    last_published_ts: i64,
    /// Historical archive to hand off to once reconnect attempts are exhausted.
    fallback: Option<FileDataHandler>,
    channel_closed: bool,
}

impl LiveDataHandler {
    /// Spawn the background reconnect-and-stream task and return a handle.
    /// Must be called from within a running Tokio runtime.
    pub fn connect(
        config: &WebsocketConfig,
        symbols: Vec<Symbol>,
        fallback: Option<FileDataHandler>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = format!("wss://{}:{}{}", config.host, config.port, config.target);
        tokio::spawn(run_reconnect_loop(url, symbols.clone(), tx));

        Self {
            rx,
            status: DataSourceStatus::Connected,
            symbols,
            books: HashMap::new(),
            latest_book: HashMap::new(),
            latest_bar: HashMap::new(),
            bar_history: HashMap::new(),
            last_published_ts: i64::MIN,
            fallback,
            channel_closed: false,
        }
    }

    pub fn status(&self) -> DataSourceStatus {
        self.status
    }

    fn handle_message(&mut self, msg: LiveMessage, bus: &mut EventBus) -> Effect {
        match msg {
            LiveMessage::StatusChanged(status) => {
                self.status = status;
                if status == DataSourceStatus::FallbackActive {
                    info!("reconnect attempts exhausted; switching to historical fallback");
                }
                match bus.publish(Event::DataSourceStatus(status)) {
                    Ok(()) => Effect::Produced,
                    Err(e) => Effect::Stalled(e.to_string()),
                }
            }
            LiveMessage::Trade(trade) => {
                if trade.timestamp_ms < self.last_published_ts {
                    warn!(ts = trade.timestamp_ms, "clock skew: dropping out-of-order trade");
                    return Effect::Stalled("clock skew: dropped trade".into());
                }
                self.last_published_ts = trade.timestamp_ms;

                let bar = Bar {
                    symbol: trade.symbol.clone(),
                    timestamp_ms: trade.timestamp_ms,
                    open: trade.price,
                    high: trade.price,
                    low: trade.price,
                    close: trade.price,
                    volume: trade.quantity,
                };
                self.bar_history
                    .entry(trade.symbol.clone())
                    .or_default()
                    .push(bar.clone());
                self.latest_bar.insert(trade.symbol.clone(), bar.clone());

                if let Err(e) = bus.publish(Event::Trade(trade)) {
                    return Effect::Stalled(e.to_string());
                }
                // Every trade also produces a (degenerate, single-price) Bar
                // onto the bus, so bar-driven strategies see the same stream
                // as the pull-based MarketView cache (§2, §4.2).
                match bus.publish(Event::Market(bar)) {
                    Ok(()) => Effect::Produced,
                    Err(e) => Effect::Stalled(e.to_string()),
                }
            }
            LiveMessage::BookDelta {
                symbol,
                timestamp_ms,
                side,
                price,
                quantity,
            } => {
                let book_state = self.books.entry(symbol.clone()).or_default();
                book_state.apply(side, price, quantity);
                let snapshot = book_state.snapshot(&symbol, timestamp_ms);

                // Snapshot invariants must always hold on publish (§3); a
                // transiently crossed book from out-of-order deltas is
                // dropped rather than forwarded broken.
                if snapshot.validate().is_err() {
                    warn!(symbol = %symbol, "reconstructed book failed validation; dropping update");
                    return Effect::Stalled("invalid reconstructed book".into());
                }
                if timestamp_ms < self.last_published_ts {
                    warn!(ts = timestamp_ms, "clock skew: dropping out-of-order book delta");
                    return Effect::Stalled("clock skew: dropped book delta".into());
                }
                self.last_published_ts = timestamp_ms;
                self.latest_book.insert(symbol.clone(), snapshot.clone());

                match bus.publish(Event::Book(snapshot)) {
                    Ok(()) => Effect::Produced,
                    Err(e) => Effect::Stalled(e.to_string()),
                }
            }
            LiveMessage::Closed => {
                self.channel_closed = true;
                Effect::Exhausted
            }
        }
    }
}

impl DataHandler for LiveDataHandler {
    fn update(&mut self, bus: &mut EventBus) -> Effect {
        match self.rx.try_recv() {
            Ok(msg) => self.handle_message(msg, bus),
            Err(TryRecvError::Empty) => {
                if self.status == DataSourceStatus::FallbackActive {
                    if let Some(fallback) = &mut self.fallback {
                        return fallback.update(bus);
                    }
                }
                Effect::Stalled("no live message available this tick".into())
            }
            Err(TryRecvError::Disconnected) => {
                self.channel_closed = true;
                Effect::Exhausted
            }
        }
    }

    fn is_finished(&self) -> bool {
        if !self.channel_closed {
            return false;
        }
        match &self.fallback {
            Some(fb) => fb.is_finished(),
            None => true,
        }
    }

    fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl MarketView for LiveDataHandler {
    fn latest_bar(&self, symbol: &str) -> Option<Bar> {
        self.latest_bar
            .get(symbol)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|fb| fb.latest_bar(symbol)))
    }

    fn latest_book(&self, symbol: &str) -> Option<OrderBook> {
        self.latest_book
            .get(symbol)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|fb| fb.latest_book(symbol)))
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

/// Reconnect-and-stream loop: exponential backoff starting at 1s, doubling,
/// capped at 30s, for at most 5 attempts, then `FALLBACK_ACTIVE` (§4.2).
async fn run_reconnect_loop(url: String, symbols: Vec<Symbol>, tx: UnboundedSender<LiveMessage>) {
    let mut attempt = 0u32;
    let mut delay = INITIAL_BACKOFF;

    loop {
        match connect_and_stream(&url, &symbols, &tx).await {
            Ok(()) => {
                // Clean close from the remote: reset the backoff window and retry.
                attempt = 0;
                delay = INITIAL_BACKOFF;
            }
            Err(err) => {
                attempt += 1;
                warn!(attempt, %err, "live feed connection failed");
                let _ = tx.send(LiveMessage::StatusChanged(DataSourceStatus::Reconnecting));

                if attempt >= MAX_RECONNECT_ATTEMPTS {
                    error!("reconnect attempts exhausted, falling back to historical archive");
                    let _ = tx.send(LiveMessage::StatusChanged(DataSourceStatus::FallbackActive));
                    let _ = tx.send(LiveMessage::Closed);
                    return;
                }

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn connect_and_stream(
    url: &str,
    symbols: &[Symbol],
    tx: &UnboundedSender<LiveMessage>,
) -> anyhow::Result<()> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let _ = tx.send(LiveMessage::StatusChanged(DataSourceStatus::Connected));
    let (mut write, mut read) = ws_stream.split();

    let subscribe = serde_json::json!({ "subscribe": symbols });
    write.send(Message::Text(subscribe.to_string())).await.ok();

    while let Some(msg) = read.next().await {
        let msg = msg?;
        match msg {
            Message::Text(text) => {
                for live_msg in parse_live_frame(&text) {
                    if tx.send(live_msg).is_err() {
                        return Ok(());
                    }
                }
            }
            Message::Ping(payload) => {
                write.send(Message::Pong(payload)).await.ok();
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Exchange-standard frames this handler understands (§6): a `depthUpdate`
/// carries a batch of `[price, qty]` string pairs per side; a `trade` carries
/// one fill. Fields outside these two kinds (e.g. Binance's `aggTrade`,
/// subscription acks) are rejected by the untagged match and ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum ExchangeFrame {
    #[serde(rename = "depthUpdate")]
    DepthUpdate {
        s: String,
        #[serde(rename = "E")]
        event_time_ms: i64,
        b: Vec<(String, String)>,
        a: Vec<(String, String)>,
    },
    #[serde(rename = "trade")]
    Trade {
        s: String,
        #[serde(rename = "T")]
        trade_time_ms: i64,
        #[serde(deserialize_with = "de_str")]
        p: Decimal,
        #[serde(deserialize_with = "de_str")]
        q: Decimal,
        m: bool,
    },
}

/// Deserialize a numeric field that arrives as a JSON string (§6: "numeric
/// fields may arrive as strings").
fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = Deserialize::deserialize(deserializer)?;
    raw.parse::<T>().map_err(de::Error::custom)
}

/// Parses one frame into zero or more `LiveMessage`s. A `depthUpdate`
/// expands into one `BookDelta` per book level; a malformed or unrecognized
/// frame yields no messages rather than erroring the feed.
fn parse_live_frame(text: &str) -> Vec<LiveMessage> {
    let Ok(frame) = serde_json::from_str::<ExchangeFrame>(text) else {
        return Vec::new();
    };

    match frame {
        ExchangeFrame::Trade { s, trade_time_ms, p, q, m } => {
            // `m`: is the buyer the market maker? True means the resting
            // order was a buy, so the taker crossing the spread sold.
            let side = if m { Side::Sell } else { Side::Buy };
            vec![LiveMessage::Trade(Trade {
                symbol: s,
                timestamp_ms: trade_time_ms,
                price: p,
                quantity: q,
                side,
            })]
        }
        ExchangeFrame::DepthUpdate { s, event_time_ms, b, a } => {
            let mut messages = Vec::with_capacity(b.len() + a.len());
            for (side, levels) in [(Side::Buy, b), (Side::Sell, a)] {
                for (price, qty) in levels {
                    let (Ok(price), Ok(quantity)) = (price.parse(), qty.parse()) else {
                        continue;
                    };
                    messages.push(LiveMessage::BookDelta {
                        symbol: s.clone(),
                        timestamp_ms: event_time_ms,
                        side,
                        price,
                        quantity,
                    });
                }
            }
            messages
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn live_book_rebuilds_sorted_snapshot_from_deltas() {
        let mut book = LiveBook::default();
        book.apply(Side::Buy, dec!(99), dec!(1));
        book.apply(Side::Buy, dec!(98), dec!(2));
        book.apply(Side::Sell, dec!(101), dec!(1));

        let snap = book.snapshot("BTCUSD", 1000);
        assert_eq!(snap.bids[0].price, dec!(99));
        assert_eq!(snap.bids[1].price, dec!(98));
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn live_book_delete_on_zero_quantity() {
        let mut book = LiveBook::default();
        book.apply(Side::Buy, dec!(99), dec!(1));
        book.apply(Side::Buy, dec!(99), dec!(0));
        assert!(book.bids.is_empty());
    }

    #[test]
    fn parses_trade_frame_with_stringified_numerics() {
        let frame = r#"{"e":"trade","s":"BTCUSD","T":1700000000000,"p":"100.5","q":"2","m":false}"#;
        let messages = parse_live_frame(frame);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], LiveMessage::Trade(t) if t.side == Side::Buy && t.price == dec!(100.5)));
    }

    #[test]
    fn buyer_maker_trade_is_a_taker_sell() {
        let frame = r#"{"e":"trade","s":"BTCUSD","T":1700000000000,"p":"100.5","q":"2","m":true}"#;
        let messages = parse_live_frame(frame);
        assert!(matches!(&messages[0], LiveMessage::Trade(t) if t.side == Side::Sell));
    }

    #[test]
    fn depth_update_expands_into_one_delta_per_level() {
        let frame = r#"{"e":"depthUpdate","s":"BTCUSD","E":1700000000000,
            "b":[["99","1"],["98","2"]],"a":[["101","1"]]}"#;
        let messages = parse_live_frame(frame);
        assert_eq!(messages.len(), 3);
        let asks: Vec<_> = messages
            .iter()
            .filter(|m| matches!(m, LiveMessage::BookDelta { side: Side::Sell, .. }))
            .collect();
        assert_eq!(asks.len(), 1);
    }

    #[test]
    fn unrecognized_frame_kind_is_ignored() {
        let frame = r#"{"e":"aggTrade","s":"BTCUSD"}"#;
        assert!(parse_live_frame(frame).is_empty());
    }
}
