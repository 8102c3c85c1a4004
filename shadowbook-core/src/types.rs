//! Core value types shared by every subsystem: bars, trades, book snapshots,
//! the tagged `Event` variant, signals, orders, fills, and positions.
//!
//! Monetary and quantity fields use `rust_decimal::Decimal` throughout
//! rather than raw `f64` or fixed-point integers. Ratio/statistical
//! fields (imbalance ratios, z-scores, strategy signal strength) use `f64`,
//! since they are not money and benefit from the usual float math functions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ticker symbol. A plain `String` alias keeps the data model simple; the
/// engine never interns or indexes symbols by anything richer than equality.
pub type Symbol = String;

/// Unix epoch milliseconds. Used for every timestamp in the data model so
/// ordering comparisons are a plain integer compare.
pub type TimestampMs = i64;

/// Monotonic, cheaply comparable order identifier.
///
/// Packs a millisecond timestamp (high bits) with a process-local counter
/// (low bits) into a `u128`, so ids sort chronologically by construction
/// (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(u128);

static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl OrderId {
    /// Generate a new id from the current wall-clock time and a process-local
    /// monotonic counter, guaranteeing uniqueness even for orders created
    /// within the same millisecond.
    pub fn generate() -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let counter = ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(((timestamp_ms as u128) << 64) | counter as u128)
    }

    /// Construct directly from a raw value (test fixtures, replay of logged ids).
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Order/fill/position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Signal direction. Distinct from `Side` because a signal may also say
/// "go flat" — something no single order side can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    Flat,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Volatility regime, updated by the (optional) regime detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

/// Trend regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

/// Snapshot of the prevailing market regime, attached to equity-curve samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub volatility: VolatilityRegime,
    pub trend: Trend,
    pub volatility_value: f64,
}

/// OHLCV bar for a (symbol, interval).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A single executed trade (tick data), as opposed to an engine `Fill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Aggressor side: the side of the taker that crossed the spread.
    pub side: Side,
}

/// A single price level in an order book. `quantity == 0` means "delete this level".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order-book validation failures (§3, §8 boundary behaviors).
#[derive(Debug, Clone, PartialEq)]
pub enum BookValidationError {
    Crossed { best_bid: Decimal, best_ask: Decimal },
    Empty,
}

impl fmt::Display for BookValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookValidationError::Crossed { best_bid, best_ask } => {
                write!(f, "crossed book: best_bid {best_bid} >= best_ask {best_ask}")
            }
            BookValidationError::Empty => write!(f, "book has no levels on one or both sides"),
        }
    }
}

/// A full order-book snapshot: bids sorted price-descending, asks price-ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    /// Validate the top-of-book invariant `best_bid < best_ask`. A book with
    /// no levels on either side is considered invalid (nothing to trade
    /// against); a crossed or locked book is rejected per §3/§8.
    pub fn validate(&self) -> Result<(), BookValidationError> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid < ask => Ok(()),
            (Some(bid), Some(ask)) => Err(BookValidationError::Crossed {
                best_bid: bid,
                best_ask: ask,
            }),
            _ => Err(BookValidationError::Empty),
        }
    }

    /// Sum of quantity across the top `levels` of the bid side.
    pub fn bid_volume(&self, levels: usize) -> Decimal {
        self.bids.iter().take(levels).map(|l| l.quantity).sum()
    }

    /// Sum of quantity across the top `levels` of the ask side.
    pub fn ask_volume(&self, levels: usize) -> Decimal {
        self.asks.iter().take(levels).map(|l| l.quantity).sum()
    }
}

/// Strategy-emitted trading intent. Carries no size — the `RiskManager` sizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_name: String,
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub direction: Direction,
    /// Confidence/strength in `[0, 1]`.
    pub strength: f64,
    pub stop_loss: Option<Decimal>,
}

/// A sized order ready for the `ExecutionHandler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub strategy_name: String,
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    /// Set by the `RiskManager` when accepted only because the data source
    /// is in `FALLBACK_ACTIVE` (§4.5).
    pub simulated_fallback: bool,
}

/// A completed (possibly partial) execution of an `Order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub strategy_name: String,
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub side: Side,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub commission: Decimal,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.fill_price * self.quantity
    }

    /// Signed position delta this fill applies (positive for buys).
    pub fn position_delta(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    /// Signed cash delta this fill applies (negative for buys, net of commission).
    pub fn cash_delta(&self) -> Decimal {
        let notional = self.notional();
        match self.side {
            Side::Buy => -(notional + self.commission),
            Side::Sell => notional - self.commission,
        }
    }
}

/// Why an order could not be (fully) filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderFailureReason {
    PartialFill { filled: Decimal, remaining: Decimal },
    NotFilled,
    NoLiquidity,
    InvalidOrder { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub timestamp_ms: TimestampMs,
    pub reason: OrderFailureReason,
}

/// Connectivity status of a live `DataHandler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceStatus {
    Connected,
    Disconnected,
    Reconnecting,
    FallbackActive,
}

impl fmt::Display for DataSourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSourceStatus::Connected => "CONNECTED",
            DataSourceStatus::Disconnected => "DISCONNECTED",
            DataSourceStatus::Reconnecting => "RECONNECTING",
            DataSourceStatus::FallbackActive => "FALLBACK_ACTIVE",
        };
        write!(f, "{s}")
    }
}

/// A headline-only news item (the `News` event variant; no strategy in this
/// crate consumes it today, but the bus carries it so future strategies can).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub symbol: Option<Symbol>,
    pub timestamp_ms: TimestampMs,
    pub headline: String,
}

/// The tagged event variant carried by the `EventBus`. A Rust enum, not an
/// inheritance hierarchy (Design Notes §9): the dispatcher pattern-matches on
/// kind, never downcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Market(Bar),
    Trade(Trade),
    Book(OrderBook),
    Signal(Signal),
    Order(Order),
    Fill(Fill),
    OrderFailure(OrderFailure),
    RegimeChanged(MarketState),
    DataSourceStatus(DataSourceStatus),
    News(NewsItem),
}

impl Event {
    /// Ingest timestamp; for replayed events this equals the source timestamp.
    pub fn timestamp(&self) -> TimestampMs {
        match self {
            Event::Market(b) => b.timestamp_ms,
            Event::Trade(t) => t.timestamp_ms,
            Event::Book(b) => b.timestamp_ms,
            Event::Signal(s) => s.timestamp_ms,
            Event::Order(o) => o.timestamp_ms,
            Event::Fill(f) => f.timestamp_ms,
            Event::OrderFailure(f) => f.timestamp_ms,
            // Regime/status/news events are stamped with the ingest time of
            // whatever triggered them; callers construct these with `now`.
            Event::RegimeChanged(_) => 0,
            Event::DataSourceStatus(_) => 0,
            Event::News(n) => n.timestamp_ms,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Event::Market(b) => Some(&b.symbol),
            Event::Trade(t) => Some(&t.symbol),
            Event::Book(b) => Some(&b.symbol),
            Event::Signal(s) => Some(&s.symbol),
            Event::Order(o) => Some(&o.symbol),
            Event::Fill(f) => Some(&f.symbol),
            Event::OrderFailure(f) => Some(&f.symbol),
            Event::News(n) => n.symbol.as_deref(),
            Event::RegimeChanged(_) | Event::DataSourceStatus(_) => None,
        }
    }

    /// Ordering rank used by the `DataHandler` merge tie-break (§4.2): Trade
    /// sorts before Book when timestamps and symbols are equal.
    pub(crate) fn kind_rank(&self) -> u8 {
        match self {
            Event::Trade(_) => 0,
            Event::Book(_) => 1,
            _ => 2,
        }
    }
}

/// Long/short direction of an open position, derived from its signed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionDirection {
    Long,
    Short,
}

/// A single-symbol holding in the `Portfolio`. Removed from the holdings map
/// entirely once `quantity` returns to (within epsilon of) zero — no
/// zero-quantity phantom positions (§3 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed: positive is long, negative is short.
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub market_value: Decimal,
}

impl Position {
    pub fn direction(&self) -> Option<PositionDirection> {
        if self.quantity > Decimal::ZERO {
            Some(PositionDirection::Long)
        } else if self.quantity < Decimal::ZERO {
            Some(PositionDirection::Short)
        } else {
            None
        }
    }
}

/// A closed round-trip, recorded in the portfolio's trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: Symbol,
    pub direction: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub entry_timestamp_ms: TimestampMs,
    pub exit_timestamp_ms: TimestampMs,
    pub volatility_regime: Option<VolatilityRegime>,
    pub trend_regime: Option<Trend>,
}
