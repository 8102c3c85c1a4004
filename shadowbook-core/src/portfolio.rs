//! The cash/position/equity ledger (§4.3).
//!
//! Average-cost accounting, generalized from `bog-core::core::types::Position
//! ::process_fill_fixed_with_fee`'s weighted-average-entry-price-on-add /
//! PnL-on-close math. The atomics and cache-line alignment that method uses
//! to support lock-free concurrent updates from a single-asset market-making
//! hot path are dropped: this engine's single-threaded reference model has
//! exactly one writer (the main loop), so the ledger is a plain
//! `HashMap<Symbol, Position>` behind `&mut self`.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::types::{
    Bar, ClosedTrade, Fill, MarketState, OrderBook, Position, Side, Symbol, TimestampMs, Trade,
};

/// Positions closer to zero than this are treated as flat and removed from
/// the holdings map (§3, §8 invariant).
pub const POSITION_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 7);

/// One sample of the equity curve.
#[derive(Debug, Clone, PartialEq)]
pub struct EquitySample {
    pub timestamp_ms: TimestampMs,
    pub equity: Decimal,
    pub market_state: Option<MarketState>,
}

/// The stateful cash/position/equity ledger.
pub struct Portfolio {
    initial_capital: Decimal,
    cash: Decimal,
    holdings: HashMap<Symbol, Position>,
    last_price: HashMap<Symbol, Decimal>,
    equity_curve: Vec<EquitySample>,
    trade_log: Vec<ClosedTrade>,
    peak_equity: Decimal,
    max_drawdown: f64,
    pending_market_state: Option<MarketState>,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            holdings: HashMap::new(),
            last_price: HashMap::new(),
            equity_curve: Vec::new(),
            trade_log: Vec::new(),
            peak_equity: initial_capital,
            max_drawdown: 0.0,
            pending_market_state: None,
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.holdings.get(symbol)
    }

    pub fn current_positions(&self) -> &HashMap<Symbol, Position> {
        &self.holdings
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    pub fn trade_log(&self) -> &[ClosedTrade] {
        &self.trade_log
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// `total_equity = cash + Σ market_value` (§3 invariant).
    pub fn total_equity(&self) -> Decimal {
        self.cash
            + self
                .holdings
                .values()
                .map(|p| p.market_value)
                .sum::<Decimal>()
    }

    pub fn real_time_pnl(&self) -> Decimal {
        self.total_equity() - self.initial_capital
    }

    fn last_price_for(&self, symbol: &str) -> Option<Decimal> {
        self.last_price.get(symbol).copied()
    }

    /// Apply a fill: update cash and the holdings ledger for `fill.symbol`
    /// (§4.3 Fill accounting). A zero-quantity fill is a documented no-op
    /// (§8 idempotence).
    pub fn on_fill(&mut self, fill: &Fill) {
        if fill.quantity.is_zero() {
            return;
        }
        if !self.holdings.contains_key(&fill.symbol) {
            // Shorts are permitted unconditionally (Design Notes §9 open
            // question, resolved); an unknown symbol is not fatal, just logged.
            warn!(symbol = %fill.symbol, "fill references a symbol with no existing position; opening a new one");
        }

        self.cash += fill.cash_delta();

        let delta = fill.position_delta();
        let existing = self.holdings.remove(&fill.symbol);

        let new_position = match existing {
            None => Position {
                symbol: fill.symbol.clone(),
                quantity: delta,
                average_cost: fill.fill_price,
                market_value: Decimal::ZERO,
            },
            Some(pos) => self.apply_fill_to_position(pos, fill, delta),
        };

        if new_position.quantity.abs() > POSITION_EPSILON {
            self.holdings.insert(fill.symbol.clone(), new_position);
        }
        // else: fully closed, leave removed from the map (§3 invariant).

        self.last_price.insert(fill.symbol.clone(), fill.fill_price);
        self.mark_symbol(&fill.symbol);
    }

    /// Weighted-average-cost update on same-direction adds; close-out PnL
    /// (against the opposite side) when the fill reduces or flips the
    /// existing position, generalized from
    /// `core::types::Position::process_fill_fixed_with_fee`.
    fn apply_fill_to_position(&mut self, pos: Position, fill: &Fill, delta: Decimal) -> Position {
        let same_direction = (pos.quantity >= Decimal::ZERO) == (delta >= Decimal::ZERO);

        if same_direction || pos.quantity.is_zero() {
            let new_qty = pos.quantity + delta;
            let new_avg = if new_qty.is_zero() {
                pos.average_cost
            } else {
                (pos.quantity.abs() * pos.average_cost + delta.abs() * fill.fill_price)
                    / new_qty.abs()
            };
            return Position {
                symbol: pos.symbol,
                quantity: new_qty,
                average_cost: new_avg,
                market_value: pos.market_value,
            };
        }

        // Opposite direction: close out against the existing position first.
        let closing_qty = delta.abs().min(pos.quantity.abs());
        let pnl = if pos.quantity > Decimal::ZERO {
            // Long position being sold into: PnL = (exit - entry) * qty.
            (fill.fill_price - pos.average_cost) * closing_qty
        } else {
            // Short position being bought back: PnL = (entry - exit) * qty.
            (pos.average_cost - fill.fill_price) * closing_qty
        };

        self.trade_log.push(ClosedTrade {
            symbol: pos.symbol.clone(),
            direction: if pos.quantity > Decimal::ZERO {
                Side::Sell
            } else {
                Side::Buy
            },
            quantity: closing_qty,
            entry_price: pos.average_cost,
            exit_price: fill.fill_price,
            pnl,
            entry_timestamp_ms: fill.timestamp_ms,
            exit_timestamp_ms: fill.timestamp_ms,
            volatility_regime: self.pending_market_state.map(|m| m.volatility),
            trend_regime: self.pending_market_state.map(|m| m.trend),
        });
        // Note: `pnl` is realized-gain bookkeeping for the trade log only.
        // The actual cash movement was already applied via `fill.cash_delta()`
        // in `on_fill`, which already nets proceeds/cost against commission.

        let remainder = delta.abs() - closing_qty;
        let new_qty = if pos.quantity > Decimal::ZERO {
            pos.quantity - closing_qty + remainder * delta.signum()
        } else {
            pos.quantity + closing_qty + remainder * delta.signum()
        };

        let new_avg = if remainder > Decimal::ZERO {
            fill.fill_price
        } else {
            pos.average_cost
        };

        Position {
            symbol: pos.symbol,
            quantity: new_qty,
            average_cost: new_avg,
            market_value: pos.market_value,
        }
    }

    /// Mark-to-market a trade print, the highest-priority price source
    /// (§4.3 Valuation: trade price before book mid before bar close).
    pub fn on_trade(&mut self, trade: &Trade) {
        self.last_price.insert(trade.symbol.clone(), trade.price);
        self.mark_symbol(&trade.symbol);
    }

    /// Mark-to-market a bar close (§4.3 Valuation).
    pub fn on_bar(&mut self, bar: &Bar) {
        self.last_price.insert(bar.symbol.clone(), bar.close);
        self.mark_symbol(&bar.symbol);
    }

    /// Mark-to-market a book update using the mid price.
    pub fn on_book(&mut self, book: &OrderBook) {
        if let Some(mid) = book.mid() {
            self.last_price.insert(book.symbol.clone(), mid);
        }
        self.mark_symbol(&book.symbol);
    }

    pub fn on_regime_changed(&mut self, state: MarketState) {
        self.pending_market_state = Some(state);
    }

    fn mark_symbol(&mut self, symbol: &str) {
        let Some(price) = self.last_price_for(symbol) else {
            return;
        };
        if let Some(pos) = self.holdings.get_mut(symbol) {
            pos.market_value = pos.quantity * price;
        }
    }

    /// Append an equity-curve sample and refresh peak/drawdown (§4.3,
    /// idempotent per §8: calling twice without an intervening fill/mark
    /// appends one more identical sample, not a duplicate-detecting no-op).
    pub fn update_time_index(&mut self, timestamp_ms: TimestampMs) {
        let equity = self.total_equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        let drawdown = if self.peak_equity.is_zero() {
            0.0
        } else {
            ((self.peak_equity - equity) / self.peak_equity)
                .max(Decimal::ZERO)
                .to_f64()
                .unwrap_or(0.0)
        };
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }

        self.equity_curve.push(EquitySample {
            timestamp_ms,
            equity,
            market_state: self.pending_market_state,
        });
    }
}
