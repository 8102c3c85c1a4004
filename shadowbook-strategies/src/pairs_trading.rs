//! Mean-reversion pairs-trading signal generator (§4.4).
//!
//! Grounded on `original_source/include/strategy/PairsTradingStrategy.h`'s
//! `ratio_history_` deque and `PositionState` enum.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use shadowbook_core::strategy::{MarketView, Strategy};
use shadowbook_core::types::{Direction, Event, Signal};

/// Ratios more than one tick stale are not treated as "fresh enough" to
/// update the ratio history (§4.4: "updated only when both sides have fresh
/// prices within one tick of each other").
const FRESHNESS_WINDOW_MS: i64 = 1;

/// Below this stddev, the z-score is considered undefined and trading on
/// this tick is skipped (§4.4).
const MIN_SIGMA: f64 = 1e-8;

/// |z| under this magnitude flattens an open pair position (§4.4).
const FLATTEN_Z: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionState {
    Flat,
    LongPair,
    ShortPair,
}

pub struct PairsTradingStrategy {
    name: String,
    symbol_a: String,
    symbol_b: String,
    window: usize,
    z_score_threshold: f64,
    latest_price_a: Option<(rust_decimal::Decimal, i64)>,
    latest_price_b: Option<(rust_decimal::Decimal, i64)>,
    ratio_history: VecDeque<f64>,
    position: PositionState,
}

impl PairsTradingStrategy {
    pub fn new(
        name: impl Into<String>,
        symbol_a: impl Into<String>,
        symbol_b: impl Into<String>,
        window: usize,
        z_score_threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            symbol_a: symbol_a.into(),
            symbol_b: symbol_b.into(),
            window,
            z_score_threshold,
            latest_price_a: None,
            latest_price_b: None,
            ratio_history: VecDeque::with_capacity(window),
            position: PositionState::Flat,
        }
    }

    fn update_price(&mut self, symbol: &str, price: rust_decimal::Decimal, ts: i64) {
        if symbol == self.symbol_a {
            self.latest_price_a = Some((price, ts));
        } else if symbol == self.symbol_b {
            self.latest_price_b = Some((price, ts));
        }
    }

    fn push_ratio_if_fresh(&mut self) {
        let (Some((price_a, ts_a)), Some((price_b, ts_b))) = (self.latest_price_a, self.latest_price_b) else {
            return;
        };
        if (ts_a - ts_b).abs() > FRESHNESS_WINDOW_MS || price_b.is_zero() {
            return;
        }
        let ratio = (price_a / price_b).to_f64().unwrap_or(0.0);
        if self.ratio_history.len() == self.window {
            self.ratio_history.pop_front();
        }
        self.ratio_history.push_back(ratio);
    }

    fn mean_stdev(&self) -> Option<(f64, f64)> {
        if self.ratio_history.len() < 2 {
            return None;
        }
        let n = self.ratio_history.len() as f64;
        let mean = self.ratio_history.iter().sum::<f64>() / n;
        let variance = self.ratio_history.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some((mean, variance.sqrt()))
    }

    fn pair_signal(&mut self, ts: i64, leg_symbol: &str, direction: Direction) -> Signal {
        Signal {
            strategy_name: self.name.clone(),
            symbol: leg_symbol.to_string(),
            timestamp_ms: ts,
            direction,
            strength: 1.0,
            stop_loss: None,
        }
    }
}

/// Returns both legs' signals (opposing directions on symbol A and B) for a
/// single triggering event (§4.4). `Strategy::on_event` below forwards this
/// directly; the inherent method exists so tests and other direct callers
/// can exercise it without going through the trait object.
impl PairsTradingStrategy {
    pub fn on_event_pair(&mut self, event: &Event, _view: &dyn MarketView) -> Vec<Signal> {
        let (symbol, price, ts) = match event {
            Event::Market(bar) => (bar.symbol.clone(), bar.close, bar.timestamp_ms),
            Event::Trade(trade) => (trade.symbol.clone(), trade.price, trade.timestamp_ms),
            Event::Book(book) => {
                let Some(mid) = book.mid() else { return Vec::new() };
                (book.symbol.clone(), mid, book.timestamp_ms)
            }
            _ => return Vec::new(),
        };
        if symbol != self.symbol_a && symbol != self.symbol_b {
            return Vec::new();
        }
        self.update_price(&symbol, price, ts);
        self.push_ratio_if_fresh();

        let Some((mean, sigma)) = self.mean_stdev() else {
            return Vec::new();
        };
        if sigma < MIN_SIGMA {
            return Vec::new();
        }
        let Some(&r_now) = self.ratio_history.back() else {
            return Vec::new();
        };
        let z = (r_now - mean) / sigma;

        if z > self.z_score_threshold && self.position != PositionState::ShortPair {
            self.position = PositionState::ShortPair;
            vec![
                self.pair_signal(ts, &self.symbol_a.clone(), Direction::Sell),
                self.pair_signal(ts, &self.symbol_b.clone(), Direction::Buy),
            ]
        } else if z < -self.z_score_threshold && self.position != PositionState::LongPair {
            self.position = PositionState::LongPair;
            vec![
                self.pair_signal(ts, &self.symbol_a.clone(), Direction::Buy),
                self.pair_signal(ts, &self.symbol_b.clone(), Direction::Sell),
            ]
        } else if z.abs() < FLATTEN_Z && self.position != PositionState::Flat {
            let (dir_a, dir_b) = match self.position {
                PositionState::ShortPair => (Direction::Buy, Direction::Sell),
                PositionState::LongPair => (Direction::Sell, Direction::Buy),
                PositionState::Flat => unreachable!(),
            };
            self.position = PositionState::Flat;
            vec![
                self.pair_signal(ts, &self.symbol_a.clone(), dir_a),
                self.pair_signal(ts, &self.symbol_b.clone(), dir_b),
            ]
        } else {
            Vec::new()
        }
    }
}

impl Strategy for PairsTradingStrategy {
    fn on_event(&mut self, event: &Event, view: &dyn MarketView) -> Vec<Signal> {
        self.on_event_pair(event, view)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shadowbook_core::types::{Bar, OrderBook};

    struct NoopView;
    impl MarketView for NoopView {
        fn latest_bar(&self, _symbol: &str) -> Option<Bar> {
            None
        }
        fn latest_book(&self, _symbol: &str) -> Option<OrderBook> {
            None
        }
        fn latest_bars(&self, _symbol: &str, _n: usize) -> Vec<Bar> {
            Vec::new()
        }
    }

    fn bar(symbol: &str, close: rust_decimal::Decimal, ts: i64) -> Event {
        Event::Market(Bar {
            symbol: symbol.into(),
            timestamp_ms: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(0),
        })
    }

    #[test]
    fn no_signal_until_window_is_warm() {
        let mut strat = PairsTradingStrategy::new("pairs", "A", "B", 5, 2.0);
        let view = NoopView;
        assert!(strat.on_event_pair(&bar("A", dec!(100), 1), &view).is_empty());
        assert!(strat.on_event_pair(&bar("B", dec!(50), 1), &view).is_empty());
    }

    #[test]
    fn scenario_3_divergence_opens_short_pair() {
        let mut strat = PairsTradingStrategy::new("pairs", "A", "B", 5, 1.5);
        let view = NoopView;
        // Build up a stable ratio history around 2.0, then diverge sharply.
        for ts in 0..5 {
            strat.on_event_pair(&bar("A", dec!(100), ts), &view);
            strat.on_event_pair(&bar("B", dec!(50), ts), &view);
        }
        let signals = strat.on_event_pair(&bar("A", dec!(140), 5), &view);
        let signals = if signals.is_empty() {
            strat.on_event_pair(&bar("B", dec!(50), 5), &view)
        } else {
            signals
        };
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].symbol, "A");
        assert_eq!(signals[0].direction, Direction::Sell);
        assert_eq!(signals[1].symbol, "B");
        assert_eq!(signals[1].direction, Direction::Buy);
    }

    #[test]
    fn stale_leg_is_not_merged_into_ratio() {
        let mut strat = PairsTradingStrategy::new("pairs", "A", "B", 5, 2.0);
        let view = NoopView;
        strat.on_event_pair(&bar("A", dec!(100), 1), &view);
        strat.on_event_pair(&bar("B", dec!(50), 100), &view); // far apart in time
        assert!(strat.ratio_history.is_empty());
    }
}
