//! Order-book imbalance signal generator (§4.4).
//!
//! Grounded directly on `original_source/include/strategy/
//! OrderBookImbalanceStrategy.h`'s `PositionState` enum and cooldown-timer
//! fields (the header carries unresolved merge markers; this follows the
//! `PositionState`/cooldown variant per the grounding ledger).

use rust_decimal::prelude::ToPrimitive;
use shadowbook_core::strategy::{MarketView, Strategy};
use shadowbook_core::types::{Direction, Event, Signal};

const SIGNAL_COOLDOWN_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionState {
    Flat,
    Long,
    Short,
}

pub struct OrderBookImbalanceStrategy {
    name: String,
    symbol: String,
    lookback_levels: usize,
    imbalance_threshold: f64,
    position: PositionState,
    last_signal_time_ms: Option<i64>,
}

impl OrderBookImbalanceStrategy {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, lookback_levels: usize, imbalance_threshold: f64) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            lookback_levels,
            imbalance_threshold,
            position: PositionState::Flat,
            last_signal_time_ms: None,
        }
    }

    fn in_cooldown(&self, now_ms: i64) -> bool {
        match self.last_signal_time_ms {
            Some(last) => now_ms - last < SIGNAL_COOLDOWN_MS,
            None => false,
        }
    }

    fn signal(&mut self, now_ms: i64, direction: Direction, strength: f64) -> Option<Signal> {
        self.last_signal_time_ms = Some(now_ms);
        self.position = match direction {
            Direction::Buy => PositionState::Long,
            Direction::Sell => PositionState::Short,
            Direction::Flat => PositionState::Flat,
        };
        Some(Signal {
            strategy_name: self.name.clone(),
            symbol: self.symbol.clone(),
            timestamp_ms: now_ms,
            direction,
            strength,
            stop_loss: None,
        })
    }
}

impl Strategy for OrderBookImbalanceStrategy {
    fn on_event(&mut self, event: &Event, _view: &dyn MarketView) -> Vec<Signal> {
        let Event::Book(book) = event else {
            return Vec::new();
        };
        if book.symbol != self.symbol {
            return Vec::new();
        }
        if self.in_cooldown(book.timestamp_ms) {
            return Vec::new();
        }

        let bid_vol = book.bid_volume(self.lookback_levels);
        let ask_vol = book.ask_volume(self.lookback_levels);
        let total = bid_vol + ask_vol;
        if total.is_zero() {
            return Vec::new();
        }
        let ratio = (bid_vol / total).to_f64().unwrap_or(0.5);

        let signal = if ratio > self.imbalance_threshold && self.position != PositionState::Long {
            self.signal(book.timestamp_ms, Direction::Buy, ratio)
        } else if ratio < 1.0 - self.imbalance_threshold && self.position != PositionState::Short {
            self.signal(book.timestamp_ms, Direction::Sell, 1.0 - ratio)
        } else if (self.imbalance_threshold..=1.0 - self.imbalance_threshold).contains(&ratio)
            && self.position != PositionState::Flat
        {
            self.signal(book.timestamp_ms, Direction::Flat, 0.0)
        } else {
            None
        };
        signal.into_iter().collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowbook_core::types::{OrderBook, OrderBookLevel};

    struct NoopView;
    impl MarketView for NoopView {
        fn latest_bar(&self, _symbol: &str) -> Option<shadowbook_core::types::Bar> {
            None
        }
        fn latest_book(&self, _symbol: &str) -> Option<OrderBook> {
            None
        }
        fn latest_bars(&self, _symbol: &str, _n: usize) -> Vec<shadowbook_core::types::Bar> {
            Vec::new()
        }
    }

    fn book(ts: i64, bid_qty: f64, ask_qty: f64) -> Event {
        Event::Book(OrderBook {
            symbol: "BTCUSD".into(),
            timestamp_ms: ts,
            bids: vec![OrderBookLevel {
                price: rust_decimal::Decimal::new(100, 0),
                quantity: rust_decimal::Decimal::try_from(bid_qty).unwrap(),
            }],
            asks: vec![OrderBookLevel {
                price: rust_decimal::Decimal::new(101, 0),
                quantity: rust_decimal::Decimal::try_from(ask_qty).unwrap(),
            }],
        })
    }

    #[test]
    fn scenario_4_buy_signal_on_bid_heavy_book() {
        let mut strat = OrderBookImbalanceStrategy::new("obi", "BTCUSD", 1, 0.6);
        let view = NoopView;
        let signals = strat.on_event(&book(1000, 9.0, 1.0), &view);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, Direction::Buy);
    }

    #[test]
    fn cooldown_suppresses_second_signal() {
        let mut strat = OrderBookImbalanceStrategy::new("obi", "BTCUSD", 1, 0.6);
        let view = NoopView;
        assert!(!strat.on_event(&book(1000, 9.0, 1.0), &view).is_empty());
        assert!(strat.on_event(&book(1200, 9.0, 1.0), &view).is_empty());
    }

    #[test]
    fn signal_allowed_again_after_cooldown_elapses() {
        let mut strat = OrderBookImbalanceStrategy::new("obi", "BTCUSD", 1, 0.6);
        let view = NoopView;
        assert!(!strat.on_event(&book(1000, 9.0, 1.0), &view).is_empty());
        // position is now Long, so a balanced book 600ms later should go FLAT.
        assert!(!strat.on_event(&book(1600, 5.0, 5.0), &view).is_empty());
    }

    #[test]
    fn other_symbol_is_ignored() {
        let mut strat = OrderBookImbalanceStrategy::new("obi", "BTCUSD", 1, 0.6);
        let view = NoopView;
        let mut other = book(1000, 9.0, 1.0);
        if let Event::Book(ref mut b) = other {
            b.symbol = "ETHUSD".into();
        }
        assert!(strat.on_event(&other, &view).is_empty());
    }
}
