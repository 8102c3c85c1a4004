//! Simple moving-average crossover signal generator (§4.4).
//!
//! Grounded on `original_source/include/strategy/
//! SimpleMovingAverageCrossover.h` and its `.cpp`: short/long window SMAs
//! with a `calculate_sma(period)` helper and an initial-tick-records-only
//! rule (the first close can form no crossover, so it never signals).

use std::collections::VecDeque;

use shadowbook_core::strategy::{MarketView, Strategy};
use shadowbook_core::types::{Direction, Event, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionState {
    Flat,
    Long,
    Short,
}

pub struct SmaCrossoverStrategy {
    name: String,
    symbol: String,
    short_window: usize,
    long_window: usize,
    closes: VecDeque<f64>,
    prev_short: Option<f64>,
    prev_long: Option<f64>,
    position: PositionState,
}

impl SmaCrossoverStrategy {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, short_window: usize, long_window: usize) -> Self {
        assert!(short_window < long_window, "short_window must be < long_window");
        Self {
            name: name.into(),
            symbol: symbol.into(),
            short_window,
            long_window,
            closes: VecDeque::with_capacity(long_window),
            prev_short: None,
            prev_long: None,
            position: PositionState::Flat,
        }
    }

    fn calculate_sma(&self, period: usize) -> Option<f64> {
        if self.closes.len() < period {
            return None;
        }
        let sum: f64 = self.closes.iter().rev().take(period).sum();
        Some(sum / period as f64)
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn on_event(&mut self, event: &Event, _view: &dyn MarketView) -> Vec<Signal> {
        let close = match event {
            Event::Market(bar) if bar.symbol == self.symbol => {
                rust_decimal::prelude::ToPrimitive::to_f64(&bar.close).unwrap_or(0.0)
            }
            _ => return Vec::new(),
        };
        let timestamp_ms = match event {
            Event::Market(bar) => bar.timestamp_ms,
            _ => unreachable!(),
        };

        if self.closes.len() == self.long_window {
            self.closes.pop_front();
        }
        self.closes.push_back(close);

        let sma_s = self.calculate_sma(self.short_window);
        let sma_l = self.calculate_sma(self.long_window);

        let (Some(sma_s), Some(sma_l)) = (sma_s, sma_l) else {
            // Initial ticks: record only, never signal (§4.4).
            return Vec::new();
        };

        let signal = match (self.prev_short, self.prev_long) {
            (Some(prev_s), Some(prev_l)) => {
                let crossed_up = prev_s <= prev_l && sma_s > sma_l;
                let crossed_down = prev_s >= prev_l && sma_s < sma_l;

                if crossed_up && self.position != PositionState::Long {
                    self.position = PositionState::Long;
                    Some(Direction::Buy)
                } else if crossed_down && self.position != PositionState::Short {
                    self.position = PositionState::Short;
                    Some(Direction::Sell)
                } else {
                    None
                }
            }
            _ => None,
        };

        self.prev_short = Some(sma_s);
        self.prev_long = Some(sma_l);

        signal
            .map(|direction| Signal {
                strategy_name: self.name.clone(),
                symbol: self.symbol.clone(),
                timestamp_ms,
                direction,
                strength: 1.0,
                stop_loss: None,
            })
            .into_iter()
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
