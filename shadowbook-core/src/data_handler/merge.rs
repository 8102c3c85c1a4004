//! O(K) cursor-scan chronological merge across per-(symbol, stream-kind)
//! event queues (§4.2 "Merge algorithm"). A priority heap would also satisfy
//! the contract but isn't warranted at the documented K ≤ ~10.

use std::collections::VecDeque;

use crate::types::{Event, Symbol};

pub struct ChronoMerger {
    streams: Vec<VecDeque<Event>>,
}

impl ChronoMerger {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
        }
    }

    /// Register one pre-sorted stream (e.g. all trade events for a single symbol).
    pub fn add_stream(&mut self, events: Vec<Event>) {
        if !events.is_empty() {
            self.streams.push(events.into());
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.streams.iter().all(|s| s.is_empty())
    }

    /// Pop the globally-next event by (timestamp asc, symbol asc, kind_rank asc).
    pub fn next_event(&mut self) -> Option<Event> {
        let mut best_idx: Option<usize> = None;
        let mut best_key: Option<(i64, &str, u8)> = None;

        for (i, stream) in self.streams.iter().enumerate() {
            let Some(ev) = stream.front() else {
                continue;
            };
            let key = (ev.timestamp(), ev.symbol().unwrap_or(""), ev.kind_rank());
            if best_key.map(|b| key < b).unwrap_or(true) {
                best_key = Some(key);
                best_idx = Some(i);
            }
        }

        best_idx.and_then(|i| self.streams[i].pop_front())
    }
}

impl Default for ChronoMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for building a stable stream key; exposed for `file`/`live` variants
/// that need to label cursors by symbol when reporting stall reasons.
pub fn stream_label(symbol: &Symbol, kind: &str) -> String {
    format!("{symbol}:{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBook, Side, Trade};
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, ts: i64) -> Event {
        Event::Trade(Trade {
            symbol: symbol.into(),
            timestamp_ms: ts,
            price: dec!(1),
            quantity: dec!(1),
            side: Side::Buy,
        })
    }

    fn book(symbol: &str, ts: i64) -> Event {
        Event::Book(OrderBook {
            symbol: symbol.into(),
            timestamp_ms: ts,
            bids: vec![],
            asks: vec![],
        })
    }

    #[test]
    fn scenario_6_chronological_merge_across_symbols() {
        let mut merger = ChronoMerger::new();
        merger.add_stream(vec![trade("A", 100), trade("A", 300)]);
        merger.add_stream(vec![trade("B", 200), trade("B", 250)]);

        let order: Vec<(String, i64)> = std::iter::from_fn(|| merger.next_event())
            .map(|e| (e.symbol().unwrap().to_string(), e.timestamp()))
            .collect();

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

    #[test]
    fn trade_sorts_before_book_at_equal_timestamp_and_symbol() {
        let mut merger = ChronoMerger::new();
        merger.add_stream(vec![book("A", 100)]);
        merger.add_stream(vec![trade("A", 100)]);

        let first = merger.next_event().unwrap();
        assert!(matches!(first, Event::Trade(_)));
    }

    #[test]
    fn empty_merger_is_exhausted() {
        let merger = ChronoMerger::new();
        assert!(merger.is_exhausted());
    }
}
