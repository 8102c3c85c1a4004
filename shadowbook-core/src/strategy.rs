//! The `Strategy` capability interface and its read-only market view (§4.4).
//!
//! Grounded on the shape of `bog-core::engine::generic::Strategy` (its
//! `calculate`/`name`/`reset` trait), generalized from const-generic
//! zero-sized-type monomorphization to `Box<dyn Strategy>` dispatch: this
//! engine runs a heterogeneous, runtime-configured set of strategies rather
//! than one compile-time-selected strategy per binary.

use crate::types::{Bar, Event, OrderBook, Signal};

/// Read-only access to the latest market state, for strategies that need a
/// symbol's data beyond whatever is carried by the triggering event (e.g.
/// PairsTrading reading both legs' last price on either leg's update).
/// `DataHandler` is a supertrait of this so a `Box<dyn DataHandler>` upcasts
/// to `&dyn MarketView` at strategy dispatch sites.
pub trait MarketView {
    fn latest_bar(&self, symbol: &str) -> Option<Bar>;
    fn latest_book(&self, symbol: &str) -> Option<OrderBook>;

    /// Last `n` bars for `symbol`, oldest first. Implementations that don't
    /// retain full history may return fewer than `n`.
    fn latest_bars(&self, symbol: &str, n: usize) -> Vec<Bar>;
}

/// A signal generator. Consumes events read-only and emits zero or more
/// `Signal`s per event (Design Notes §9: a capability interface, not an
/// inheritance hierarchy — the dispatcher never downcasts). Most strategies
/// emit at most one signal per event; PairsTrading emits two simultaneously
/// (opposing legs A and B, §4.4), which is why this returns a `Vec` rather
/// than an `Option`.
pub trait Strategy {
    fn on_event(&mut self, event: &Event, view: &dyn MarketView) -> Vec<Signal>;

    fn name(&self) -> &str;
}
