//! Chronological multi-stream market data replay (§4.2).
//!
//! Grounded on `original_source/src/data/HistoricCSVDataHandler.cpp` for the
//! file-backed variant's load-everything-up-front shape, and on the pack's
//! `tokio-tungstenite` feeds (e.g. `cooprefr-bettersys`'s
//! `scrapers::binance_book_ticker`) for the live variant's reconnect loop.
//! Both variants share the cursor-based chronological merge below.

mod file;
mod live;
mod merge;

pub use file::FileDataHandler;
pub use live::LiveDataHandler;
pub use merge::ChronoMerger;

use crate::strategy::MarketView;
use crate::types::Symbol;

/// Outcome of a single `update()` step (§4.2 contract).
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Produced,
    Exhausted,
    Stalled(String),
}

/// Capability interface implemented by both the file-backed and live
/// variants. A plain trait, not an inheritance hierarchy (Design Notes §9):
/// the driver loop holds a `Box<dyn DataHandler>` and never downcasts.
///
/// `DataHandler: MarketView` as a supertrait (rather than a blanket impl)
/// so a `Box<dyn DataHandler>` can be passed anywhere a `&dyn MarketView` is
/// expected (strategies read market state without depending on the fuller
/// replay-control interface) via trait-object upcasting.
pub trait DataHandler: MarketView {
    /// Advance by one event, publishing it onto `bus`. Returns what happened.
    fn update(&mut self, bus: &mut crate::event_bus::EventBus) -> Effect;

    fn is_finished(&self) -> bool;

    fn symbols(&self) -> &[Symbol];
}
