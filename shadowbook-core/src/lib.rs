//! Shadowbook Core - event-driven backtesting and live-shadow engine for
//! market-microstructure strategies.
//!
//! ## Architecture
//! - Single-threaded, cooperative event loop: one [`event_bus::EventBus`]
//!   delivered in a fixed registration order (Strategies, then Portfolio
//!   mark-to-market, then RiskManager, then ExecutionHandler, with Fills
//!   flowing back to the Portfolio).
//! - A [`data_handler::DataHandler`] capability trait, implemented by a
//!   file-backed historical replay and a live WebSocket feed, sharing one
//!   chronological multi-stream merge.
//! - A [`strategy::Strategy`] capability trait dispatched as
//!   `Box<dyn Strategy>`, not a compile-time-selected monomorphization —
//!   this engine runs a heterogeneous, config-selected strategy set.
//!
//! ## Core Modules
//! - `types`: shared domain types (orders, fills, bars, books, events)
//! - `errors`: per-subsystem error enums
//! - `config`: TOML + environment-variable configuration
//! - `logging`: structured logging setup
//! - `event_bus`: the ordered, typed event bus
//! - `data_handler`: file-backed and live market data replay
//! - `strategy`: the `Strategy`/`MarketView` capability interfaces
//! - `portfolio`: average-cost position accounting and equity tracking
//! - `risk`: position sizing and the portfolio circuit breaker
//! - `execution`: simulated order matching against book depth
//! - `performance`: pure performance-statistics functions
//! - `engine`: the driver loop wiring everything together

pub mod config;
pub mod data_handler;
pub mod engine;
pub mod errors;
pub mod event_bus;
pub mod execution;
pub mod logging;
pub mod performance;
pub mod portfolio;
#[cfg(test)]
mod portfolio_proptest;
pub mod risk;
pub mod strategy;
pub mod types;

pub use anyhow::{Error, Result};

/// Prelude for convenient imports across binaries and strategy crates.
pub mod prelude {
    pub use crate::config::{Config, DataConfig, ExecutionConfig, RiskConfig, RunMode, StrategyInstanceConfig, WebsocketConfig};
    pub use crate::data_handler::{DataHandler, Effect, FileDataHandler, LiveDataHandler};
    pub use crate::engine::{Engine, RunSummary};
    pub use crate::errors::{
        ConfigError, DataHandlerError, EventBusError, ExecutionError, PortfolioError, RiskError,
    };
    pub use crate::event_bus::EventBus;
    pub use crate::execution::ExecutionHandler;
    pub use crate::performance::PerformanceReport;
    pub use crate::portfolio::{EquitySample, Portfolio};
    pub use crate::risk::{BreakerState, HaltReason, RiskManager};
    pub use crate::strategy::{MarketView, Strategy};
    pub use crate::types::{
        Bar, ClosedTrade, Direction, Event, Fill, Order, OrderBook, OrderBookLevel, OrderFailure,
        OrderId, OrderType, Position, Side, Signal, Symbol, TimestampMs, Trade, Trend,
        VolatilityRegime,
    };

    pub use crate::{Error, Result};
}
