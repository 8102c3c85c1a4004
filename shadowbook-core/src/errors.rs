//! Domain-specific error types for the engine's core subsystems.
//!
//! Each subsystem gets its own `thiserror`-derived enum so callers can match
//! on recoverable vs. fatal kinds without downcasting. The driver binaries
//! collapse these into `anyhow::Result` at the top level (see `shadowbook-bins`).

use thiserror::Error;

/// Errors raised by the [`crate::event_bus::EventBus`].
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("publish rejected: bus is closed")]
    BusClosed,

    #[error("bus was closed before the data handler signaled exhaustion")]
    PrematureClose,
}

/// Errors raised while loading or replaying market data.
#[derive(Debug, Error)]
pub enum DataHandlerError {
    #[error("failed to parse {kind} row in {source}: {reason}")]
    ParseError {
        kind: &'static str,
        source: String,
        reason: String,
    },

    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by [`crate::portfolio::Portfolio`].
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors raised by the [`crate::risk::RiskManager`].
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("trading halted: {reason}")]
    TradingHalted { reason: String },

    #[error("signal rejected: data source status is {status}")]
    DataSourceRejected { status: String },
}

/// Errors raised by the [`crate::execution::ExecutionHandler`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no liquidity available for {symbol}")]
    NoLiquidity { symbol: String },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },
}

/// Errors raised while loading or validating [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing or malformed field: {0}")]
    Invalid(String),

    #[error("unsupported run mode: {0}")]
    UnsupportedRunMode(String),

    #[error(transparent)]
    Loader(#[from] config::ConfigError),
}
