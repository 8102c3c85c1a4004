//! Concrete signal generators (§4.4), split out from `shadowbook-core`
//! as their own crate so strategy implementations can be added without
//! touching the event pipeline.

pub mod order_book_imbalance;
pub mod pairs_trading;
pub mod sma_crossover;

pub use order_book_imbalance::OrderBookImbalanceStrategy;
pub use pairs_trading::PairsTradingStrategy;
pub use sma_crossover::SmaCrossoverStrategy;
