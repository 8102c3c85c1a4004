//! Shared plumbing for the `shadowbook-backtest` and `shadowbook-shadow`
//! driver binaries.

pub mod common;
