//! Signal sizing, circuit breaker, and data-source gating (§4.5).
//!
//! The threshold struct is grounded on `original_source/include/risk/
//! RiskManager.h`'s `RiskThresholds`, restructured in the shape of
//! `bog-core::risk::mod`'s `RiskLimits`/`with_limits()` idiom. The circuit
//! breaker state machine keeps `bog-core::risk::circuit_breaker`'s
//! `BreakerState`/`HaltReason` shape, re-thresholded from microstructure
//! anomalies (spread, price spike, staleness) to portfolio-wide drawdown.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::errors::RiskError;
use crate::types::{DataSourceStatus, Direction, Order, OrderId, OrderType, PositionDirection, Signal, Symbol};

/// Reason the circuit breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    PortfolioLossThreshold,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Normal,
    Halted(HaltReason),
}

/// Transforms signals into sized orders, enforces per-trade and
/// portfolio-wide risk limits, and trips on catastrophic drawdown.
pub struct RiskManager {
    config: RiskConfig,
    breaker: BreakerState,
    data_source_status: DataSourceStatus,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            breaker: BreakerState::Normal,
            data_source_status: DataSourceStatus::Connected,
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.breaker, BreakerState::Halted(_))
    }

    /// Manual reset of a tripped breaker (§4.5: "drop all subsequent signals
    /// until manual reset").
    pub fn reset_breaker(&mut self) {
        self.breaker = BreakerState::Normal;
    }

    pub fn on_data_source_status(&mut self, status: DataSourceStatus) {
        self.data_source_status = status;
    }

    /// Re-evaluate the circuit breaker against current equity (§4.5). Call
    /// after every `Portfolio::update_time_index`.
    pub fn evaluate_circuit_breaker(&mut self, initial_capital: Decimal, total_equity: Decimal) {
        if initial_capital.is_zero() {
            return;
        }
        let loss_pct: f64 = ((initial_capital - total_equity) / initial_capital)
            .to_f64()
            .unwrap_or(0.0);

        if loss_pct > self.config.portfolio_loss_threshold_pct
            && !matches!(self.breaker, BreakerState::Halted(_))
        {
            warn!(loss_pct, "portfolio loss threshold breached; halting trading");
            self.breaker = BreakerState::Halted(HaltReason::PortfolioLossThreshold);
        }
    }

    /// Emit a `RiskAlert`-equivalent log line without halting when drawdown
    /// exceeds the soft threshold (§4.5).
    pub fn check_drawdown_alert(&self, max_drawdown: f64) {
        if max_drawdown > self.config.max_drawdown_pct {
            warn!(
                max_drawdown,
                threshold = self.config.max_drawdown_pct,
                "max drawdown exceeds configured threshold"
            );
        }
    }

    /// Turn a `Signal` into a sized `Order`, applying the data-source gate,
    /// circuit breaker, and position sizing in that order (§4.5).
    /// `current_position` is the caller's existing position direction for
    /// the signal's symbol, if any — it decides which side a `Flat` signal
    /// maps to (flattening a short buys, flattening a long sells).
    #[allow(clippy::too_many_arguments)]
    pub fn size_signal(
        &self,
        signal: &Signal,
        total_equity: Decimal,
        cash: Decimal,
        last_price: Decimal,
        log_returns: &[f64],
        current_position: Option<PositionDirection>,
    ) -> Result<Order, RiskError> {
        match self.data_source_status {
            DataSourceStatus::Disconnected | DataSourceStatus::Reconnecting => {
                return Err(RiskError::DataSourceRejected {
                    status: self.data_source_status.to_string(),
                });
            }
            _ => {}
        }

        if self.is_halted() {
            return Err(RiskError::TradingHalted {
                reason: "circuit breaker tripped".into(),
            });
        }

        let qty = self.size_order(total_equity, cash, last_price, log_returns);
        let side = match signal.direction {
            Direction::Buy => crate::types::Side::Buy,
            Direction::Sell => crate::types::Side::Sell,
            // Flattening closes whatever is open: sell out of a long,
            // buy to cover a short. No open position means nothing to
            // flatten; default to Sell since a stray Flat can't buy its
            // way into a position.
            Direction::Flat => match current_position {
                Some(PositionDirection::Short) => crate::types::Side::Buy,
                Some(PositionDirection::Long) | None => crate::types::Side::Sell,
            },
        };

        Ok(Order {
            id: OrderId::generate(),
            strategy_name: signal.strategy_name.clone(),
            symbol: signal.symbol.clone(),
            timestamp_ms: signal.timestamp_ms,
            side,
            quantity: qty,
            order_type: OrderType::Market,
            limit_price: None,
            simulated_fallback: self.data_source_status == DataSourceStatus::FallbackActive,
        })
    }

    /// §4.5 Sizing: volatility-based when configured and σ is meaningful,
    /// fixed-fraction-of-equity otherwise; always clamped to 99% of cash.
    fn size_order(
        &self,
        total_equity: Decimal,
        cash: Decimal,
        last_price: Decimal,
        log_returns: &[f64],
    ) -> Decimal {
        if last_price.is_zero() {
            return Decimal::ZERO;
        }
        let risk_budget = total_equity * Decimal::try_from(self.config.risk_per_trade_pct)
            .unwrap_or(Decimal::ZERO);

        let mut qty = if self.config.use_volatility_sizing {
            let sigma = stdev(log_returns);
            if sigma > 1e-6 {
                let sigma_dec = Decimal::try_from(sigma).unwrap_or(Decimal::ZERO);
                risk_budget / (sigma_dec * last_price)
            } else {
                risk_budget / last_price
            }
        } else {
            risk_budget / last_price
        };

        let max_notional = cash * Decimal::new(99, 2); // 0.99
        if qty * last_price > max_notional && last_price > Decimal::ZERO {
            qty = max_notional / last_price;
        }
        qty.max(Decimal::ZERO)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Wrapper used by drivers to name the symbol a `RiskError::DataSourceRejected` applied to.
pub fn halted_symbol(order: &Order) -> &Symbol {
    &order.symbol
}

pub fn log_breaker_trip(reason: HaltReason) {
    info!(?reason, "circuit breaker tripped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig {
            risk_per_trade_pct: 0.01,
            max_drawdown_pct: 0.2,
            portfolio_loss_threshold_pct: 0.10,
            use_volatility_sizing: false,
            volatility_lookback: 20,
        }
    }

    #[test]
    fn scenario_5_circuit_breaker_trips_and_rejects() {
        let mut rm = RiskManager::new(config());
        let initial = dec!(100000);
        let dropped = dec!(89500); // 0.895 * initial
        rm.evaluate_circuit_breaker(initial, dropped);
        assert!(rm.is_halted());

        let signal = Signal {
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            direction: Direction::Buy,
            strength: 1.0,
            stop_loss: None,
        };
        let result = rm.size_signal(&signal, dropped, dropped, dec!(100), &[], None);
        assert!(matches!(result, Err(RiskError::TradingHalted { .. })));
    }

    #[test]
    fn breaker_does_not_trip_below_threshold() {
        let mut rm = RiskManager::new(config());
        rm.evaluate_circuit_breaker(dec!(100000), dec!(95000));
        assert!(!rm.is_halted());
    }

    #[test]
    fn data_source_gate_rejects_when_disconnected() {
        let mut rm = RiskManager::new(config());
        rm.on_data_source_status(DataSourceStatus::Disconnected);
        let signal = Signal {
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            direction: Direction::Buy,
            strength: 1.0,
            stop_loss: None,
        };
        let result = rm.size_signal(&signal, dec!(100000), dec!(100000), dec!(100), &[], None);
        assert!(matches!(result, Err(RiskError::DataSourceRejected { .. })));
    }

    #[test]
    fn fallback_active_flags_order_as_simulated() {
        let mut rm = RiskManager::new(config());
        rm.on_data_source_status(DataSourceStatus::FallbackActive);
        let signal = Signal {
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            direction: Direction::Buy,
            strength: 1.0,
            stop_loss: None,
        };
        let order = rm
            .size_signal(&signal, dec!(100000), dec!(100000), dec!(100), &[], None)
            .unwrap();
        assert!(order.simulated_fallback);
    }

    #[test]
    fn sizing_clamps_to_99_pct_of_cash() {
        let rm = RiskManager::new(RiskConfig {
            risk_per_trade_pct: 1.0, // absurdly large, forces clamp
            ..config()
        });
        let qty = rm.size_order(dec!(100000), dec!(1000), dec!(100), &[]);
        assert!(qty * dec!(100) <= dec!(990));
    }

    #[test]
    fn flattening_a_short_position_buys() {
        let rm = RiskManager::new(config());
        let signal = Signal {
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            direction: Direction::Flat,
            strength: 1.0,
            stop_loss: None,
        };
        let order = rm
            .size_signal(
                &signal,
                dec!(100000),
                dec!(100000),
                dec!(100),
                &[],
                Some(PositionDirection::Short),
            )
            .unwrap();
        assert_eq!(order.side, crate::types::Side::Buy);
    }

    #[test]
    fn flattening_a_long_position_sells() {
        let rm = RiskManager::new(config());
        let signal = Signal {
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            direction: Direction::Flat,
            strength: 1.0,
            stop_loss: None,
        };
        let order = rm
            .size_signal(
                &signal,
                dec!(100000),
                dec!(100000),
                dec!(100),
                &[],
                Some(PositionDirection::Long),
            )
            .unwrap();
        assert_eq!(order.side, crate::types::Side::Sell);
    }
}
