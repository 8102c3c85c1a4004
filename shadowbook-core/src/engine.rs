//! The driver loop wiring DataHandler → EventBus → Strategies → Portfolio →
//! RiskManager → ExecutionHandler together (§2).
//!
//! Grounded on the dispatch-order contract documented on
//! `bog-core::engine::generic`'s dispatcher (registration-order delivery),
//! generalized from that module's const-generic `Engine<S, E>` to a
//! runtime-configured `Vec<Box<dyn Strategy>>` plus a `Box<dyn DataHandler>`,
//! since this crate must run a heterogeneous, config-selected strategy set
//! rather than one strategy compiled into the binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::data_handler::{DataHandler, Effect};
use crate::errors::EventBusError;
use crate::event_bus::EventBus;
use crate::execution::ExecutionHandler;
use crate::performance::{self, PerformanceReport};
use crate::portfolio::{EquitySample, Portfolio};
use crate::risk::RiskManager;
use crate::strategy::Strategy;
use crate::types::{ClosedTrade, Event};
use rust_decimal::prelude::ToPrimitive;

/// Result of a completed run, ready for CSV export or further analysis (§6).
pub struct RunSummary {
    pub equity_curve: Vec<EquitySample>,
    pub trade_log: Vec<ClosedTrade>,
    pub performance: PerformanceReport,
}

pub struct Engine {
    bus: EventBus,
    data_handler: Box<dyn DataHandler>,
    strategies: Vec<Box<dyn Strategy>>,
    portfolio: Portfolio,
    risk: RiskManager,
    execution: ExecutionHandler,
    volatility_lookback: usize,
    annualization: f64,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        data_handler: Box<dyn DataHandler>,
        strategies: Vec<Box<dyn Strategy>>,
        portfolio: Portfolio,
        risk_config: RiskConfig,
        execution: ExecutionHandler,
        annualization: f64,
    ) -> Self {
        let volatility_lookback = risk_config.volatility_lookback;
        Self {
            bus: EventBus::new(),
            data_handler,
            strategies,
            portfolio,
            risk: RiskManager::new(risk_config),
            execution,
            volatility_lookback,
            annualization,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn risk_manager(&self) -> &RiskManager {
        &self.risk
    }

    /// A handle callers can set (e.g. from a Ctrl+C handler) to stop the run
    /// at the next loop iteration rather than waiting for data exhaustion.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Pull-driven main loop (§2): alternate `DataHandler::update` with
    /// draining the bus to completion before pulling again.
    pub fn run(mut self) -> RunSummary {
        info!("engine run starting");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                info!("shutdown signal received; stopping run");
                break;
            }

            let effect = self.data_handler.update(&mut self.bus);
            match &effect {
                Effect::Produced => {}
                Effect::Stalled(reason) => debug!(reason, "data handler stalled this tick"),
                Effect::Exhausted => {}
            }

            while let Some(event) = self.bus.drain_next() {
                self.dispatch(event);
            }

            if matches!(effect, Effect::Exhausted) && self.data_handler.is_finished() {
                break;
            }
        }

        if let Err(err) = self.bus.close_checked(self.data_handler.is_finished()) {
            warn!(%err, "bus closed abnormally at end of run");
        }
        info!("engine run complete");

        let equity_curve = self.portfolio.equity_curve().to_vec();
        let trade_log = self.portfolio.trade_log().to_vec();
        let report = performance::compute_report(
            &equity_curve,
            self.portfolio.initial_capital(),
            &trade_log,
            self.annualization,
        );

        RunSummary {
            equity_curve,
            trade_log,
            performance: report,
        }
    }

    /// Deliver one event to interested consumers in registration order (§2):
    /// Strategies, then Portfolio mark-to-market, then RiskManager, then
    /// ExecutionHandler. Fills flow back to the Portfolio.
    fn dispatch(&mut self, event: Event) {
        match &event {
            Event::Market(_) | Event::Trade(_) | Event::Book(_) => {
                self.dispatch_market_event(&event);
            }
            Event::Signal(signal) => {
                let last_price = self
                    .data_handler
                    .latest_bar(&signal.symbol)
                    .map(|b| b.close)
                    .or_else(|| {
                        self.data_handler
                            .latest_book(&signal.symbol)
                            .and_then(|b| b.mid())
                    })
                    .unwrap_or_default();
                let log_returns = self.log_returns_for(&signal.symbol);
                let current_position = self.portfolio.position(&signal.symbol).and_then(|p| p.direction());

                match self.risk.size_signal(
                    signal,
                    self.portfolio.total_equity(),
                    self.portfolio.cash(),
                    last_price,
                    &log_returns,
                    current_position,
                ) {
                    Ok(order) => {
                        if let Err(err) = self.bus.publish(Event::Order(order)) {
                            self.log_publish_failure(&err);
                        }
                    }
                    Err(err) => warn!(%err, symbol = %signal.symbol, "signal rejected by risk manager"),
                }
            }
            Event::Order(order) => {
                let book = self.data_handler.latest_book(&order.symbol);
                let (fill, failure) = self.execution.execute_reporting_partial(order, book.as_ref());
                if let Some(fill) = fill {
                    if let Err(err) = self.bus.publish(Event::Fill(fill)) {
                        self.log_publish_failure(&err);
                    }
                }
                if let Some(failure) = failure {
                    if let Err(err) = self.bus.publish(Event::OrderFailure(failure)) {
                        self.log_publish_failure(&err);
                    }
                }
            }
            Event::Fill(fill) => {
                self.portfolio.on_fill(fill);
                self.portfolio.update_time_index(fill.timestamp_ms);
                self.risk
                    .evaluate_circuit_breaker(self.portfolio.initial_capital(), self.portfolio.total_equity());
                self.risk.check_drawdown_alert(self.portfolio.max_drawdown());
            }
            Event::OrderFailure(failure) => {
                warn!(?failure, "order failed");
            }
            Event::RegimeChanged(state) => {
                self.portfolio.on_regime_changed(*state);
            }
            Event::DataSourceStatus(status) => {
                info!(%status, "data source status changed");
                self.risk.on_data_source_status(*status);
            }
            Event::News(_) => {
                // No strategy in this crate consumes news today; the bus
                // carries it so future strategies can (§3).
            }
        }
    }

    fn dispatch_market_event(&mut self, event: &Event) {
        for strategy in &mut self.strategies {
            for signal in strategy.on_event(event, self.data_handler.as_ref()) {
                if let Err(err) = self.bus.publish(Event::Signal(signal)) {
                    self.log_publish_failure(&err);
                }
            }
        }

        match event {
            Event::Trade(trade) => {
                self.portfolio.on_trade(trade);
                self.portfolio.update_time_index(trade.timestamp_ms);
            }
            Event::Book(book) => {
                self.portfolio.on_book(book);
                self.portfolio.update_time_index(book.timestamp_ms);
            }
            Event::Market(bar) => {
                self.portfolio.on_bar(bar);
                self.portfolio.update_time_index(bar.timestamp_ms);
            }
            _ => unreachable!("dispatch_market_event only called for Market/Trade/Book"),
        }

        self.risk
            .evaluate_circuit_breaker(self.portfolio.initial_capital(), self.portfolio.total_equity());
        self.risk.check_drawdown_alert(self.portfolio.max_drawdown());
    }

    fn log_returns_for(&self, symbol: &str) -> Vec<f64> {
        let bars = self.data_handler.latest_bars(symbol, self.volatility_lookback + 1);
        bars.windows(2)
            .filter_map(|pair| {
                let prev = pair[0].close.to_f64()?;
                let cur = pair[1].close.to_f64()?;
                if prev <= 0.0 || cur <= 0.0 {
                    None
                } else {
                    Some((cur / prev).ln())
                }
            })
            .collect()
    }

    fn log_publish_failure(&self, err: &EventBusError) {
        warn!(%err, "failed to publish event onto bus");
    }
}
