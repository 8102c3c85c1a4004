//! Simulated order matching against book depth (§4.6).
//!
//! The depth-walking logic is grounded on `original_source/include/
//! execution/SimulatedExecutionHandler.h`'s commission-and-slippage
//! contract; the bounded fill queue keeps a drop-oldest overflow policy
//! built on `crossbeam::queue::ArrayQueue`.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use rust_decimal::Decimal;
use tracing::warn;

use crate::config::ExecutionConfig;
use crate::errors::ExecutionError;
use crate::types::{Fill, Order, OrderBook, OrderFailure, OrderFailureReason, OrderType, Side};

/// Default capacity of the bounded fill queue used by the threaded variant
/// (unused by the single-threaded reference loop, which calls
/// [`ExecutionHandler::execute`] directly and gets the `Fill`/`OrderFailure`
/// back synchronously).
const FILL_QUEUE_CAPACITY: usize = 4096;

pub struct ExecutionHandler {
    config: ExecutionConfig,
    /// Bounded fill queue for the `threaded` feature's worker hand-off; the
    /// oldest entry is dropped on overflow rather than blocking the matcher.
    fill_queue: Arc<ArrayQueue<Fill>>,
}

impl ExecutionHandler {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            fill_queue: Arc::new(ArrayQueue::new(FILL_QUEUE_CAPACITY)),
        }
    }

    pub fn fill_queue(&self) -> Arc<ArrayQueue<Fill>> {
        Arc::clone(&self.fill_queue)
    }

    /// Push a fill onto the bounded queue, dropping the oldest entry on
    /// overflow rather than blocking the matcher (threaded variant only).
    pub fn enqueue_fill(&self, fill: Fill) {
        if let Err(rejected) = self.fill_queue.push(fill) {
            let _ = self.fill_queue.pop();
            if self.fill_queue.push(rejected).is_err() {
                warn!("fill queue overflow even after dropping oldest entry");
            }
        }
    }

    /// Match `order` against `book`, producing either a `Fill` or an
    /// `OrderFailure` (§4.6). Partial fills against insufficient depth return
    /// `Ok` with a `Fill` sized to whatever was available, paired with the
    /// caller's responsibility to also emit `OrderFailure(PartialFill)` —
    /// see [`ExecutionHandler::execute`], which does both.
    pub fn execute(
        &self,
        order: &Order,
        book: Option<&OrderBook>,
    ) -> Result<Fill, OrderFailure> {
        if order.quantity <= Decimal::ZERO {
            return Err(OrderFailure {
                order_id: order.id,
                symbol: order.symbol.clone(),
                timestamp_ms: order.timestamp_ms,
                reason: OrderFailureReason::InvalidOrder {
                    reason: "order quantity must be positive".into(),
                },
            });
        }

        let Some(book) = book else {
            return Err(OrderFailure {
                order_id: order.id,
                symbol: order.symbol.clone(),
                timestamp_ms: order.timestamp_ms,
                reason: OrderFailureReason::NoLiquidity,
            });
        };

        let levels: Vec<(Decimal, Decimal)> = match order.side {
            // A BUY walks the ask side outward; a SELL walks the bid side.
            Side::Buy => book.asks.iter().map(|l| (l.price, l.quantity)).collect(),
            Side::Sell => book.bids.iter().map(|l| (l.price, l.quantity)).collect(),
        };

        let (filled_qty, notional) = walk_depth(&levels, order.quantity, order.limit_price, order.side);

        if filled_qty.is_zero() {
            return Err(OrderFailure {
                order_id: order.id,
                symbol: order.symbol.clone(),
                timestamp_ms: order.timestamp_ms,
                reason: match order.order_type {
                    OrderType::Limit => OrderFailureReason::NotFilled,
                    OrderType::Market => OrderFailureReason::NoLiquidity,
                },
            });
        }

        let fill_price = notional / filled_qty;
        let commission = fill_price * filled_qty * self.config.commission_rate;

        Ok(Fill {
            order_id: order.id,
            strategy_name: order.strategy_name.clone(),
            symbol: order.symbol.clone(),
            timestamp_ms: order.timestamp_ms,
            side: order.side,
            quantity: filled_qty,
            fill_price,
            commission,
        })
    }

    /// Convenience wrapper used by the driver loop: executes the order and,
    /// on a partial market fill, also reports the unfilled remainder.
    pub fn execute_reporting_partial(
        &self,
        order: &Order,
        book: Option<&OrderBook>,
    ) -> (Option<Fill>, Option<OrderFailure>) {
        match self.execute(order, book) {
            Ok(fill) => {
                let remaining = order.quantity - fill.quantity;
                if remaining > Decimal::ZERO && order.order_type == OrderType::Market {
                    let failure = OrderFailure {
                        order_id: order.id,
                        symbol: order.symbol.clone(),
                        timestamp_ms: order.timestamp_ms,
                        reason: OrderFailureReason::PartialFill {
                            filled: fill.quantity,
                            remaining,
                        },
                    };
                    (Some(fill), Some(failure))
                } else {
                    (Some(fill), None)
                }
            }
            Err(failure) => (None, Some(failure)),
        }
    }
}

/// Consume `target_qty` from `levels` starting nearest the touch, respecting
/// `limit_price` when present. Returns `(filled_qty, total_notional)`.
fn walk_depth(
    levels: &[(Decimal, Decimal)],
    target_qty: Decimal,
    limit_price: Option<Decimal>,
    side: Side,
) -> (Decimal, Decimal) {
    let mut remaining = target_qty;
    let mut filled = Decimal::ZERO;
    let mut notional = Decimal::ZERO;

    for &(price, qty) in levels {
        if remaining.is_zero() {
            break;
        }
        if let Some(limit) = limit_price {
            let crosses = match side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            if !crosses {
                break;
            }
        }
        let take = remaining.min(qty);
        filled += take;
        notional += take * price;
        remaining -= take;
    }

    (filled, notional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBookLevel, OrderId};
    use rust_decimal_macros::dec;

    fn config() -> ExecutionConfig {
        ExecutionConfig {
            commission_rate: dec!(0.001),
        }
    }

    fn book() -> OrderBook {
        OrderBook {
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            bids: vec![
                OrderBookLevel { price: dec!(99), quantity: dec!(5) },
                OrderBookLevel { price: dec!(98), quantity: dec!(5) },
            ],
            asks: vec![
                OrderBookLevel { price: dec!(100), quantity: dec!(5) },
                OrderBookLevel { price: dec!(101), quantity: dec!(5) },
            ],
        }
    }

    fn order(side: Side, qty: Decimal, order_type: OrderType, limit_price: Option<Decimal>) -> Order {
        Order {
            id: OrderId::generate(),
            strategy_name: "test".into(),
            symbol: "BTCUSD".into(),
            timestamp_ms: 1,
            side,
            quantity: qty,
            order_type,
            limit_price,
            simulated_fallback: false,
        }
    }

    #[test]
    fn market_buy_walks_ask_side_weighted_average() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(7), OrderType::Market, None);
        let fill = handler.execute(&o, Some(&book())).unwrap();
        assert_eq!(fill.quantity, dec!(7));
        // 5 @ 100 + 2 @ 101 = 702, /7 = 100.285714...
        assert!((fill.fill_price - dec!(100.2857142857142857142857143)).abs() < dec!(0.0000001));
    }

    #[test]
    fn market_buy_partial_fill_reports_remaining() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(20), OrderType::Market, None);
        let (fill, failure) = handler.execute_reporting_partial(&o, Some(&book()));
        let fill = fill.unwrap();
        assert_eq!(fill.quantity, dec!(10)); // only 10 total ask depth
        let failure = failure.unwrap();
        assert!(matches!(
            failure.reason,
            OrderFailureReason::PartialFill { remaining, .. } if remaining == dec!(10)
        ));
    }

    #[test]
    fn no_book_is_no_liquidity() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(1), OrderType::Market, None);
        let err = handler.execute(&o, None).unwrap_err();
        assert!(matches!(err.reason, OrderFailureReason::NoLiquidity));
    }

    #[test]
    fn non_positive_quantity_is_invalid_order() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(0), OrderType::Market, None);
        let err = handler.execute(&o, Some(&book())).unwrap_err();
        assert!(matches!(err.reason, OrderFailureReason::InvalidOrder { .. }));
    }

    #[test]
    fn limit_order_only_fills_crossing_levels() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(10), OrderType::Limit, Some(dec!(100)));
        let fill = handler.execute(&o, Some(&book())).unwrap();
        assert_eq!(fill.quantity, dec!(5)); // only the 100 level crosses
    }

    #[test]
    fn limit_order_with_no_crossing_level_is_not_filled() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(1), OrderType::Limit, Some(dec!(50)));
        let err = handler.execute(&o, Some(&book())).unwrap_err();
        assert!(matches!(err.reason, OrderFailureReason::NotFilled));
    }

    #[test]
    fn commission_applied_at_configured_rate() {
        let handler = ExecutionHandler::new(config());
        let o = order(Side::Buy, dec!(5), OrderType::Market, None);
        let fill = handler.execute(&o, Some(&book())).unwrap();
        assert_eq!(fill.commission, fill.fill_price * fill.quantity * dec!(0.001));
    }
}
