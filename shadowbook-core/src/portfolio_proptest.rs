//! Property-based tests for the equity-reconciliation invariant (§4.3,
//! §8): after any sequence of fills and marks, `total_equity` must equal
//! `cash + Σ quantity(s) · last_price(s)` within 1e-6 relative tolerance.

use approx::assert_relative_eq;
use proptest::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::portfolio::Portfolio;
use crate::types::{Bar, Fill, OrderId, Side};

fn fill(side: Side, qty: Decimal, price: Decimal, ts: i64) -> Fill {
    Fill {
        order_id: OrderId::generate(),
        strategy_name: "prop".into(),
        symbol: "BTCUSD".into(),
        timestamp_ms: ts,
        side,
        quantity: qty,
        fill_price: price,
        commission: Decimal::ZERO,
    }
}

fn bar(close: Decimal, ts: i64) -> Bar {
    Bar {
        symbol: "BTCUSD".into(),
        timestamp_ms: ts,
        open: close,
        high: close,
        low: close,
        close,
        volume: Decimal::ZERO,
    }
}

proptest! {
    #[test]
    fn equity_reconciles_with_cash_plus_marked_positions(
        ops in prop::collection::vec((any::<bool>(), 1u32..200, 1u32..500), 1..30)
    ) {
        let mut pf = Portfolio::new(Decimal::from(1_000_000));

        for (i, (is_buy, qty, price)) in ops.into_iter().enumerate() {
            let ts = i as i64 + 1;
            let side = if is_buy { Side::Buy } else { Side::Sell };
            pf.on_fill(&fill(side, Decimal::from(qty), Decimal::from(price), ts));
            pf.on_bar(&bar(Decimal::from(price), ts));
            pf.update_time_index(ts);

            let last_price = price as f64;
            let expected_equity = pf.cash().to_f64().unwrap()
                + pf
                    .current_positions()
                    .values()
                    .map(|p| p.quantity.to_f64().unwrap() * last_price)
                    .sum::<f64>();

            assert_relative_eq!(
                pf.total_equity().to_f64().unwrap(),
                expected_equity,
                max_relative = 1e-6
            );
        }
    }
}
