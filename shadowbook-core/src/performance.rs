//! Pure performance analytics over a completed run (§4.7).
//!
//! Grounded on `original_source/include/core/Performance.h`: total return,
//! max drawdown, Sharpe, and historical VaR are named identically there.
//! `calculateBeta`/`calculateCorrelation` are carried over as enrichment
//! (the distilled spec only asks for the first four plus trade stats).

use rust_decimal::prelude::ToPrimitive;

use crate::portfolio::EquitySample;
use crate::types::{ClosedTrade, TimestampMs};

/// Trading-period annualization factors (§4.7).
pub const ANNUALIZATION_DAILY: f64 = 252.0;
pub const ANNUALIZATION_HOURLY: f64 = 8760.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub value_at_risk: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
}

/// Per-period simple return series derived from the equity curve (§4.7:
/// `r_i = equity_i / equity_{i-1} - 1`).
pub fn returns_series(equity_curve: &[EquitySample]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter_map(|pair| {
            let prev = pair[0].equity.to_f64()?;
            let cur = pair[1].equity.to_f64()?;
            if prev == 0.0 {
                None
            } else {
                Some(cur / prev - 1.0)
            }
        })
        .collect()
}

pub fn total_return(equity_curve: &[EquitySample], initial_capital: rust_decimal::Decimal) -> f64 {
    let Some(last) = equity_curve.last() else {
        return 0.0;
    };
    let initial = initial_capital.to_f64().unwrap_or(0.0);
    if initial == 0.0 {
        return 0.0;
    }
    last.equity.to_f64().unwrap_or(0.0) / initial - 1.0
}

/// Peak-to-trough decline, tracked as a running maximum over the curve (§3).
pub fn max_drawdown(equity_curve: &[EquitySample]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0;
    for sample in equity_curve {
        let Some(equity) = sample.equity.to_f64() else {
            continue;
        };
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > worst {
                worst = dd;
            }
        }
    }
    worst
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// `mean(r) / stdev(r) * sqrt(annualization)`; 0 when stdev < 1e-9 (§4.7).
pub fn sharpe_ratio(returns: &[f64], annualization: f64) -> f64 {
    let sigma = stdev(returns);
    if sigma < 1e-9 {
        return 0.0;
    }
    mean(returns) / sigma * annualization.sqrt()
}

/// Historical VaR(α) = `-quantile(r, 1-α)`.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let quantile_pos = (1.0 - confidence).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let idx = quantile_pos.round() as usize;
    -sorted[idx.min(sorted.len() - 1)]
}

/// Win rate and profit factor (gross profit / gross loss) from the trade log.
pub fn trade_stats(trade_log: &[ClosedTrade]) -> (f64, f64) {
    if trade_log.is_empty() {
        return (0.0, 0.0);
    }
    let wins = trade_log.iter().filter(|t| t.pnl > rust_decimal::Decimal::ZERO).count();
    let win_rate = wins as f64 / trade_log.len() as f64;

    let gross_profit: f64 = trade_log
        .iter()
        .filter(|t| t.pnl > rust_decimal::Decimal::ZERO)
        .filter_map(|t| t.pnl.to_f64())
        .sum();
    let gross_loss: f64 = trade_log
        .iter()
        .filter(|t| t.pnl < rust_decimal::Decimal::ZERO)
        .filter_map(|t| t.pnl.to_f64())
        .map(|v| v.abs())
        .sum();

    let profit_factor = if gross_loss < 1e-9 {
        if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    };

    (win_rate, profit_factor)
}

/// Beta of this return series against a benchmark (`Cov(r, b) / Var(b)`).
pub fn beta(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let n = returns.len().min(benchmark_returns.len());
    if n < 2 {
        return 0.0;
    }
    let r = &returns[..n];
    let b = &benchmark_returns[..n];
    let r_mean = mean(r);
    let b_mean = mean(b);

    let covariance: f64 = r
        .iter()
        .zip(b.iter())
        .map(|(ri, bi)| (ri - r_mean) * (bi - b_mean))
        .sum::<f64>()
        / (n - 1) as f64;
    let variance = b.iter().map(|bi| (bi - b_mean).powi(2)).sum::<f64>() / (n - 1) as f64;

    if variance < 1e-12 {
        0.0
    } else {
        covariance / variance
    }
}

/// Pearson correlation between two return series.
pub fn correlation(returns: &[f64], other_returns: &[f64]) -> f64 {
    let n = returns.len().min(other_returns.len());
    if n < 2 {
        return 0.0;
    }
    let r = &returns[..n];
    let o = &other_returns[..n];
    let r_mean = mean(r);
    let o_mean = mean(o);

    let numerator: f64 = r
        .iter()
        .zip(o.iter())
        .map(|(ri, oi)| (ri - r_mean) * (oi - o_mean))
        .sum();
    let r_var: f64 = r.iter().map(|ri| (ri - r_mean).powi(2)).sum();
    let o_var: f64 = o.iter().map(|oi| (oi - o_mean).powi(2)).sum();
    let denom = (r_var * o_var).sqrt();

    if denom < 1e-12 {
        0.0
    } else {
        numerator / denom
    }
}

/// Build the full report over `(equity_curve, initial_capital, trade_log)`
/// in one pass (§4.7).
pub fn compute_report(
    equity_curve: &[EquitySample],
    initial_capital: rust_decimal::Decimal,
    trade_log: &[ClosedTrade],
    annualization: f64,
) -> PerformanceReport {
    let returns = returns_series(equity_curve);
    let (win_rate, profit_factor) = trade_stats(trade_log);
    PerformanceReport {
        total_return: total_return(equity_curve, initial_capital),
        max_drawdown: max_drawdown(equity_curve),
        sharpe_ratio: sharpe_ratio(&returns, annualization),
        value_at_risk: value_at_risk(&returns, 0.95),
        win_rate,
        profit_factor,
        trade_count: trade_log.len(),
    }
}

/// Convenience for formatting the equity-curve CSV output (§6): `timestamp_ms, equity`.
pub fn equity_curve_rows(equity_curve: &[EquitySample]) -> Vec<(TimestampMs, rust_decimal::Decimal)> {
    equity_curve.iter().map(|s| (s.timestamp_ms, s.equity)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, VolatilityRegime, Trend};
    use rust_decimal_macros::dec;

    fn sample(ts: i64, equity: rust_decimal::Decimal) -> EquitySample {
        EquitySample {
            timestamp_ms: ts,
            equity,
            market_state: None,
        }
    }

    #[test]
    fn total_return_matches_spec_formula() {
        let curve = vec![sample(1, dec!(100000)), sample(2, dec!(100100))];
        let ret = total_return(&curve, dec!(100000));
        assert!((ret - 0.001).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let curve = vec![
            sample(1, dec!(100000)),
            sample(2, dec!(90000)),
            sample(3, dec!(95000)),
        ];
        let dd = max_drawdown(&curve);
        assert!((dd - 0.1).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_zero_when_returns_are_flat() {
        let returns = vec![0.001, 0.001, 0.001];
        assert_eq!(sharpe_ratio(&returns, ANNUALIZATION_DAILY), 0.0);
    }

    #[test]
    fn value_at_risk_is_nonnegative_for_loss_tail() {
        let returns = vec![-0.05, -0.01, 0.0, 0.01, 0.02];
        let var = value_at_risk(&returns, 0.95);
        assert!(var >= 0.0);
    }

    #[test]
    fn trade_stats_win_rate_and_profit_factor() {
        let trades = vec![
            ClosedTrade {
                symbol: "BTCUSD".into(),
                direction: Side::Sell,
                quantity: dec!(1),
                entry_price: dec!(100),
                exit_price: dec!(110),
                pnl: dec!(10),
                entry_timestamp_ms: 0,
                exit_timestamp_ms: 1,
                volatility_regime: Some(VolatilityRegime::Normal),
                trend_regime: Some(Trend::Up),
            },
            ClosedTrade {
                symbol: "BTCUSD".into(),
                direction: Side::Buy,
                quantity: dec!(1),
                entry_price: dec!(100),
                exit_price: dec!(95),
                pnl: dec!(-5),
                entry_timestamp_ms: 1,
                exit_timestamp_ms: 2,
                volatility_regime: None,
                trend_regime: None,
            },
        ];
        let (win_rate, profit_factor) = trade_stats(&trades);
        assert!((win_rate - 0.5).abs() < 1e-9);
        assert!((profit_factor - 2.0).abs() < 1e-9);
    }

    #[test]
    fn beta_of_series_against_itself_is_one() {
        let r = vec![0.01, -0.02, 0.03, 0.0, 0.015];
        assert!((beta(&r, &r) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_of_series_against_itself_is_one() {
        let r = vec![0.01, -0.02, 0.03, 0.0, 0.015];
        assert!((correlation(&r, &r) - 1.0).abs() < 1e-9);
    }
}
