//! Sweep statistics: pure functions over one column's equity curve and trades.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.
//! Percentages are stored as percent (15.0 = 15%), matching the result file.

use serde::{Deserialize, Serialize};
use sweeplab_core::engine::{ClosedTrade, ColumnRun};

/// Names of the statistics columns, in result-file order.
pub const STAT_COLUMNS: [&str; 6] = [
    "Max Drawdown [%]",
    "Profit Factor",
    "Sharpe Ratio",
    "Total Trades",
    "Win Rate [%]",
    "Total Return [%]",
];

/// Statistics for one column of one execution call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SweepStats {
    /// Largest peak-to-trough decline, as a positive percentage.
    pub max_drawdown_pct: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    /// Closed trades only; positions left open are not counted.
    pub total_trades: u64,
    pub win_rate_pct: f64,
    pub total_return_pct: f64,
}

impl SweepStats {
    /// Compute all statistics for one column.
    pub fn compute(run: &ColumnRun, init_cash: f64, bars_per_year: f64) -> Self {
        Self {
            max_drawdown_pct: max_drawdown(&run.equity).abs() * 100.0,
            profit_factor: profit_factor(&run.trades),
            sharpe: sharpe_ratio(&run.equity, bars_per_year),
            total_trades: run.trades.len() as u64,
            win_rate_pct: win_rate(&run.trades) * 100.0,
            total_return_pct: total_return(&run.equity, init_cash) * 100.0,
        }
    }

    /// Values in [`STAT_COLUMNS`] order.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.max_drawdown_pct,
            self.profit_factor,
            self.sharpe,
            self.total_trades as f64,
            self.win_rate_pct,
            self.total_return_pct,
        ]
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        let [max_drawdown_pct, profit_factor, sharpe, trades, win_rate_pct, total_return_pct] = values;
        Self {
            max_drawdown_pct,
            profit_factor,
            sharpe,
            total_trades: if trades.is_finite() && trades > 0.0 {
                trades.round() as u64
            } else {
                0
            },
            win_rate_pct,
            total_return_pct,
        }
    }

    /// Field by result-file column name.
    pub fn get(&self, column: &str) -> Option<f64> {
        STAT_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.to_array()[i])
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction of the initial cash.
pub fn total_return(equity_curve: &[f64], init_cash: f64) -> f64 {
    let Some(&final_eq) = equity_curve.last() else {
        return 0.0;
    };
    if init_cash <= 0.0 {
        return 0.0;
    }
    (final_eq - init_cash) / init_cash
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Sharpe ratio of per-bar returns, scaled by sqrt(bars per year).
///
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], bars_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(&returns);
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * bars_per_year.max(0.0).sqrt()
}

/// Win rate: fraction of closed trades with positive net PnL.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_win()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Per-bar simple returns of an equity curve.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
