//! Execution engine seam: entry/exit matrices in, per-column statistics out.

use sweeplab_core::domain::{EntryExitSet, PriceSeries};
use sweeplab_core::engine::{run_columns, EngineError, EngineSettings};
use sweeplab_core::grid::TpSlPair;
use thiserror::Error;

use crate::metrics::SweepStats;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine returned {got} columns, expected {expected}")]
    ColumnCount { expected: usize, got: usize },

    #[error("execution failed: {0}")]
    Failed(String),
}

/// Portfolio backtest over many columns at once.
///
/// Implementations must return one [`SweepStats`] per column of `set`, in
/// column order. `stops` is empty (no intrabar stops) or one pair per column.
pub trait ExecutionEngine: Send + Sync {
    fn run(
        &self,
        prices: &PriceSeries,
        set: &EntryExitSet,
        stops: &[TpSlPair],
    ) -> Result<Vec<SweepStats>, ExecError>;
}

/// Reference engine: signal-driven simulation from `sweeplab_core::engine`
/// followed by the statistics in [`crate::metrics`].
#[derive(Debug, Clone, Copy)]
pub struct PortfolioEngine {
    settings: EngineSettings,
    bars_per_year: f64,
}

impl PortfolioEngine {
    pub fn new(settings: EngineSettings, bars_per_year: f64) -> Self {
        Self {
            settings,
            bars_per_year,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl ExecutionEngine for PortfolioEngine {
    fn run(
        &self,
        prices: &PriceSeries,
        set: &EntryExitSet,
        stops: &[TpSlPair],
    ) -> Result<Vec<SweepStats>, ExecError> {
        let runs = run_columns(prices, set, stops, &self.settings)?;
        if runs.len() != set.cols() {
            return Err(ExecError::ColumnCount {
                expected: set.cols(),
                got: runs.len(),
            });
        }
        Ok(runs
            .iter()
            .map(|run| SweepStats::compute(run, self.settings.init_cash, self.bars_per_year))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sweeplab_core::domain::{ColumnLabel, SignalMatrix};
    use sweeplab_core::engine::Direction;
    use sweeplab_core::params::{CombinationKey, ParamValue};

    fn prices(close: &[f64], high: &[f64], low: &[f64]) -> PriceSeries {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PriceSeries {
            symbol: "TEST".into(),
            timestamps: (0..close.len())
                .map(|i| t0 + chrono::Duration::hours(i as i64))
                .collect(),
            open: close.to_vec(),
            high: high.to_vec(),
            low: low.to_vec(),
            close: close.to_vec(),
            volume: vec![1.0; close.len()],
        }
    }

    fn set(long: Vec<Vec<bool>>) -> EntryExitSet {
        let rows = long[0].len();
        let cols = long.len();
        EntryExitSet {
            long_entries: SignalMatrix::from_columns(rows, long).unwrap(),
            short_entries: SignalMatrix::new(rows, cols),
            long_exits: None,
            short_exits: None,
            labels: (0..cols)
                .map(|c| ColumnLabel::new(CombinationKey(vec![ParamValue::Int(c as i64)])))
                .collect(),
        }
    }

    fn engine() -> PortfolioEngine {
        PortfolioEngine::new(
            EngineSettings {
                direction: Direction::LongOnly,
                fees: 0.0,
                ..EngineSettings::default()
            },
            8_760.0,
        )
    }

    #[test]
    fn one_stat_per_column_in_order() {
        let p = prices(&[100.0, 100.0, 100.0], &[100.0, 106.0, 100.0], &[100.0, 100.0, 100.0]);
        let s = set(vec![vec![true, false, false], vec![false; 3]]);
        let stops = vec![TpSlPair::new(0.03, 0.05); 2];
        let stats = engine().run(&p, &s, &stops).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].total_trades, 1);
        assert_eq!(stats[0].win_rate_pct, 100.0);
        // size 100 at 100, take-profit at 105: +5 on 10_000
        assert!((stats[0].total_return_pct - 0.05).abs() < 1e-9);
        assert_eq!(stats[1].total_trades, 0);
        assert_eq!(stats[1].total_return_pct, 0.0);
    }

    #[test]
    fn stop_count_mismatch_is_an_error() {
        let p = prices(&[100.0, 100.0], &[100.0, 100.0], &[100.0, 100.0]);
        let s = set(vec![vec![true, false]; 3]);
        let err = engine().run(&p, &s, &[TpSlPair::new(0.1, 0.1)]).unwrap_err();
        assert!(matches!(err, ExecError::Engine(EngineError::StopsLength { .. })));
    }
}
