//! Cross-symbol analysis of stored sweep results.
//!
//! Reports written to `{result dir}/analysis/`:
//! - `{SYMBOL}.csv`: top N rows of one symbol by total return
//! - `{SYMBOL}_winrate.csv`: top N rows of one symbol by win rate
//! - `top100_total.csv`: mean statistics per combination across symbols,
//!   best 100 by mean total return
//! - `by_symbol.csv`: mean statistics of the combinations that were the best
//!   on at least one symbol

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use sweeplab_core::grid::TpSlPair;
use sweeplab_core::params::CombinationKey;
use tracing::info;

use crate::metrics::STAT_COLUMNS;
use crate::store::{ResultRow, ResultStore, SL_COLUMN, TP_COLUMN};

pub const ANALYSIS_DIR: &str = "analysis";
pub const AGGREGATE_TOP: usize = 100;

/// Ranking criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TotalReturn,
    WinRate,
}

impl Metric {
    pub fn column(self) -> &'static str {
        match self {
            Self::TotalReturn => "Total Return [%]",
            Self::WinRate => "Win Rate [%]",
        }
    }

    fn index(self) -> usize {
        STAT_COLUMNS
            .iter()
            .position(|c| *c == self.column())
            .unwrap_or(STAT_COLUMNS.len() - 1)
    }

    fn of_row(self, row: &ResultRow) -> f64 {
        row.stats.to_array()[self.index()]
    }
}

/// Rows of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRows {
    pub symbol: String,
    pub rows: Vec<ResultRow>,
}

/// Mean statistics of one (combination, TP/SL pair) across symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub key: CombinationKey,
    pub pair: TpSlPair,
    pub symbols: usize,
    /// In [`STAT_COLUMNS`] order.
    pub means: [f64; 6],
}

impl AggregateRow {
    pub fn mean(&self, metric: Metric) -> f64 {
        self.means[metric.index()]
    }
}

/// Descending sort key; NaN ranks last.
fn rank_value(v: f64) -> f64 {
    if v.is_nan() {
        f64::NEG_INFINITY
    } else {
        v
    }
}

/// Best `n` rows by `metric`, ties kept in stored order.
pub fn top_rows(rows: &[ResultRow], metric: Metric, n: usize) -> Vec<ResultRow> {
    let mut sorted: Vec<&ResultRow> = rows.iter().collect();
    sorted.sort_by(|a, b| rank_value(metric.of_row(b)).total_cmp(&rank_value(metric.of_row(a))));
    sorted.into_iter().take(n).cloned().collect()
}

/// Mean statistics per (key, pair), in first-seen order. Rows rejected by
/// `keep` are ignored.
pub fn aggregate<F>(data: &[SymbolRows], keep: F) -> Vec<AggregateRow>
where
    F: Fn(&ResultRow) -> bool,
{
    let mut index: HashMap<(CombinationKey, TpSlPair), usize> = HashMap::new();
    let mut sums: Vec<(CombinationKey, TpSlPair, usize, [f64; 6])> = Vec::new();
    for row in data.iter().flat_map(|s| &s.rows).filter(|r| keep(r)) {
        let slot = *index.entry((row.key.clone(), row.pair)).or_insert_with(|| {
            sums.push((row.key.clone(), row.pair, 0, [0.0; 6]));
            sums.len() - 1
        });
        let entry = &mut sums[slot];
        entry.2 += 1;
        for (acc, v) in entry.3.iter_mut().zip(row.stats.to_array()) {
            *acc += v;
        }
    }
    sums.into_iter()
        .map(|(key, pair, count, total)| AggregateRow {
            key,
            pair,
            symbols: count,
            means: total.map(|t| t / count as f64),
        })
        .collect()
}

/// Best `n` aggregates by mean `metric`.
pub fn top_aggregates(mut rows: Vec<AggregateRow>, metric: Metric, n: usize) -> Vec<AggregateRow> {
    rows.sort_by(|a, b| rank_value(b.mean(metric)).total_cmp(&rank_value(a.mean(metric))));
    rows.truncate(n);
    rows
}

/// Aggregates restricted to combinations that ranked first on some symbol.
pub fn best_per_symbol(data: &[SymbolRows], metric: Metric) -> Vec<AggregateRow> {
    let winners: HashSet<(CombinationKey, TpSlPair)> = data
        .iter()
        .filter_map(|s| top_rows(&s.rows, metric, 1).into_iter().next())
        .map(|r| (r.key, r.pair))
        .collect();
    aggregate(data, |r| winners.contains(&(r.key.clone(), r.pair)))
}

/// Every symbol's rows, read in parallel. Unreadable files are reported,
/// not quarantined.
pub fn load_all(store: &ResultStore) -> Result<Vec<SymbolRows>> {
    let symbols = store
        .symbols()
        .with_context(|| format!("listing results in {}", store.dir().display()))?;
    symbols
        .into_par_iter()
        .map(|symbol| {
            let rows = store
                .read_rows(&symbol)
                .with_context(|| format!("reading results for {symbol}"))?;
            Ok(SymbolRows { symbol, rows })
        })
        .collect()
}

/// What [`write_reports`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub dir: PathBuf,
    pub symbols: usize,
    pub files: Vec<PathBuf>,
}

/// Write every report for the store's result directory.
pub fn write_reports(store: &ResultStore, top: usize) -> Result<AnalysisSummary> {
    let data = load_all(store)?;
    let out_dir = store.dir().join(ANALYSIS_DIR);
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let param_columns = &store.columns()[..store.columns().len() - 2 - STAT_COLUMNS.len()];
    let mut summary = AnalysisSummary {
        dir: out_dir.clone(),
        symbols: data.len(),
        files: Vec::new(),
    };

    for s in &data {
        for (metric, suffix) in [(Metric::TotalReturn, ""), (Metric::WinRate, "_winrate")] {
            let path = out_dir.join(format!("{}{suffix}.csv", s.symbol));
            write_rows(&path, param_columns, &top_rows(&s.rows, metric, top))?;
            summary.files.push(path);
        }
    }

    let overall = top_aggregates(aggregate(&data, |_| true), Metric::TotalReturn, AGGREGATE_TOP);
    let path = out_dir.join("top100_total.csv");
    write_aggregates(&path, param_columns, &overall)?;
    summary.files.push(path);

    let winners = top_aggregates(
        best_per_symbol(&data, Metric::TotalReturn),
        Metric::TotalReturn,
        usize::MAX,
    );
    let path = out_dir.join("by_symbol.csv");
    write_aggregates(&path, param_columns, &winners)?;
    summary.files.push(path);

    info!(dir = %out_dir.display(), symbols = data.len(), files = summary.files.len(), "analysis written");
    Ok(summary)
}

fn header(param_columns: &[String], extra: Option<&str>) -> Vec<String> {
    param_columns
        .iter()
        .cloned()
        .chain([SL_COLUMN.to_string(), TP_COLUMN.to_string()])
        .chain(extra.map(str::to_string))
        .chain(STAT_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

fn key_cells(key: &CombinationKey, pair: TpSlPair) -> impl Iterator<Item = String> + '_ {
    key.values()
        .iter()
        .map(|v| v.to_string())
        .chain([pair.sl.to_string(), pair.tp.to_string()])
}

fn write_rows(path: &Path, param_columns: &[String], rows: &[ResultRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(header(param_columns, None))?;
    for row in rows {
        let cells: Vec<String> = key_cells(&row.key, row.pair)
            .chain(row.stats.to_array().iter().map(|v| v.to_string()))
            .collect();
        writer.write_record(cells)?;
    }
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_aggregates(path: &Path, param_columns: &[String], rows: &[AggregateRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(header(param_columns, Some("Symbols")))?;
    for row in rows {
        let cells: Vec<String> = key_cells(&row.key, row.pair)
            .chain([row.symbols.to_string()])
            .chain(row.means.iter().map(|v| v.to_string()))
            .collect();
        writer.write_record(cells)?;
    }
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SweepStats;
    use crate::store::StoreFormat;
    use sweeplab_core::params::ParamValue;

    fn row(k: i64, ret: f64, win: f64) -> ResultRow {
        ResultRow {
            key: CombinationKey(vec![ParamValue::Int(k)]),
            pair: TpSlPair::new(0.03, 0.05),
            stats: SweepStats {
                total_return_pct: ret,
                win_rate_pct: win,
                total_trades: 1,
                ..SweepStats::default()
            },
        }
    }

    fn data() -> Vec<SymbolRows> {
        vec![
            SymbolRows {
                symbol: "A".into(),
                rows: vec![row(1, 10.0, 20.0), row(2, 5.0, 80.0), row(3, f64::NAN, 0.0)],
            },
            SymbolRows {
                symbol: "B".into(),
                rows: vec![row(1, -2.0, 40.0), row(2, 7.0, 60.0)],
            },
        ]
    }

    #[test]
    fn top_rows_sorts_descending_nan_last() {
        let rows = &data()[0].rows;
        let by_return: Vec<i64> = top_rows(rows, Metric::TotalReturn, 3)
            .iter()
            .map(|r| r.key.values()[0].as_i64().unwrap())
            .collect();
        assert_eq!(by_return, vec![1, 2, 3]);
        let by_win = top_rows(rows, Metric::WinRate, 1);
        assert_eq!(by_win[0].key, CombinationKey(vec![ParamValue::Int(2)]));
    }

    #[test]
    fn aggregate_means_across_symbols() {
        let agg = aggregate(&data(), |_| true);
        assert_eq!(agg.len(), 3);
        assert_eq!(agg[0].symbols, 2);
        assert!((agg[0].mean(Metric::TotalReturn) - 4.0).abs() < 1e-12);
        assert!((agg[1].mean(Metric::TotalReturn) - 6.0).abs() < 1e-12);

        let top = top_aggregates(agg, Metric::TotalReturn, 1);
        assert_eq!(top[0].key, CombinationKey(vec![ParamValue::Int(2)]));
    }

    #[test]
    fn best_per_symbol_keeps_winners_only() {
        // A's best is 1, B's best is 2
        let agg = best_per_symbol(&data(), Metric::TotalReturn);
        let keys: Vec<i64> = agg.iter().map(|a| a.key.values()[0].as_i64().unwrap()).collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn writes_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), "s", "r", "1h", StoreFormat::Csv, &["k".to_string()]);
        for s in data() {
            store.open(&s.symbol).unwrap().append(&s.rows).unwrap();
        }
        let summary = write_reports(&store, 2).unwrap();
        assert_eq!(summary.symbols, 2);
        assert_eq!(summary.files.len(), 6);
        for f in &summary.files {
            assert!(f.exists(), "{} missing", f.display());
        }
        let text = fs::read_to_string(summary.dir.join("A.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("s_k,sl_stop,tp_stop,Max Drawdown [%]"));
        assert!(lines[1].starts_with("1,0.03,0.05,"));
    }
}
