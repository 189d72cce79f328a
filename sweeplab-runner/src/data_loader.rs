//! OHLCV loading for the sweep.
//!
//! Raw bars live at `{data_dir}/{timeframe}/{SYMBOL}.csv` with the header
//! `Open Time,Open,High,Low,Close,Volume`. Loading policy:
//! 1. Missing file → empty series (the symbol is skipped by the sweep)
//! 2. Missing required column or unparseable cell → error for that symbol
//! 3. Rows sorted by time, duplicate timestamps dropped (first wins),
//!    then filtered to the configured range
//!
//! Synthetic data is a developer-only debug mode: a deterministic random
//! walk seeded from the symbol name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sweeplab_core::domain::{Bar, PriceSeries};
use thiserror::Error;

use crate::config::{timeframe_secs, TimeConfig};

pub const TIME_COLUMN: &str = "Open Time";
pub const PRICE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

const TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}: row {row}: cannot parse {column} value '{value}'")]
    BadCell {
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where a worker gets a symbol's prices from.
pub trait PriceSource: Send + Sync {
    /// An empty series means "no data": the symbol is skipped.
    fn load(&self, symbol: &str) -> Result<PriceSeries, LoadError>;
}

/// Reads raw OHLCV files for one timeframe.
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
    time: TimeConfig,
}

impl DataLoader {
    pub fn new(data_dir: impl Into<PathBuf>, time: TimeConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            time,
        }
    }

    pub fn timeframe_dir(&self) -> PathBuf {
        self.data_dir.join(&self.time.timeframe)
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.timeframe_dir().join(format!("{symbol}.csv"))
    }

    /// Load `symbol` restricted to the configured time range.
    pub fn load(&self, symbol: &str) -> Result<PriceSeries, LoadError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Ok(PriceSeries::empty(symbol));
        }
        let bars = read_bars(&path)?;
        let start = self.time.start_time();
        let end = self.time.end_time();
        let in_range: Vec<Bar> = bars
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect();
        Ok(PriceSeries::from_bars(symbol, &in_range))
    }

    /// Symbols with a CSV file in the timeframe directory, sorted.
    pub fn discover_symbols(&self) -> Result<Vec<String>, LoadError> {
        let dir = self.timeframe_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| LoadError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut symbols: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Deterministic random-walk series covering the configured range.
    pub fn synthetic(&self, symbol: &str) -> PriceSeries {
        let step = timeframe_secs(&self.time.timeframe).unwrap_or(86_400);
        generate_synthetic_series(symbol, self.time.start_time(), self.time.end_time(), step)
    }
}

impl PriceSource for DataLoader {
    fn load(&self, symbol: &str) -> Result<PriceSeries, LoadError> {
        DataLoader::load(self, symbol)
    }
}

/// Random-walk prices instead of files, for development runs.
#[derive(Debug, Clone)]
pub struct SyntheticSource(pub DataLoader);

impl PriceSource for SyntheticSource {
    fn load(&self, symbol: &str) -> Result<PriceSeries, LoadError> {
        Ok(self.0.synthetic(symbol))
    }
}

/// Read, sort and de-duplicate every bar of one CSV file.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let index_of = |column: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| LoadError::MissingColumn {
                path: path.to_path_buf(),
                column,
            })
    };
    let time_idx = index_of(TIME_COLUMN)?;
    let mut price_idx = [0usize; 5];
    for (slot, column) in price_idx.iter_mut().zip(PRICE_COLUMNS) {
        *slot = index_of(column)?;
    }

    let mut bars = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

        let raw_time = cell(time_idx);
        let timestamp = parse_timestamp(raw_time).ok_or_else(|| LoadError::BadCell {
            path: path.to_path_buf(),
            row,
            column: TIME_COLUMN,
            value: raw_time.to_string(),
        })?;

        let mut values = [0.0f64; 5];
        for ((value, &idx), column) in values.iter_mut().zip(&price_idx).zip(PRICE_COLUMNS) {
            let raw = cell(idx);
            *value = if raw.is_empty() {
                f64::NAN
            } else {
                raw.parse().map_err(|_| LoadError::BadCell {
                    path: path.to_path_buf(),
                    row,
                    column,
                    value: raw.to_string(),
                })?
            };
        }
        let [open, high, low, close, volume] = values;
        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    // Stable sort keeps file order among equal timestamps, so dedup keeps the first.
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Parse `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Generate synthetic bars for development runs.
///
/// Produces a random walk from a starting price of 100.0, one bar every
/// `step_secs`. Seeded from the symbol name, so reruns see the same data.
pub fn generate_synthetic_series(
    symbol: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    step_secs: u64,
) -> PriceSeries {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let step = Duration::seconds(step_secs.max(1) as i64);
    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        let ret: f64 = rng.gen_range(-0.02..0.02);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(1_000.0..50_000.0);

        bars.push(Bar {
            timestamp: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += step;
    }

    PriceSeries::from_bars(symbol, &bars)
}
