//! Result Store: one append-only artifact per symbol, with a resume index.
//!
//! Layout: `{root}/{strategy}/{start}_{end}/{timeframe}/{SYMBOL}.{csv|parquet}`
//!
//! Columns: `{strategy}_{param}` for every parameter, then `sl_stop`,
//! `tp_stop`, then the statistics in [`STAT_COLUMNS`] order.
//!
//! Features:
//! - Resume index: the set of parameter keys already stored for a symbol
//! - Duplicate-free appends (full key = params + TP/SL pair)
//! - CSV appends in place; Parquet rewrites atomically (.tmp, rename)
//! - Quarantine for unreadable files ({filename}.quarantined)
//! - A CSV record torn by a killed append is cut off on open
//! - `manifest.json` per result directory with BLAKE3 fingerprints

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::{Column, DataFrame, ParquetReader, ParquetWriter, PolarsError, SerReader};
use serde::{Deserialize, Serialize};
use sweeplab_core::grid::TpSlPair;
use sweeplab_core::params::{CombinationKey, ParamKind, ParamValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::{SweepStats, STAT_COLUMNS};

pub const SL_COLUMN: &str = "sl_stop";
pub const TP_COLUMN: &str = "tp_stop";
pub const MANIFEST_FILE: &str = "manifest.json";
const QUARANTINE_SUFFIX: &str = "quarantined";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    #[default]
    Csv,
    Parquet,
}

impl StoreFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path}: parquet: {message}")]
    Parquet { path: PathBuf, message: String },

    #[error("{path}: columns {found:?} do not match expected {expected:?}")]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path}: row {row}: {reason}")]
    Corrupt {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("row key has {got} values, store expects {expected}")]
    KeyWidth { expected: usize, got: usize },

    #[error("manifest: {0}")]
    Manifest(String),
}

impl StoreError {
    /// The file exists but cannot be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Csv { .. } | Self::Parquet { .. } | Self::Corrupt { .. })
    }
}

/// One persisted result: a combination under one TP/SL pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub key: CombinationKey,
    pub pair: TpSlPair,
    pub stats: SweepStats,
}

/// Result directory for one strategy, time range and timeframe.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    format: StoreFormat,
    param_count: usize,
    columns: Arc<[String]>,
    kinds: Arc<[Option<ParamKind>]>,
}

impl ResultStore {
    pub fn new(
        root: impl AsRef<Path>,
        strategy: &str,
        range: &str,
        timeframe: &str,
        format: StoreFormat,
        param_names: &[String],
    ) -> Self {
        let dir = root.as_ref().join(strategy).join(range).join(timeframe);
        let columns: Vec<String> = param_names
            .iter()
            .map(|p| format!("{strategy}_{p}"))
            .chain([SL_COLUMN.to_string(), TP_COLUMN.to_string()])
            .chain(STAT_COLUMNS.iter().map(|s| s.to_string()))
            .collect();
        Self {
            dir,
            format,
            param_count: param_names.len(),
            columns: columns.into(),
            kinds: Arc::from(Vec::new()),
        }
    }

    /// Read parameter cells back as these kinds, one per parameter in
    /// order. Without kinds every cell is parsed as its narrowest variant,
    /// so a text value like "5" would come back as an integer.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = Option<ParamKind>>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// Full header, parameter columns first.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.{}", self.format.extension()))
    }

    /// Load the symbol's index once. An unreadable file is quarantined and
    /// the symbol starts from nothing.
    pub fn open(&self, symbol: &str) -> Result<SymbolResults, StoreError> {
        let path = self.path_for(symbol);
        if self.format == StoreFormat::Csv {
            cut_torn_tail(&path)?;
        }
        let rows = match self.read_path(&path) {
            Ok(rows) => rows,
            Err(e) if e.is_corrupt() => {
                let moved = quarantine(&path)?;
                warn!(symbol, error = %e, quarantined = %moved.display(), "unreadable result file quarantined");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut results = SymbolResults {
            path,
            format: self.format,
            param_count: self.param_count,
            columns: self.columns.clone(),
            done: HashSet::new(),
            written: HashSet::new(),
        };
        for row in rows {
            results.done.insert(row.key.clone());
            results.written.insert((row.key, row.pair));
        }
        debug!(symbol, done = results.done.len(), "result index loaded");
        Ok(results)
    }

    /// Every stored row for `symbol`, in file order. Missing file → empty.
    pub fn read_rows(&self, symbol: &str) -> Result<Vec<ResultRow>, StoreError> {
        self.read_path(&self.path_for(symbol))
    }

    fn read_path(&self, path: &Path) -> Result<Vec<ResultRow>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        match self.format {
            StoreFormat::Csv => read_csv(path, &self.columns, self.param_count, &self.kinds),
            StoreFormat::Parquet => read_parquet(path, &self.columns, self.param_count, &self.kinds),
        }
    }

    /// Symbols with a result file in this directory, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let ext = self.format.extension();
        let mut symbols: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == ext))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Record the sweep's identity next to the results. A differing
    /// fingerprint only warns: keys stay structural, so resume still works.
    pub fn sync_manifest(&self, manifest: &Manifest) -> Result<ManifestStatus, StoreError> {
        let path = self.dir.join(MANIFEST_FILE);
        let status = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Manifest>(&text) {
                Ok(existing) if existing == *manifest => return Ok(ManifestStatus::Unchanged),
                Ok(existing) => {
                    warn!(
                        dir = %self.dir.display(),
                        old_params = %existing.params_fingerprint,
                        new_params = %manifest.params_fingerprint,
                        old_grid = %existing.grid_fingerprint,
                        new_grid = %manifest.grid_fingerprint,
                        "sweep definition changed since the last run"
                    );
                    ManifestStatus::Changed
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable manifest replaced");
                    ManifestStatus::Changed
                }
            },
            Err(_) => ManifestStatus::Created,
        };

        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| StoreError::Manifest(format!("serialization: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;
        Ok(status)
    }
}

/// Identity of the sweep that produced a result directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub strategy: String,
    pub params: Vec<String>,
    pub params_fingerprint: String,
    pub grid_fingerprint: String,
    pub format: StoreFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStatus {
    Created,
    Unchanged,
    Changed,
}

/// Write handle for one symbol's artifact, holding its in-memory index.
#[derive(Debug)]
pub struct SymbolResults {
    path: PathBuf,
    format: StoreFormat,
    param_count: usize,
    columns: Arc<[String]>,
    done: HashSet<CombinationKey>,
    written: HashSet<(CombinationKey, TpSlPair)>,
}

impl SymbolResults {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parameter keys already stored, without TP/SL decoration.
    /// `None` when nothing is stored yet.
    pub fn combinations_done(&self) -> Option<HashSet<CombinationKey>> {
        if self.done.is_empty() {
            None
        } else {
            Some(self.done.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    /// Append rows whose full key is new. Returns the number written.
    pub fn append(&mut self, rows: &[ResultRow]) -> Result<usize, StoreError> {
        for row in rows {
            if row.key.len() != self.param_count {
                return Err(StoreError::KeyWidth {
                    expected: self.param_count,
                    got: row.key.len(),
                });
            }
        }

        let mut seen = HashSet::new();
        let fresh: Vec<&ResultRow> = rows
            .iter()
            .filter(|r| {
                let full = (r.key.clone(), r.pair);
                !self.written.contains(&full) && seen.insert(full)
            })
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        match self.format {
            StoreFormat::Csv => append_csv(&self.path, &self.columns, &fresh)?,
            StoreFormat::Parquet => append_parquet(&self.path, &self.columns, self.param_count, &fresh)?,
        }

        for row in &fresh {
            self.done.insert(row.key.clone());
            self.written.insert((row.key.clone(), row.pair));
        }
        Ok(fresh.len())
    }
}

/// Move an unreadable file aside as `{file}.quarantined` (numbered if taken).
pub fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut target = path.with_file_name(format!("{name}.{QUARANTINE_SUFFIX}"));
    let mut n = 1;
    while target.exists() {
        target = path.with_file_name(format!("{name}.{QUARANTINE_SUFFIX}.{n}"));
        n += 1;
    }
    fs::rename(path, &target).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(target)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn schema_check(path: &Path, expected: &[String], found: Vec<String>) -> Result<(), StoreError> {
    if found.as_slice() != expected {
        return Err(StoreError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: expected.to_vec(),
            found,
        });
    }
    Ok(())
}

fn row_from_cells<'a>(
    path: &Path,
    row: usize,
    param_count: usize,
    kinds: &[Option<ParamKind>],
    params: impl IntoIterator<Item = &'a str>,
    numbers: &[f64],
) -> Result<ResultRow, StoreError> {
    let key = CombinationKey::parse_typed(params, kinds);
    if key.len() != param_count || numbers.len() != 2 + STAT_COLUMNS.len() {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            row,
            reason: "wrong number of cells".into(),
        });
    }
    let mut stats = [0.0; 6];
    stats.copy_from_slice(&numbers[2..]);
    Ok(ResultRow {
        key,
        pair: TpSlPair::new(numbers[0], numbers[1]),
        stats: SweepStats::from_array(stats),
    })
}

// ── CSV ─────────────────────────────────────────────────────────────

/// Drop a final record without its line terminator, left behind when a
/// process dies mid-append. Damage before the last line is left for the
/// reader to report.
fn cut_torn_tail(path: &Path) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(e)),
    };
    if bytes.last().map_or(true, |&b| b == b'\n') {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(keep as u64))
        .map_err(io_err)?;
    warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "unterminated last record dropped"
    );
    Ok(())
}

fn read_csv(
    path: &Path,
    columns: &[String],
    param_count: usize,
    kinds: &[Option<ParamKind>],
) -> Result<Vec<ResultRow>, StoreError> {
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false) {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let header: Vec<String> = reader.headers().map_err(csv_err)?.iter().map(str::to_string).collect();
    schema_check(path, columns, header)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let mut numbers = Vec::with_capacity(columns.len() - param_count);
        for cell in record.iter().skip(param_count) {
            let value = cell.trim().parse::<f64>().map_err(|_| StoreError::Corrupt {
                path: path.to_path_buf(),
                row: i,
                reason: format!("not a number: '{cell}'"),
            })?;
            numbers.push(value);
        }
        rows.push(row_from_cells(
            path,
            i,
            param_count,
            kinds,
            record.iter().take(param_count),
            &numbers,
        )?);
    }
    Ok(rows)
}

fn csv_cells(row: &ResultRow) -> Vec<String> {
    let stats = row.stats;
    row.key
        .values()
        .iter()
        .map(ParamValue::to_string)
        .chain([row.pair.sl.to_string(), row.pair.tp.to_string()])
        .chain([
            stats.max_drawdown_pct.to_string(),
            stats.profit_factor.to_string(),
            stats.sharpe.to_string(),
            stats.total_trades.to_string(),
            stats.win_rate_pct.to_string(),
            stats.total_return_pct.to_string(),
        ])
        .collect()
}

fn append_csv(path: &Path, columns: &[String], rows: &[&ResultRow]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    if has_content {
        let mut reader = csv::Reader::from_path(path).map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let header: Vec<String> = reader
            .headers()
            .map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();
        schema_check(path, columns, header)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if !has_content {
        writer.write_record(columns).map_err(csv_err)?;
    }
    for row in rows {
        writer.write_record(csv_cells(row)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Parquet ─────────────────────────────────────────────────────────

fn parquet_err(path: &Path) -> impl Fn(PolarsError) -> StoreError + '_ {
    move |e| StoreError::Parquet {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn load_parquet(path: &Path, columns: &[String]) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file).finish().map_err(parquet_err(path))?;
    let found: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    schema_check(path, columns, found)?;
    Ok(df)
}

fn read_parquet(
    path: &Path,
    columns: &[String],
    param_count: usize,
    kinds: &[Option<ParamKind>],
) -> Result<Vec<ResultRow>, StoreError> {
    let df = load_parquet(path, columns)?;
    let to_err = parquet_err(path);

    let mut params = Vec::with_capacity(param_count);
    for name in &columns[..param_count] {
        params.push(df.column(name).map_err(&to_err)?.str().map_err(&to_err)?.clone());
    }
    let mut numbers = Vec::with_capacity(columns.len() - param_count);
    for name in &columns[param_count..] {
        numbers.push(df.column(name).map_err(&to_err)?.f64().map_err(&to_err)?.clone());
    }

    let null_cell = |row: usize, column: &str| StoreError::Corrupt {
        path: path.to_path_buf(),
        row,
        reason: format!("null in column '{column}'"),
    };
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut cells = Vec::with_capacity(param_count);
        for (ca, name) in params.iter().zip(&columns[..param_count]) {
            cells.push(ca.get(i).ok_or_else(|| null_cell(i, name))?);
        }
        let mut values = Vec::with_capacity(numbers.len());
        for (ca, name) in numbers.iter().zip(&columns[param_count..]) {
            values.push(ca.get(i).ok_or_else(|| null_cell(i, name))?);
        }
        rows.push(row_from_cells(path, i, param_count, kinds, cells, &values)?);
    }
    Ok(rows)
}

fn rows_to_dataframe(
    path: &Path,
    columns: &[String],
    param_count: usize,
    rows: &[&ResultRow],
) -> Result<DataFrame, StoreError> {
    let mut series = Vec::with_capacity(columns.len());
    for (p, name) in columns[..param_count].iter().enumerate() {
        let values: Vec<String> = rows.iter().map(|r| r.key.values()[p].to_string()).collect();
        series.push(Column::new(name.as_str().into(), values));
    }
    let numeric: Vec<[f64; 8]> = rows
        .iter()
        .map(|r| {
            let s = r.stats.to_array();
            [r.pair.sl, r.pair.tp, s[0], s[1], s[2], s[3], s[4], s[5]]
        })
        .collect();
    for (j, name) in columns[param_count..].iter().enumerate() {
        let values: Vec<f64> = numeric.iter().map(|n| n[j]).collect();
        series.push(Column::new(name.as_str().into(), values));
    }
    DataFrame::new(series).map_err(parquet_err(path))
}

/// Read the existing table, stack the new rows under it and replace the
/// file atomically.
fn append_parquet(
    path: &Path,
    columns: &[String],
    param_count: usize,
    rows: &[&ResultRow],
) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let new_rows = rows_to_dataframe(path, columns, param_count, rows)?;
    let mut combined = if path.exists() {
        load_parquet(path, columns)?
            .vstack(&new_rows)
            .map_err(parquet_err(path))?
    } else {
        new_rows
    };

    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    ParquetWriter::new(file)
        .finish(&mut combined)
        .map_err(parquet_err(path))?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(())
}
