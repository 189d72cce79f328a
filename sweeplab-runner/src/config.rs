//! Serializable sweep configuration.
//!
//! One TOML file describes the strategy, the TP/SL sizing grid, the time
//! range, the symbol universe, worker settings and storage paths. The
//! strategy's parameter space lives in a separate file (see
//! [`SweepConfig::load_params`]).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sweeplab_core::engine::{Direction, EngineSettings};
use sweeplab_core::exits::EndOfData;
use sweeplab_core::grid::{GridError, LevelRange, TpSlGrid, TpSlPair};
use sweeplab_core::params::{ParamError, StrategyParams};
use thiserror::Error;

use crate::store::StoreFormat;

/// Unique identifier of a sweep's parameter space (content hash).
pub type Fingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("parameter file {path}: {source}")]
    Params { path: PathBuf, source: ParamError },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Top-level sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    pub strategy: StrategySection,

    #[serde(default)]
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Strategy selection and everything that shapes one backtest call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategySection {
    /// Registry name, e.g. "rsi_trend".
    pub name: String,

    /// Parameter file; defaults to `config/{name}.toml`.
    #[serde(default)]
    pub params_file: Option<PathBuf>,

    #[serde(default)]
    pub direction: DirectionConfig,

    #[serde(default)]
    pub sizing: SizingConfig,

    pub time: TimeConfig,

    #[serde(default)]
    pub symbols: SymbolsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectionConfig {
    #[serde(default = "default_true")]
    pub long: bool,
    #[serde(default = "default_true")]
    pub short: bool,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            long: true,
            short: true,
        }
    }
}

/// Position sizing, fees and the TP/SL grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SizingConfig {
    /// Fast path: expand the batch over the whole TP/SL grid and make one
    /// execution call. Otherwise one call per grid pair.
    #[serde(default = "default_true")]
    pub use_fast: bool,

    /// No simulated exit signals; positions close on TP/SL stops only.
    #[serde(default)]
    pub use_only_tp_sl: bool,

    #[serde(default)]
    pub end_of_data: EndOfData,

    /// Cash value per entry.
    #[serde(default = "default_size")]
    pub size: f64,

    #[serde(default = "default_fees")]
    pub fees: f64,

    #[serde(default = "default_init_cash")]
    pub init_cash: f64,

    #[serde(default = "LevelConfig::default_tp")]
    pub tp: LevelConfig,

    #[serde(default = "LevelConfig::default_sl")]
    pub sl: LevelConfig,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            use_fast: true,
            use_only_tp_sl: false,
            end_of_data: EndOfData::default(),
            size: default_size(),
            fees: default_fees(),
            init_cash: default_init_cash(),
            tp: LevelConfig::default_tp(),
            sl: LevelConfig::default_sl(),
        }
    }
}

/// One side of the TP/SL grid: either the fixed level or a range.
///
/// `fix` doubles as the reference level for the Exit Simulator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LevelConfig {
    pub use_fix: bool,
    pub fix: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub step: f64,
}

impl LevelConfig {
    fn default_tp() -> Self {
        Self::fixed(0.05)
    }

    fn default_sl() -> Self {
        Self::fixed(0.03)
    }

    pub fn fixed(level: f64) -> Self {
        Self {
            use_fix: true,
            fix: level,
            min: level,
            max: level,
            step: level,
        }
    }

    pub fn range(&self) -> LevelRange {
        LevelRange {
            min: self.min,
            max: self.max,
            step: self.step,
        }
    }

    /// Levels swept on this side.
    pub fn levels(&self) -> Result<Vec<f64>, GridError> {
        if self.use_fix {
            Ok(vec![self.fix])
        } else {
            self.range().values()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeConfig {
    /// First day (inclusive).
    pub start: NaiveDate,
    /// Last day (inclusive, through 23:59:59).
    pub end: NaiveDate,
    /// Bar timeframe label, e.g. "1h", "4h", "1d".
    pub timeframe: String,
}

impl TimeConfig {
    pub fn start_time(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.end.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
    }

    /// `{start}_{end}` directory label.
    pub fn range_label(&self) -> String {
        format!("{}_{}", self.start, self.end)
    }

    /// Bars per year implied by the timeframe, for annualizing the Sharpe
    /// ratio. Unknown labels fall back to daily bars.
    pub fn bars_per_year(&self) -> f64 {
        timeframe_secs(&self.timeframe)
            .map(|secs| 365.0 * 86_400.0 / secs as f64)
            .unwrap_or(365.0)
    }
}

/// Parse "15m", "1h", "4h", "1d", "1w" into seconds.
pub fn timeframe_secs(label: &str) -> Option<u64> {
    let label = label.trim();
    let split = label.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = label.split_at(split);
    let count: u64 = digits.parse().ok().filter(|&n| n > 0)?;
    let unit_secs = match unit {
        "s" => 1,
        "m" | "min" => 60,
        "h" | "H" => 3_600,
        "d" | "D" => 86_400,
        "w" | "W" => 604_800,
        _ => return None,
    };
    Some(count * unit_secs)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolsConfig {
    /// Sweep every CSV file in the timeframe directory.
    #[serde(default)]
    pub use_all: bool,
    #[serde(default)]
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub format: StoreFormat,
}

fn default_true() -> bool {
    true
}

fn default_size() -> f64 {
    100.0
}

fn default_fees() -> f64 {
    0.001
}

fn default_init_cash() -> f64 {
    10_000.0
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

impl SweepConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        if s.name.trim().is_empty() {
            return Err(ConfigError::Invalid("strategy.name must not be empty".into()));
        }
        if self.processor.workers == 0 {
            return Err(ConfigError::Invalid("processor.workers must be >= 1".into()));
        }
        if self.processor.batch_size == 0 {
            return Err(ConfigError::Invalid("processor.batch_size must be >= 1".into()));
        }
        if s.time.start > s.time.end {
            return Err(ConfigError::Invalid(format!(
                "strategy.time.start ({}) is after end ({})",
                s.time.start, s.time.end
            )));
        }
        if s.time.timeframe.trim().is_empty() {
            return Err(ConfigError::Invalid("strategy.time.timeframe must not be empty".into()));
        }
        if !s.direction.long && !s.direction.short {
            return Err(ConfigError::Invalid(
                "strategy.direction: at least one of long/short must be enabled".into(),
            ));
        }
        if !s.symbols.use_all && s.symbols.list.is_empty() {
            return Err(ConfigError::Invalid(
                "strategy.symbols.list is empty and use_all is off".into(),
            ));
        }
        self.engine_settings()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.reference_pair()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("reference TP/SL: {e}")))?;
        self.grid()?;
        Ok(())
    }

    /// Path of the strategy parameter file.
    pub fn params_path(&self) -> PathBuf {
        self.strategy
            .params_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("config").join(format!("{}.toml", self.strategy.name)))
    }

    pub fn load_params(&self) -> Result<StrategyParams, ConfigError> {
        let path = self.params_path();
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        StrategyParams::from_toml_str(&text).map_err(|source| ConfigError::Params { path, source })
    }

    /// The swept TP/SL grid: stop-loss levels outer, take-profit inner.
    pub fn grid(&self) -> Result<TpSlGrid, ConfigError> {
        let sizing = &self.strategy.sizing;
        Ok(TpSlGrid::cross(&sizing.sl.levels()?, &sizing.tp.levels()?)?)
    }

    /// Fixed pair used to simulate exit signals.
    pub fn reference_pair(&self) -> TpSlPair {
        let sizing = &self.strategy.sizing;
        TpSlPair::new(sizing.sl.fix, sizing.tp.fix)
    }

    pub fn direction(&self) -> Direction {
        let d = self.strategy.direction;
        Direction::from_flags(d.long, d.short).unwrap_or(Direction::Both)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let sizing = &self.strategy.sizing;
        EngineSettings {
            direction: self.direction(),
            size: sizing.size,
            fees: sizing.fees,
            init_cash: sizing.init_cash,
            end_of_data: sizing.end_of_data,
        }
    }

    /// Deterministic hash of the TP/SL grid.
    pub fn grid_fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        let grid = self.grid()?;
        let json = serde_json::to_string(&grid)
            .map_err(|e| ConfigError::Invalid(format!("grid serialization failed: {e}")))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Deterministic hash of a strategy's sweep space.
pub fn params_fingerprint(params: &StrategyParams) -> Fingerprint {
    let text = params.to_toml_string();
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
