//! Sweep Orchestrator: drives one symbol through every remaining batch.
//!
//! Per symbol:
//! 1. Open the Result Store handle and read the resume index
//! 2. Warm-up run with the strategy's `single` parameters (not persisted)
//! 3. For each batch: signals → exits (unless TP/SL-only) → fast or slow
//!    execution path → append to the store → progress
//!
//! A failing batch is logged and skipped; it never writes partial rows.

use std::sync::Arc;

use sweeplab_core::domain::{ColumnLabel, EntryExitSet, PriceSeries};
use sweeplab_core::exits::{simulate_exits, EndOfData, SimError};
use sweeplab_core::grid::{expand_over_grid, GridError, TpSlGrid, TpSlPair};
use sweeplab_core::params::{
    expand, total_combinations, Batcher, CombinationKey, ExpandedParams, ParamBatch, ParamDef, ParamError,
    ParamSpec, ParamValue, StrategyParams,
};
use sweeplab_core::signals::{SignalError, SignalGenerator, Signals};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, SweepConfig};
use crate::data_loader::LoadError;
use crate::execution::{ExecError, ExecutionEngine};
use crate::metrics::SweepStats;
use crate::store::{ResultRow, ResultStore, StoreError};

/// Per-batch failure. The batch is skipped, the sweep continues.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("signal generation: {0}")]
    Signal(#[from] SignalError),

    #[error("exit simulation: {0}")]
    Exit(#[from] SimError),

    #[error("grid expansion: {0}")]
    Grid(#[from] GridError),

    #[error("execution: {0}")]
    Exec(#[from] ExecError),

    #[error("{what}: expected {expected}, got {got}")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Params(#[from] ParamError),
}

/// Failures that stop a symbol or the whole sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("unknown strategy '{name}' (available: {available})")]
    UnknownStrategy { name: String, available: String },

    #[error("no symbols to sweep")]
    NoSymbols,

    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        source: std::io::Error,
    },
}

/// Everything fixed for the lifetime of one sweep.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub strategy: String,
    pub params: StrategyParams,
    pub expanded: ExpandedParams,
    pub grid: TpSlGrid,
    /// Fixed pair for the Exit Simulator.
    pub reference: TpSlPair,
    pub use_fast: bool,
    pub use_only_tp_sl: bool,
    pub end_of_data: EndOfData,
    pub batch_size: usize,
}

impl SweepPlan {
    pub fn from_config(config: &SweepConfig, params: StrategyParams) -> Result<Self, SweepError> {
        let sizing = &config.strategy.sizing;
        let expanded = expand(&params.multi)?;
        Ok(Self {
            strategy: config.strategy.name.clone(),
            expanded,
            params,
            grid: config.grid()?,
            reference: config.reference_pair(),
            use_fast: sizing.use_fast,
            use_only_tp_sl: sizing.use_only_tp_sl,
            end_of_data: sizing.end_of_data,
            batch_size: config.processor.batch_size,
        })
    }

    pub fn flag_forbidden(&self) -> bool {
        self.params.settings.flag_forbidden
    }

    /// Admissible combinations per symbol.
    pub fn total_combinations(&self) -> u64 {
        total_combinations(&self.expanded, self.flag_forbidden())
    }

    /// Rows one symbol produces once complete.
    pub fn rows_per_symbol(&self) -> u64 {
        self.total_combinations().saturating_mul(self.grid.len() as u64)
    }

    /// Key for the warm-up run: `single` values where given, otherwise the
    /// first value of each swept dimension.
    pub fn warmup_key(&self) -> CombinationKey {
        CombinationKey(
            self.expanded
                .names()
                .iter()
                .zip(self.expanded.dimensions())
                .map(|(name, dim)| {
                    single_value(&self.params.single, name).unwrap_or_else(|| dim[0].clone())
                })
                .collect(),
        )
    }
}

fn single_value(spec: &ParamSpec, name: &str) -> Option<ParamValue> {
    match spec.get(name)? {
        ParamDef::Scalar(v) => Some(v.clone()),
        ParamDef::Flag(b) => Some(ParamValue::Bool(*b)),
        ParamDef::List(values) => values.first().cloned(),
        ParamDef::Range(_) => None,
    }
}

/// Outcome of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSummary {
    pub symbol: String,
    pub already_done: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub rows_written: usize,
}

/// Runs batches for one symbol at a time. Shared by all workers.
pub struct Orchestrator {
    plan: SweepPlan,
    generator: Arc<dyn SignalGenerator>,
    engine: Arc<dyn ExecutionEngine>,
    store: ResultStore,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("strategy", &self.plan.strategy)
            .field("generator", &self.generator.name())
            .field("store", &self.store.dir())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        plan: SweepPlan,
        generator: Arc<dyn SignalGenerator>,
        engine: Arc<dyn ExecutionEngine>,
        store: ResultStore,
    ) -> Self {
        Self {
            plan,
            generator,
            engine,
            store,
        }
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Sweep every remaining combination of `prices.symbol`.
    ///
    /// `progress` receives the fraction of the symbol's admissible
    /// combinations stored so far, after every successful batch.
    pub fn run_symbol(
        &self,
        prices: &PriceSeries,
        progress: &mut dyn FnMut(f64),
    ) -> Result<SymbolSummary, SweepError> {
        let symbol = prices.symbol.as_str();
        let mut results = self.store.open(symbol)?;
        let done = results.combinations_done();
        let already_done = done.as_ref().map_or(0, |d| d.len());
        let mut summary = SymbolSummary {
            symbol: symbol.to_string(),
            already_done,
            ..SymbolSummary::default()
        };

        if let Err(e) = self.warm_up(prices) {
            warn!(symbol, error = %e, "warm-up run failed");
        }

        let total = self.plan.total_combinations();
        let batcher = Batcher::new(
            self.plan.expanded.clone(),
            self.plan.batch_size,
            self.plan.flag_forbidden(),
            done,
        )?;
        info!(symbol, total, already_done, bars = prices.len(), "sweeping symbol");

        let mut processed = 0usize;
        for (index, batch) in batcher.iter().enumerate() {
            let rows = match self.run_batch(prices, &batch) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(symbol, batch = index, size = batch.len(), error = %e, "batch failed, skipped");
                    summary.batches_failed += 1;
                    continue;
                }
            };
            match results.append(&rows) {
                Ok(written) => {
                    summary.rows_written += written;
                    summary.batches_ok += 1;
                    processed += batch.len();
                    debug!(symbol, batch = index, written, "batch stored");
                    progress(fraction(already_done + processed, total));
                }
                Err(e) => {
                    error!(symbol, batch = index, error = %e, "failed to store batch, skipped");
                    summary.batches_failed += 1;
                }
            }
        }

        info!(
            symbol,
            rows = summary.rows_written,
            failed = summary.batches_failed,
            "symbol finished"
        );
        Ok(summary)
    }

    /// One pass with the `single` parameters. Nothing is stored.
    pub fn warm_up(&self, prices: &PriceSeries) -> Result<(), BatchError> {
        let batch = ParamBatch::from_keys(self.plan.expanded.names(), &[self.plan.warmup_key()])?;
        let rows = self.run_batch(prices, &batch)?;
        debug!(symbol = %prices.symbol, rows = rows.len(), "warm-up ok");
        Ok(())
    }

    /// Signals, exits and execution for one batch; rows are in
    /// param-major order (combination `c`, pair `g` at `c * G + g`).
    pub fn run_batch(&self, prices: &PriceSeries, batch: &ParamBatch) -> Result<Vec<ResultRow>, BatchError> {
        let Signals { long, short } = self.generator.generate(prices, batch)?;
        for (what, m) in [("long entry columns", &long), ("short entry columns", &short)] {
            if m.cols() != batch.len() {
                return Err(BatchError::Shape {
                    what,
                    expected: batch.len(),
                    got: m.cols(),
                });
            }
        }

        let labels: Vec<ColumnLabel> = batch.keys().into_iter().map(ColumnLabel::new).collect();
        let mut set = EntryExitSet {
            long_entries: long,
            short_entries: short,
            long_exits: None,
            short_exits: None,
            labels,
        };
        if self.plan.use_fast {
            if !self.plan.use_only_tp_sl {
                self.attach_exits(prices, &mut set, self.plan.reference)?;
            }
            self.run_fast(prices, &set)
        } else {
            self.run_slow(prices, set)
        }
    }

    fn attach_exits(&self, prices: &PriceSeries, set: &mut EntryExitSet, pair: TpSlPair) -> Result<(), BatchError> {
        let (long_exits, short_exits) = simulate_exits(
            &prices.close,
            &prices.high,
            &prices.low,
            &set.long_entries,
            &set.short_entries,
            pair,
            self.plan.end_of_data,
        )?;
        set.long_exits = Some(long_exits);
        set.short_exits = Some(short_exits);
        Ok(())
    }

    /// One execution call over the batch replicated across the whole grid.
    fn run_fast(&self, prices: &PriceSeries, set: &EntryExitSet) -> Result<Vec<ResultRow>, BatchError> {
        let expanded = expand_over_grid(set, &self.plan.grid)?;
        let stops: Vec<TpSlPair> = expanded
            .sl
            .iter()
            .zip(&expanded.tp)
            .map(|(&sl, &tp)| TpSlPair::new(sl, tp))
            .collect();
        let stats = self.execute(prices, &expanded.set, &stops)?;
        Ok(expanded
            .set
            .labels
            .into_iter()
            .zip(stops)
            .zip(stats)
            .map(|((label, pair), stats)| ResultRow {
                key: label.params,
                pair: label.tp_sl.unwrap_or(pair),
                stats,
            })
            .collect())
    }

    /// One execution call per grid pair, exits re-simulated with that pair.
    fn run_slow(&self, prices: &PriceSeries, mut set: EntryExitSet) -> Result<Vec<ResultRow>, BatchError> {
        let pairs = self.plan.grid.pairs();
        let cols = set.cols();
        let mut per_pair: Vec<Vec<SweepStats>> = Vec::with_capacity(pairs.len());
        for &pair in pairs {
            if !self.plan.use_only_tp_sl {
                self.attach_exits(prices, &mut set, pair)?;
            }
            per_pair.push(self.execute(prices, &set, &vec![pair; cols])?);
        }

        let mut rows = Vec::with_capacity(cols * pairs.len());
        for (c, label) in set.labels.iter().enumerate() {
            for (g, &pair) in pairs.iter().enumerate() {
                rows.push(ResultRow {
                    key: label.params.clone(),
                    pair,
                    stats: per_pair[g][c],
                });
            }
        }
        Ok(rows)
    }

    fn execute(
        &self,
        prices: &PriceSeries,
        set: &EntryExitSet,
        stops: &[TpSlPair],
    ) -> Result<Vec<SweepStats>, BatchError> {
        let stats = self.engine.run(prices, set, stops)?;
        if stats.len() != set.cols() {
            return Err(BatchError::Shape {
                what: "statistics rows",
                expected: set.cols(),
                got: stats.len(),
            });
        }
        Ok(stats)
    }
}

/// Progress within a symbol, clamped to [0, 1]. Nothing to do counts as done.
pub fn fraction(done: usize, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done as f64 / total as f64).min(1.0)
}
