//! Signal generation: turns a price series and a batch of parameter
//! combinations into column-aligned long/short entry matrices.
//!
//! Generators see only prices and parameters, never portfolio state. Column
//! `c` of each output matrix belongs to combination `c` of the batch.

pub mod aroon_trend;
pub mod ma_cross;
pub mod registry;
pub mod rsi_trend;

pub use aroon_trend::AroonTrend;
pub use ma_cross::MaCross;
pub use registry::StrategyRegistry;
pub use rsi_trend::RsiTrend;

use rayon::prelude::*;

use crate::domain::{DomainError, PriceSeries, SignalMatrix};
use crate::params::{ParamBatch, ParamValue, StrategyParams};

/// Raw entry signals for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub long: SignalMatrix,
    pub short: SignalMatrix,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("parameter '{name}' = {value}: {reason}")]
    InvalidParam {
        name: String,
        value: String,
        reason: &'static str,
    },

    #[error("price series '{0}' is empty")]
    EmptySeries(String),

    #[error(transparent)]
    Shape(#[from] DomainError),

    #[error("signal generation failed: {0}")]
    Failed(String),
}

/// Trait for batch signal generators.
pub trait SignalGenerator: Send + Sync {
    /// Registry name (e.g. "rsi_trend").
    fn name(&self) -> &str;

    /// Default parameter file: a sweep space, a single combination and
    /// settings. Used by the template command.
    fn defaults(&self) -> StrategyParams;

    /// Produce `prices.len() x batch.len()` long and short entry matrices.
    fn generate(&self, prices: &PriceSeries, batch: &ParamBatch) -> Result<Signals, SignalError>;
}

/// Read-only view of one combination inside a batch.
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    batch: &'a ParamBatch,
    index: usize,
}

impl<'a> ParamView<'a> {
    pub fn new(batch: &'a ParamBatch, index: usize) -> Self {
        Self { batch, index }
    }

    fn raw(&self, name: &str) -> Result<&'a ParamValue, SignalError> {
        self.batch
            .value(self.index, name)
            .ok_or_else(|| SignalError::MissingParam(name.to_string()))
    }

    /// Period-like parameter, must be >= 1.
    pub fn period(&self, name: &str) -> Result<usize, SignalError> {
        let value = self.raw(name)?;
        match value.as_usize() {
            Some(p) if p >= 1 => Ok(p),
            _ => Err(SignalError::InvalidParam {
                name: name.to_string(),
                value: value.to_string(),
                reason: "expected an integer >= 1",
            }),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, SignalError> {
        let value = self.raw(name)?;
        value.as_f64().ok_or_else(|| SignalError::InvalidParam {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a number",
        })
    }

    /// Boolean switch; absent means off.
    pub fn flag(&self, name: &str) -> bool {
        self.batch
            .value(self.index, name)
            .is_some_and(ParamValue::is_truthy)
    }
}

/// Run `column` for every combination of `batch` in parallel and assemble
/// the results in batch order.
pub fn generate_columns<F>(prices: &PriceSeries, batch: &ParamBatch, column: F) -> Result<Signals, SignalError>
where
    F: Fn(&PriceSeries, ParamView<'_>) -> Result<(Vec<bool>, Vec<bool>), SignalError> + Sync,
{
    if prices.is_empty() {
        return Err(SignalError::EmptySeries(prices.symbol.clone()));
    }
    let pairs: Vec<(Vec<bool>, Vec<bool>)> = (0..batch.len())
        .into_par_iter()
        .map(|i| column(prices, ParamView::new(batch, i)))
        .collect::<Result<_, _>>()?;
    let (long, short): (Vec<Vec<bool>>, Vec<Vec<bool>>) = pairs.into_iter().unzip();
    let rows = prices.len();
    Ok(Signals {
        long: SignalMatrix::from_columns(rows, long)?,
        short: SignalMatrix::from_columns(rows, short)?,
    })
}
