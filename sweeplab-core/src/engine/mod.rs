//! Reference portfolio simulation: one signal-driven position per column.
//!
//! Per bar, in order:
//! 1. Intrabar stops for an open position (take-profit before stop-loss),
//!    only on bars after the entry bar
//! 2. Signal exit for the open side, filled at the close
//! 3. Opposite-side entry closes the open position at the close
//! 4. Entry at the close when flat (conflicting long+short entries are skipped)
//! 5. Mark-to-market
//!
//! Columns are independent and run in parallel with rayon, in column order.

pub mod loop_runner;

pub use loop_runner::{run_column, ColumnInput};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, EntryExitSet, PriceSeries};
use crate::exits::EndOfData;
use crate::grid::TpSlPair;

/// Which sides the engine may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LongOnly,
    ShortOnly,
    Both,
}

impl Direction {
    pub fn from_flags(long: bool, short: bool) -> Option<Self> {
        match (long, short) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::LongOnly),
            (false, true) => Some(Self::ShortOnly),
            (false, false) => None,
        }
    }

    pub fn allows_long(self) -> bool {
        matches!(self, Self::LongOnly | Self::Both)
    }

    pub fn allows_short(self) -> bool {
        matches!(self, Self::ShortOnly | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Signal,
    OppositeEntry,
    EndOfData,
}

/// Engine settings shared by every column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub direction: Direction,
    /// Cash value committed per entry.
    pub size: f64,
    /// Fee rate charged on entry and exit notional.
    pub fees: f64,
    pub init_cash: f64,
    pub end_of_data: EndOfData,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            direction: Direction::Both,
            size: 100.0,
            fees: 0.001,
            init_cash: 10_000.0,
            end_of_data: EndOfData::LeaveOpen,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(EngineError::InvalidSettings(format!("size must be > 0, got {}", self.size)));
        }
        if !(self.fees.is_finite() && (0.0..1.0).contains(&self.fees)) {
            return Err(EngineError::InvalidSettings(format!("fees must be in [0, 1), got {}", self.fees)));
        }
        if !(self.init_cash.is_finite() && self.init_cash > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "init_cash must be > 0, got {}",
                self.init_cash
            )));
        }
        Ok(())
    }
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: PositionSide,
    pub entry_bar: usize,
    pub entry_price: f64,
    pub exit_bar: usize,
    pub exit_price: f64,
    pub quantity: f64,
    /// PnL after entry and exit fees.
    pub net_pnl: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    /// Net return as a fraction of the entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional == 0.0 {
            return 0.0;
        }
        self.net_pnl / notional
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// Outcome of one column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnRun {
    pub trades: Vec<ClosedTrade>,
    /// Equity per bar, marked to market at the close.
    pub equity: Vec<f64>,
    /// Position still open after the last bar (only with `LeaveOpen`).
    pub open_at_end: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Shape(#[from] DomainError),

    #[error("{expected} columns but {got} stop pairs")]
    StopsLength { expected: usize, got: usize },

    #[error("invalid engine settings: {0}")]
    InvalidSettings(String),
}

/// Simulate every column of `set` against `prices`.
///
/// `stops` is either empty (no intrabar stops) or one pair per column.
pub fn run_columns(
    prices: &PriceSeries,
    set: &EntryExitSet,
    stops: &[TpSlPair],
    settings: &EngineSettings,
) -> Result<Vec<ColumnRun>, EngineError> {
    settings.validate()?;
    prices.validate()?;
    set.validate(prices.len())?;
    if !stops.is_empty() && stops.len() != set.cols() {
        return Err(EngineError::StopsLength {
            expected: set.cols(),
            got: stops.len(),
        });
    }

    let runs = (0..set.cols())
        .into_par_iter()
        .map(|c| {
            let input = ColumnInput {
                long_entries: set.long_entries.column(c),
                short_entries: set.short_entries.column(c),
                long_exits: set.long_exits.as_ref().map(|m| m.column(c)),
                short_exits: set.short_exits.as_ref().map(|m| m.column(c)),
                stops: stops.get(c).copied(),
            };
            run_column(prices, &input, settings)
        })
        .collect();
    Ok(runs)
}
