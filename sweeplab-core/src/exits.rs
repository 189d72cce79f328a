//! Exit Simulator: turns entry signals into take-profit / stop-loss exits.
//!
//! Per column and per side, a position opens at the close of an entry bar and
//! is scanned forward from the next bar. Take-profit is checked before
//! stop-loss on the same bar. Entries while that side is open are ignored;
//! the earliest re-entry is the bar after the exit. Columns are independent
//! and scanned in parallel with rayon; column order is preserved.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::SignalMatrix;
use crate::grid::TpSlPair;

/// What to do with a position still open on the last bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfData {
    /// No exit is marked; the position stays open.
    #[default]
    LeaveOpen,
    /// Mark an exit on the last bar (unless the entry is the last bar).
    ForceClose,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("price arrays differ in length: close={close}, high={high}, low={low}")]
    PriceLength { close: usize, high: usize, low: usize },

    #[error("{side} entries have {rows} rows, prices have {bars}")]
    EntryRows {
        side: &'static str,
        rows: usize,
        bars: usize,
    },

    #[error("long entries have {long} columns, short entries have {short}")]
    ColumnMismatch { long: usize, short: usize },

    #[error("invalid stop level: {0}")]
    InvalidLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Long,
    Short,
}

/// Compute `(long_exits, short_exits)` for one TP/SL pair.
pub fn simulate_exits(
    close: &[f64],
    high: &[f64],
    low: &[f64],
    long_entries: &SignalMatrix,
    short_entries: &SignalMatrix,
    pair: TpSlPair,
    end_of_data: EndOfData,
) -> Result<(SignalMatrix, SignalMatrix), SimError> {
    let n = close.len();
    if high.len() != n || low.len() != n {
        return Err(SimError::PriceLength {
            close: n,
            high: high.len(),
            low: low.len(),
        });
    }
    for (side, m) in [("long", long_entries), ("short", short_entries)] {
        if m.rows() != n {
            return Err(SimError::EntryRows {
                side,
                rows: m.rows(),
                bars: n,
            });
        }
    }
    if long_entries.cols() != short_entries.cols() {
        return Err(SimError::ColumnMismatch {
            long: long_entries.cols(),
            short: short_entries.cols(),
        });
    }
    pair.validate().map_err(SimError::InvalidLevel)?;

    let prices = Prices { close, high, low };
    let long = scan_matrix(&prices, long_entries, Side::Long, pair, end_of_data);
    let short = scan_matrix(&prices, short_entries, Side::Short, pair, end_of_data);
    Ok((long, short))
}

struct Prices<'a> {
    close: &'a [f64],
    high: &'a [f64],
    low: &'a [f64],
}

fn scan_matrix(
    prices: &Prices<'_>,
    entries: &SignalMatrix,
    side: Side,
    pair: TpSlPair,
    end_of_data: EndOfData,
) -> SignalMatrix {
    let rows = entries.rows();
    let columns: Vec<Vec<bool>> = (0..entries.cols())
        .into_par_iter()
        .map(|c| scan_column(prices, entries.column(c), side, pair, end_of_data))
        .collect();
    let mut out = SignalMatrix::new(rows, columns.len());
    for (c, column) in columns.into_iter().enumerate() {
        out.column_mut(c).copy_from_slice(&column);
    }
    out
}

fn scan_column(
    prices: &Prices<'_>,
    entries: &[bool],
    side: Side,
    pair: TpSlPair,
    end_of_data: EndOfData,
) -> Vec<bool> {
    let n = entries.len();
    let mut exits = vec![false; n];
    let mut i = 0;
    while i < n {
        let entry = prices.close[i];
        if !entries[i] || !entry.is_finite() {
            i += 1;
            continue;
        }
        let (take_profit, stop_loss) = match side {
            Side::Long => (entry * (1.0 + pair.tp), entry * (1.0 - pair.sl)),
            Side::Short => (entry * (1.0 - pair.tp), entry * (1.0 + pair.sl)),
        };
        let hit = (i + 1..n).find(|&j| match side {
            Side::Long => prices.high[j] >= take_profit || prices.low[j] <= stop_loss,
            Side::Short => prices.low[j] <= take_profit || prices.high[j] >= stop_loss,
        });
        match hit {
            Some(j) => {
                exits[j] = true;
                i = j + 1;
            }
            None => {
                if end_of_data == EndOfData::ForceClose && i + 1 < n {
                    exits[n - 1] = true;
                }
                break;
            }
        }
    }
    exits
}
