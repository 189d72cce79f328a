//! TP/SL grid and the fast-path grid expansion.
//!
//! A grid is either one fixed (sl, tp) pair or the cross product of a
//! stop-loss range and a take-profit range, stop-loss outer. Expansion
//! replicates every column of an `EntryExitSet` once per pair: column
//! `c * G + g` of the result is original column `c` under pair `g`.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::domain::{ColumnLabel, DomainError, EntryExitSet};

const LEVEL_TOLERANCE: f64 = 1e-9;

/// One (stop-loss, take-profit) pair, both as fractions of the entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpSlPair {
    pub sl: f64,
    pub tp: f64,
}

impl TpSlPair {
    pub fn new(sl: f64, tp: f64) -> Self {
        Self { sl, tp }
    }

    /// Both levels finite and strictly positive.
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [("sl", self.sl), ("tp", self.tp)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(format!("{name} must be a positive fraction, got {v}"));
            }
        }
        Ok(())
    }
}

impl PartialEq for TpSlPair {
    fn eq(&self, other: &Self) -> bool {
        self.sl.to_bits() == other.sl.to_bits() && self.tp.to_bits() == other.tp.to_bits()
    }
}

impl Eq for TpSlPair {}

impl Hash for TpSlPair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sl.to_bits().hash(state);
        self.tp.to_bits().hash(state);
    }
}

/// Inclusive level range, e.g. stop-loss fractions 0.01..=0.05 step 0.01.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl LevelRange {
    pub fn values(&self) -> Result<Vec<f64>, GridError> {
        let finite = self.min.is_finite() && self.max.is_finite() && self.step.is_finite();
        if !finite || self.step <= 0.0 || self.max < self.min || self.min <= 0.0 {
            return Err(GridError::InvalidRange(*self));
        }
        let count = ((self.max - self.min) / self.step + LEVEL_TOLERANCE).floor() as usize + 1;
        Ok((0..count)
            .map(|k| ((self.min + k as f64 * self.step) * 1e10).round() / 1e10)
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("TP/SL grid is empty")]
    Empty,

    #[error("invalid level range {0:?}")]
    InvalidRange(LevelRange),

    #[error("invalid TP/SL pair: {0}")]
    InvalidPair(String),

    #[error("column {0} is already labelled with a TP/SL pair")]
    AlreadyExpanded(usize),

    #[error(transparent)]
    Shape(#[from] DomainError),
}

/// Ordered set of (sl, tp) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpSlGrid {
    pairs: Vec<TpSlPair>,
}

impl TpSlGrid {
    pub fn fixed(sl: f64, tp: f64) -> Result<Self, GridError> {
        Self::from_pairs(vec![TpSlPair::new(sl, tp)])
    }

    /// Cross product, stop-loss outer and take-profit inner.
    pub fn cross(sls: &[f64], tps: &[f64]) -> Result<Self, GridError> {
        let pairs = sls
            .iter()
            .flat_map(|&sl| tps.iter().map(move |&tp| TpSlPair::new(sl, tp)))
            .collect();
        Self::from_pairs(pairs)
    }

    pub fn from_ranges(sl: LevelRange, tp: LevelRange) -> Result<Self, GridError> {
        Self::cross(&sl.values()?, &tp.values()?)
    }

    pub fn from_pairs(pairs: Vec<TpSlPair>) -> Result<Self, GridError> {
        if pairs.is_empty() {
            return Err(GridError::Empty);
        }
        for p in &pairs {
            p.validate().map_err(GridError::InvalidPair)?;
        }
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[TpSlPair] {
        &self.pairs
    }
}

/// Result of [`expand_over_grid`]: the replicated set plus per-column stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedGrid {
    pub set: EntryExitSet,
    pub tp: Vec<f64>,
    pub sl: Vec<f64>,
}

/// Replicate `set` across `grid`, param-major.
pub fn expand_over_grid(set: &EntryExitSet, grid: &TpSlGrid) -> Result<ExpandedGrid, GridError> {
    if grid.is_empty() {
        return Err(GridError::Empty);
    }
    set.validate(set.rows())?;
    if let Some(c) = set.labels.iter().position(|l| l.tp_sl.is_some()) {
        return Err(GridError::AlreadyExpanded(c));
    }

    let g = grid.len();
    let total = set.cols() * g;
    let mut labels = Vec::with_capacity(total);
    let mut tp = Vec::with_capacity(total);
    let mut sl = Vec::with_capacity(total);
    for label in &set.labels {
        for pair in grid.pairs() {
            labels.push(ColumnLabel::with_pair(label.params.clone(), *pair));
            tp.push(pair.tp);
            sl.push(pair.sl);
        }
    }

    let expanded = EntryExitSet {
        long_entries: set.long_entries.repeat_columns(g),
        short_entries: set.short_entries.repeat_columns(g),
        long_exits: set.long_exits.as_ref().map(|m| m.repeat_columns(g)),
        short_exits: set.short_exits.as_ref().map(|m| m.repeat_columns(g)),
        labels,
    };
    Ok(ExpandedGrid {
        set: expanded,
        tp,
        sl,
    })
}
