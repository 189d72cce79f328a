//! Boolean signal matrices (time x column) and the labelled entry/exit set.
//!
//! Storage is column-major: every column is one parameter combination and
//! its bars are contiguous, so per-column scans and rayon splits over
//! columns touch disjoint slices.

use serde::{Deserialize, Serialize};

use super::DomainError;
use crate::grid::TpSlPair;
use crate::params::CombinationKey;

/// Dense boolean matrix with `rows` bars and `cols` combination columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalMatrix {
    rows: usize,
    cols: usize,
    data: Vec<bool>,
}

impl SignalMatrix {
    /// All-false matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![false; rows * cols],
        }
    }

    /// Build from per-column vectors. All columns must have `rows` entries.
    pub fn from_columns(rows: usize, columns: Vec<Vec<bool>>) -> Result<Self, DomainError> {
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for (index, column) in columns.into_iter().enumerate() {
            if column.len() != rows {
                return Err(DomainError::Ragged {
                    index,
                    expected: rows,
                    got: column.len(),
                });
            }
            data.extend(column);
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.data[col * self.rows + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.data[col * self.rows + row] = value;
    }

    pub fn column(&self, col: usize) -> &[bool] {
        let start = col * self.rows;
        &self.data[start..start + self.rows]
    }

    pub fn column_mut(&mut self, col: usize) -> &mut [bool] {
        let start = col * self.rows;
        &mut self.data[start..start + self.rows]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[bool]> + '_ {
        (0..self.cols).map(move |c| self.column(c))
    }

    /// Repeat every column `times` times in place: column `c * times + g` of
    /// the result is column `c` of `self`.
    pub fn repeat_columns(&self, times: usize) -> Self {
        let mut data = Vec::with_capacity(self.data.len() * times);
        for col in self.columns() {
            for _ in 0..times {
                data.extend_from_slice(col);
            }
        }
        Self {
            rows: self.rows,
            cols: self.cols * times,
            data,
        }
    }

    /// Keep only the columns at `indices`, in that order.
    pub fn select_columns(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.rows);
        for &c in indices {
            data.extend_from_slice(self.column(c));
        }
        Self {
            rows: self.rows,
            cols: indices.len(),
            data,
        }
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn count_true_in(&self, col: usize) -> usize {
        self.column(col).iter().filter(|&&b| b).count()
    }

    fn check_shape(&self, name: &'static str, rows: usize, cols: usize) -> Result<(), DomainError> {
        if self.rows != rows || self.cols != cols {
            return Err(DomainError::Shape {
                name,
                rows: self.rows,
                cols: self.cols,
                expected_rows: rows,
                expected_cols: cols,
            });
        }
        Ok(())
    }
}

/// Identity of one column: the parameter combination plus the (sl, tp) pair
/// once the column has been replicated over a TP/SL grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnLabel {
    pub params: CombinationKey,
    pub tp_sl: Option<TpSlPair>,
}

impl ColumnLabel {
    pub fn new(params: CombinationKey) -> Self {
        Self {
            params,
            tp_sl: None,
        }
    }

    pub fn with_pair(params: CombinationKey, pair: TpSlPair) -> Self {
        Self {
            params,
            tp_sl: Some(pair),
        }
    }
}

/// Entries, optional exits and labels for one symbol and one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryExitSet {
    pub long_entries: SignalMatrix,
    pub short_entries: SignalMatrix,
    pub long_exits: Option<SignalMatrix>,
    pub short_exits: Option<SignalMatrix>,
    pub labels: Vec<ColumnLabel>,
}

impl EntryExitSet {
    pub fn rows(&self) -> usize {
        self.long_entries.rows()
    }

    pub fn cols(&self) -> usize {
        self.labels.len()
    }

    pub fn has_exits(&self) -> bool {
        self.long_exits.is_some() || self.short_exits.is_some()
    }

    /// Every matrix must be `rows x labels.len()`.
    pub fn validate(&self, rows: usize) -> Result<(), DomainError> {
        let cols = self.labels.len();
        if self.long_entries.cols() != cols {
            return Err(DomainError::LabelCount {
                labels: cols,
                cols: self.long_entries.cols(),
            });
        }
        self.long_entries.check_shape("long_entries", rows, cols)?;
        self.short_entries.check_shape("short_entries", rows, cols)?;
        if let Some(m) = &self.long_exits {
            m.check_shape("long_exits", rows, cols)?;
        }
        if let Some(m) = &self.short_exits {
            m.check_shape("short_exits", rows, cols)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    fn key(v: i64) -> CombinationKey {
        CombinationKey(vec![ParamValue::Int(v)])
    }

    #[test]
    fn column_major_get_set() {
        let mut m = SignalMatrix::new(3, 2);
        m.set(2, 1, true);
        assert!(m.get(2, 1));
        assert_eq!(m.column(1), &[false, false, true]);
        assert_eq!(m.count_true(), 1);
    }

    #[test]
    fn from_columns_rejects_ragged() {
        let err = SignalMatrix::from_columns(2, vec![vec![true, false], vec![true]]).unwrap_err();
        assert_eq!(
            err,
            DomainError::Ragged {
                index: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn repeat_columns_is_param_major() {
        let m = SignalMatrix::from_columns(2, vec![vec![true, false], vec![false, true]]).unwrap();
        let r = m.repeat_columns(3);
        assert_eq!(r.cols(), 6);
        for g in 0..3 {
            assert_eq!(r.column(g), m.column(0));
            assert_eq!(r.column(3 + g), m.column(1));
        }
    }

    #[test]
    fn select_columns_preserves_requested_order() {
        let m = SignalMatrix::from_columns(1, vec![vec![true], vec![false], vec![true]]).unwrap();
        let s = m.select_columns(&[2, 1]);
        assert_eq!(s.cols(), 2);
        assert_eq!(s.column(0), &[true]);
        assert_eq!(s.column(1), &[false]);
    }

    #[test]
    fn entry_exit_set_validates_shapes() {
        let set = EntryExitSet {
            long_entries: SignalMatrix::new(4, 2),
            short_entries: SignalMatrix::new(4, 2),
            long_exits: Some(SignalMatrix::new(4, 2)),
            short_exits: None,
            labels: vec![ColumnLabel::new(key(1)), ColumnLabel::new(key(2))],
        };
        assert!(set.validate(4).is_ok());
        assert!(set.has_exits());

        let bad = EntryExitSet {
            short_entries: SignalMatrix::new(3, 2),
            ..set.clone()
        };
        assert!(matches!(
            bad.validate(4),
            Err(DomainError::Shape {
                name: "short_entries",
                ..
            })
        ));

        let mislabeled = EntryExitSet {
            labels: vec![ColumnLabel::new(key(1))],
            ..set
        };
        assert!(matches!(
            mislabeled.validate(4),
            Err(DomainError::LabelCount { labels: 1, cols: 2 })
        ));
    }
}
