//! Domain types for SweepLab

pub mod bar;
pub mod matrix;

pub use bar::{Bar, PriceSeries};
pub use matrix::{ColumnLabel, EntryExitSet, SignalMatrix};

/// Symbol type alias
pub type Symbol = String;

/// Shape errors raised when matrices, labels and price series disagree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("column '{column}' has {got} rows, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("matrix '{name}' is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    Shape {
        name: &'static str,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("{labels} labels for {cols} columns")]
    LabelCount { labels: usize, cols: usize },

    #[error("ragged columns: column {index} has {got} rows, expected {expected}")]
    Ragged {
        index: usize,
        expected: usize,
        got: usize,
    },
}
