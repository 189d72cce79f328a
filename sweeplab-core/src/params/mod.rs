//! Parameter spaces: declaration, expansion into combinations, batching.

pub mod batch;
pub mod expand;
pub mod spec;
pub mod value;

pub use batch::{Batcher, Batches, ParamBatch};
pub use expand::{expand, is_flag, total_combinations, ExpandedParams, FLAG_PREFIX};
pub use spec::{NumRange, ParamDef, ParamSettings, ParamSpec, StrategyParams};
pub use value::{CombinationKey, ParamKind, ParamValue};

/// Errors from parameter files, expansion and batching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter '{name}': {reason}")]
    Invalid { name: String, reason: String },

    #[error("parameter file is missing the [{0}] section")]
    MissingSection(&'static str),

    #[error("parameter file: {0}")]
    Toml(String),

    #[error("batch size must be >= 1")]
    ZeroBatchSize,

    #[error("combination has {got} values, expected {expected}")]
    KeyWidth { expected: usize, got: usize },
}

impl ParamError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
