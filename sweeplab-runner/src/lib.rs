//! SweepLab Runner: sweep orchestration, result store, work distribution and
//! analysis.
//!
//! This crate builds on `sweeplab-core` to provide:
//! - TOML sweep configuration and fingerprinting
//! - OHLCV CSV loading, symbol discovery and synthetic series
//! - The `ExecutionEngine` seam and per-column statistics
//! - Resumable per-symbol result store (CSV or Parquet) with a manifest
//! - Batch orchestration with fast (grid-expanded) and slow paths
//! - Multi-threaded distribution over symbols with progress aggregation
//! - Cross-symbol ranking reports

pub mod config;
pub mod data_loader;
pub mod distributor;
pub mod execution;
pub mod metrics;
pub mod ranking;
pub mod session;
pub mod store;
pub mod sweep;

pub use config::{params_fingerprint, ConfigError, SweepConfig};
pub use data_loader::{DataLoader, LoadError, PriceSource, SyntheticSource};
pub use distributor::{chunkify, Distributor, ProgressBoard, ProgressRecord, SweepReport};
pub use execution::{ExecError, ExecutionEngine, PortfolioEngine};
pub use metrics::{SweepStats, STAT_COLUMNS};
pub use ranking::{write_reports, AggregateRow, AnalysisSummary, Metric};
pub use session::{result_store, SweepSession};
pub use store::{Manifest, ManifestStatus, ResultRow, ResultStore, StoreError, StoreFormat};
pub use sweep::{BatchError, Orchestrator, SweepError, SweepPlan, SymbolSummary};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<Orchestrator>();
        assert_sync::<Orchestrator>();
    }

    #[test]
    fn sweep_plan_is_send_sync() {
        assert_send::<SweepPlan>();
        assert_sync::<SweepPlan>();
    }

    #[test]
    fn store_types_are_send_sync() {
        assert_send::<ResultStore>();
        assert_sync::<ResultStore>();
        assert_send::<ResultRow>();
        assert_sync::<ResultRow>();
    }

    #[test]
    fn progress_types_are_send_sync() {
        assert_send::<ProgressRecord>();
        assert_sync::<ProgressRecord>();
        assert_send::<distributor::ProgressUpdate>();
    }

    #[test]
    fn engines_and_sources_are_send_sync() {
        assert_send::<PortfolioEngine>();
        assert_sync::<PortfolioEngine>();
        assert_send::<DataLoader>();
        assert_sync::<DataLoader>();
        assert_send::<SyntheticSource>();
        assert_sync::<SyntheticSource>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<SweepConfig>();
        assert_sync::<SweepConfig>();
    }

    #[test]
    fn session_is_send_sync() {
        assert_send::<SweepSession>();
        assert_sync::<SweepSession>();
    }
}
