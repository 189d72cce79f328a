//! Wiring of one sweep from a loaded config: strategy lookup, parameter
//! space, result store and manifest, execution engine, price source and
//! symbol list.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sweeplab_core::params::ExpandedParams;
use sweeplab_core::signals::StrategyRegistry;
use tracing::{info, warn};

use crate::config::{params_fingerprint, SweepConfig};
use crate::data_loader::{DataLoader, PriceSource, SyntheticSource};
use crate::distributor::{Distributor, ProgressBoard, SweepReport};
use crate::execution::PortfolioEngine;
use crate::store::{Manifest, ManifestStatus, ResultStore};
use crate::sweep::{Orchestrator, SweepError, SweepPlan};

/// A sweep ready to run.
pub struct SweepSession {
    orchestrator: Arc<Orchestrator>,
    source: Arc<dyn PriceSource>,
    symbols: Vec<String>,
    workers: usize,
    manifest: ManifestStatus,
}

impl std::fmt::Debug for SweepSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepSession")
            .field("orchestrator", &self.orchestrator)
            .field("symbols", &self.symbols)
            .field("workers", &self.workers)
            .field("manifest", &self.manifest)
            .finish()
    }
}

/// Result store for `config`, laid out under the configured results dir.
/// Stored keys are read back with the kinds of the expanded parameters.
pub fn result_store(config: &SweepConfig, expanded: &ExpandedParams) -> ResultStore {
    let time = &config.strategy.time;
    ResultStore::new(
        &config.paths.results_dir,
        &config.strategy.name,
        &time.range_label(),
        &time.timeframe,
        config.store.format,
        expanded.names(),
    )
    .with_kinds(expanded.kinds())
}

/// Drop repeated symbols, keeping first occurrences in order. Two workers
/// must never write the same symbol's result file.
fn unique_symbols(symbols: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(symbols.len());
    let mut unique = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if seen.contains(&symbol) {
            warn!(symbol = %symbol, "symbol listed more than once, duplicate ignored");
        } else {
            seen.insert(symbol.clone());
            unique.push(symbol);
        }
    }
    unique
}

impl SweepSession {
    /// Resolve everything a run needs. Fails before any worker starts.
    pub fn prepare(
        config: &SweepConfig,
        registry: &StrategyRegistry,
        synthetic: bool,
    ) -> Result<Self, SweepError> {
        let name = &config.strategy.name;
        let generator = registry.get(name).ok_or_else(|| SweepError::UnknownStrategy {
            name: name.clone(),
            available: registry.names().join(", "),
        })?;

        let params = config.load_params()?;
        let plan = SweepPlan::from_config(config, params)?;
        let store = result_store(config, &plan.expanded);

        let manifest = Manifest {
            strategy: name.clone(),
            params: plan.expanded.names().to_vec(),
            params_fingerprint: params_fingerprint(&plan.params),
            grid_fingerprint: config.grid_fingerprint()?,
            format: config.store.format,
        };
        let status = store.sync_manifest(&manifest)?;
        if status == ManifestStatus::Changed {
            warn!(
                dir = %store.dir().display(),
                "sweep definition differs from the stored manifest; resuming by key"
            );
        }

        let loader = DataLoader::new(&config.paths.data_dir, config.strategy.time.clone());
        let listed = if config.strategy.symbols.use_all && !synthetic {
            loader.discover_symbols()?
        } else {
            config.strategy.symbols.list.clone()
        };
        let symbols = unique_symbols(listed);
        if symbols.is_empty() {
            return Err(SweepError::NoSymbols);
        }
        let source: Arc<dyn PriceSource> = if synthetic {
            Arc::new(SyntheticSource(loader))
        } else {
            Arc::new(loader)
        };

        let engine = PortfolioEngine::new(config.engine_settings(), config.strategy.time.bars_per_year());
        info!(
            strategy = %name,
            combinations = plan.total_combinations(),
            pairs = plan.grid.len(),
            symbols = symbols.len(),
            fast = plan.use_fast,
            "sweep prepared"
        );
        let orchestrator = Orchestrator::new(plan, generator, Arc::new(engine), store);

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            source,
            symbols,
            workers: config.processor.workers,
            manifest: status,
        })
    }

    /// Override the configured worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn manifest_status(&self) -> ManifestStatus {
        self.manifest
    }

    /// Distribute the symbols over the workers and run to completion.
    pub fn run<F>(&self, poll: Duration, display: F) -> Result<SweepReport, SweepError>
    where
        F: FnMut(&ProgressBoard),
    {
        Distributor::new(Arc::clone(&self.orchestrator), Arc::clone(&self.source), self.workers)
            .with_poll_interval(poll)
            .run(&self.symbols, display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_symbols_keep_first_occurrence_order() {
        let symbols = ["ETHUSDT", "BTCUSDT", "ETHUSDT", "SOLUSDT", "BTCUSDT"]
            .map(String::from)
            .to_vec();
        assert_eq!(unique_symbols(symbols), vec!["ETHUSDT", "BTCUSDT", "SOLUSDT"]);
    }
}
