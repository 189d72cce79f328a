//! Work Distributor: static fork-join over symbol chunks.
//!
//! Symbols are split into at most `workers` contiguous chunks, one OS thread
//! per chunk. Each worker walks its symbols in order and reports progress
//! over an `mpsc` channel; a single aggregator on the calling thread owns
//! the progress board and invokes the display callback at a fixed interval.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::data_loader::PriceSource;
use crate::sweep::{Orchestrator, SweepError, SymbolSummary};

/// Label of the terminal progress record.
pub const DONE_LABEL: &str = "done";

/// One worker's position: current symbol, progress within it, and how many
/// of its symbols are behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub label: String,
    pub fraction: f64,
    pub completed: usize,
    pub total: usize,
}

impl ProgressRecord {
    pub fn new(label: impl Into<String>, fraction: f64, completed: usize, total: usize) -> Self {
        Self {
            label: label.into(),
            fraction: fraction.clamp(0.0, 1.0),
            completed,
            total,
        }
    }

    /// Terminal sentinel sent when a worker has finished its chunk.
    pub fn done(total: usize) -> Self {
        Self::new(DONE_LABEL, 1.0, total, total)
    }

    pub fn is_done(&self) -> bool {
        self.label == DONE_LABEL && self.completed == self.total
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub worker: usize,
    pub record: ProgressRecord,
}

/// Worker id → latest record.
pub type ProgressBoard = BTreeMap<usize, ProgressRecord>;

/// Split `items` into at most `n` contiguous, non-empty chunks whose sizes
/// differ by at most one (larger chunks first).
pub fn chunkify<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if items.is_empty() || n == 0 {
        return Vec::new();
    }
    let n = n.min(items.len());
    let (k, m) = (items.len() / n, items.len() % n);
    (0..n)
        .map(|i| {
            let start = i * k + i.min(m);
            let end = (i + 1) * k + (i + 1).min(m);
            items[start..end].to_vec()
        })
        .collect()
}

/// Result of a whole sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub symbols: Vec<SymbolSummary>,
    /// Symbols skipped for missing data or load/store errors.
    pub skipped: Vec<String>,
    /// Workers that died without finishing.
    pub failed_workers: Vec<usize>,
}

impl SweepReport {
    pub fn rows_written(&self) -> usize {
        self.symbols.iter().map(|s| s.rows_written).sum()
    }

    pub fn batches_failed(&self) -> usize {
        self.symbols.iter().map(|s| s.batches_failed).sum()
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    symbols: Vec<SymbolSummary>,
    skipped: Vec<String>,
}

pub struct Distributor {
    orchestrator: Arc<Orchestrator>,
    source: Arc<dyn PriceSource>,
    workers: usize,
    poll_interval: Duration,
}

impl Distributor {
    pub fn new(orchestrator: Arc<Orchestrator>, source: Arc<dyn PriceSource>, workers: usize) -> Self {
        Self {
            orchestrator,
            source,
            workers: workers.max(1),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run every symbol to completion. `display` sees the board at every
    /// poll tick and once more after all workers have finished.
    pub fn run<F>(&self, symbols: &[String], mut display: F) -> Result<SweepReport, SweepError>
    where
        F: FnMut(&ProgressBoard),
    {
        if symbols.is_empty() {
            return Err(SweepError::NoSymbols);
        }
        let chunks = chunkify(symbols, self.workers);
        info!(symbols = symbols.len(), workers = chunks.len(), "starting sweep");

        let (tx, rx) = mpsc::channel::<ProgressUpdate>();
        let mut handles = Vec::with_capacity(chunks.len());
        for (worker, chunk) in chunks.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let source = Arc::clone(&self.source);
            let worker_tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("sweeplab-worker-{worker}"))
                .spawn(move || run_worker(worker, &chunk, &orchestrator, source.as_ref(), &worker_tx));
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                Err(source) => {
                    error!(worker, error = %source, "failed to spawn worker, waiting for the others");
                    drop(tx);
                    let partial = join_workers(handles);
                    info!(rows = partial.rows_written(), "workers spawned before the failure finished");
                    return Err(SweepError::Spawn { worker, source });
                }
            }
        }
        drop(tx);

        let mut board = ProgressBoard::new();
        let mut last_display = Instant::now();
        loop {
            match rx.recv_timeout(self.poll_interval) {
                Ok(update) => {
                    board.insert(update.worker, update.record);
                    if last_display.elapsed() >= self.poll_interval {
                        display(&board);
                        last_display = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    display(&board);
                    last_display = Instant::now();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        display(&board);

        let report = join_workers(handles);
        info!(
            rows = report.rows_written(),
            failed_batches = report.batches_failed(),
            skipped = report.skipped.len(),
            "sweep finished"
        );
        Ok(report)
    }
}

/// Wait for every worker and merge their outcomes in worker order.
fn join_workers(handles: Vec<(usize, JoinHandle<WorkerOutcome>)>) -> SweepReport {
    let mut report = SweepReport::default();
    for (worker, handle) in handles {
        match handle.join() {
            Ok(outcome) => {
                report.symbols.extend(outcome.symbols);
                report.skipped.extend(outcome.skipped);
            }
            Err(_) => {
                error!(worker, "worker panicked");
                report.failed_workers.push(worker);
            }
        }
    }
    report
}

fn run_worker(
    worker: usize,
    symbols: &[String],
    orchestrator: &Orchestrator,
    source: &dyn PriceSource,
    tx: &Sender<ProgressUpdate>,
) -> WorkerOutcome {
    let total = symbols.len();
    // A closed channel only means nobody is watching.
    let send = |record: ProgressRecord| {
        let _ = tx.send(ProgressUpdate { worker, record });
    };
    let mut outcome = WorkerOutcome::default();

    for (idx, symbol) in symbols.iter().enumerate() {
        send(ProgressRecord::new(symbol.as_str(), 0.0, idx, total));
        let prices = match source.load(symbol) {
            Ok(p) if p.is_empty() => {
                info!(worker, symbol = %symbol, "no price data, symbol skipped");
                send(ProgressRecord::new(symbol.as_str(), 1.0, idx, total));
                outcome.skipped.push(symbol.clone());
                continue;
            }
            Ok(p) => p,
            Err(e) => {
                error!(worker, symbol = %symbol, error = %e, "failed to load prices, symbol skipped");
                send(ProgressRecord::new(symbol.as_str(), 1.0, idx, total));
                outcome.skipped.push(symbol.clone());
                continue;
            }
        };

        let mut report = |fraction: f64| send(ProgressRecord::new(symbol.as_str(), fraction, idx, total));
        match orchestrator.run_symbol(&prices, &mut report) {
            Ok(summary) => outcome.symbols.push(summary),
            Err(e) => {
                error!(worker, symbol = %symbol, error = %e, "symbol failed");
                outcome.skipped.push(symbol.clone());
            }
        }
    }

    info!(worker, symbols = total, "worker finished");
    send(ProgressRecord::done(total));
    outcome
}
