//! Property tests: the fast (grid-expanded) and slow (per-pair) paths store
//! identical rows whenever their exit signals coincide.

use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;

use sweeplab_core::domain::{Bar, PriceSeries, SignalMatrix};
use sweeplab_core::engine::EngineSettings;
use sweeplab_core::exits::EndOfData;
use sweeplab_core::grid::{TpSlGrid, TpSlPair};
use sweeplab_core::params::{
    expand, CombinationKey, ParamBatch, ParamDef, ParamSpec, ParamValue, StrategyParams,
};
use sweeplab_core::signals::{SignalError, SignalGenerator, Signals};
use sweeplab_runner::{Orchestrator, PortfolioEngine, ResultStore, StoreFormat, SweepPlan};

/// Long every `every` bars, short every `every + 2` bars (offset by one).
struct Periodic;

impl SignalGenerator for Periodic {
    fn name(&self) -> &str {
        "periodic"
    }

    fn defaults(&self) -> StrategyParams {
        StrategyParams::default()
    }

    fn generate(&self, prices: &PriceSeries, batch: &ParamBatch) -> Result<Signals, SignalError> {
        let rows = prices.len();
        let mut long = SignalMatrix::new(rows, batch.len());
        let mut short = SignalMatrix::new(rows, batch.len());
        for (c, v) in batch.column("every").unwrap_or(&[]).iter().enumerate() {
            let every = v.as_usize().unwrap_or(1).max(1);
            for i in 1..rows {
                if i % every == 0 {
                    long.set(i, c, true);
                }
                if i % (every + 2) == 1 {
                    short.set(i, c, true);
                }
            }
        }
        Ok(Signals { long, short })
    }
}

fn series(steps: &[f64], wicks: &[(f64, f64)]) -> PriceSeries {
    let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut price = 100.0;
    let bars: Vec<Bar> = steps
        .iter()
        .zip(wicks)
        .enumerate()
        .map(|(i, (step, (up, down)))| {
            let open = price;
            price = (price * (1.0 + step)).max(1.0);
            Bar {
                timestamp: t0 + chrono::Duration::hours(i as i64),
                open,
                high: open.max(price) * (1.0 + up),
                low: open.min(price) * (1.0 - down),
                close: price,
                volume: 1.0,
            }
        })
        .collect();
    PriceSeries::from_bars("PROP", &bars)
}

fn orchestrator(use_fast: bool, use_only_tp_sl: bool, grid: TpSlGrid, reference: TpSlPair) -> Orchestrator {
    let multi = ParamSpec::new().with(
        "every",
        ParamDef::List((2..=6).map(ParamValue::Int).collect()),
    );
    let plan = SweepPlan {
        strategy: "periodic".into(),
        expanded: expand(&multi).unwrap(),
        params: StrategyParams {
            multi,
            ..StrategyParams::default()
        },
        grid,
        reference,
        use_fast,
        use_only_tp_sl,
        end_of_data: EndOfData::ForceClose,
        batch_size: 5,
    };
    // Nothing is written by run_batch; the directory is never created.
    let store = ResultStore::new(
        std::env::temp_dir().join("sweeplab-props-unused"),
        "periodic",
        "r",
        "1h",
        StoreFormat::Csv,
        plan.expanded.names(),
    );
    let engine = PortfolioEngine::new(
        EngineSettings {
            end_of_data: EndOfData::ForceClose,
            ..EngineSettings::default()
        },
        8_760.0,
    );
    Orchestrator::new(plan, Arc::new(Periodic), Arc::new(engine), store)
}

fn batch() -> ParamBatch {
    let keys: Vec<CombinationKey> = (2..=6).map(|e| CombinationKey(vec![ParamValue::Int(e)])).collect();
    ParamBatch::from_keys(&["every".to_string()], &keys).unwrap()
}

fn arb_market() -> impl Strategy<Value = PriceSeries> {
    (12usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(-0.04..0.04_f64, n),
            prop::collection::vec((0.0..0.03_f64, 0.0..0.03_f64), n),
        )
            .prop_map(|(steps, wicks)| series(&steps, &wicks))
    })
}

fn arb_levels() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::btree_set(1u32..8, 1..4).prop_map(|s| s.into_iter().map(|x| x as f64 / 100.0).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tp_sl_only_paths_agree(prices in arb_market(), sls in arb_levels(), tps in arb_levels()) {
        let grid = TpSlGrid::cross(&sls, &tps).unwrap();
        let reference = grid.pairs()[0];
        let fast = orchestrator(true, true, grid.clone(), reference);
        let slow = orchestrator(false, true, grid.clone(), reference);

        let fast_rows = fast.run_batch(&prices, &batch()).unwrap();
        let slow_rows = slow.run_batch(&prices, &batch()).unwrap();
        prop_assert_eq!(fast_rows.len(), 5 * grid.len());
        prop_assert_eq!(fast_rows, slow_rows);
    }

    #[test]
    fn reference_pair_grid_agrees_with_exit_signals(prices in arb_market(), sl in 1u32..8, tp in 1u32..8) {
        let pair = TpSlPair::new(sl as f64 / 100.0, tp as f64 / 100.0);
        let grid = TpSlGrid::fixed(pair.sl, pair.tp).unwrap();
        let fast = orchestrator(true, false, grid.clone(), pair);
        let slow = orchestrator(false, false, grid, pair);

        prop_assert_eq!(
            fast.run_batch(&prices, &batch()).unwrap(),
            slow.run_batch(&prices, &batch()).unwrap()
        );
    }
}
