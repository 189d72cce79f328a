//! Moving average crossover: golden cross and death cross detection.
//!
//! Fires Long when the fast MA crosses above the slow MA.
//! Fires Short when the fast MA crosses below the slow MA.
//! `use_ema` switches both averages from SMA to EMA. A combination with
//! `fast_len >= slow_len` produces no signals.

use crate::domain::PriceSeries;
use crate::indicators::{crossover, crossunder, ema, sma};
use crate::params::{NumRange, ParamBatch, ParamDef, ParamSettings, ParamSpec, ParamValue, StrategyParams};

use super::{generate_columns, ParamView, SignalError, SignalGenerator, Signals};

#[derive(Debug, Clone, Copy, Default)]
pub struct MaCross;

impl MaCross {
    pub const NAME: &'static str = "ma_cross";
}

fn column(prices: &PriceSeries, p: ParamView<'_>) -> Result<(Vec<bool>, Vec<bool>), SignalError> {
    let fast_len = p.period("fast_len")?;
    let slow_len = p.period("slow_len")?;
    let n = prices.len();
    if fast_len >= slow_len {
        return Ok((vec![false; n], vec![false; n]));
    }
    let average = if p.flag("use_ema") { ema } else { sma };
    let fast = average(&prices.close, fast_len);
    let slow = average(&prices.close, slow_len);
    Ok((crossover(&fast, &slow), crossunder(&fast, &slow)))
}

impl SignalGenerator for MaCross {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn defaults(&self) -> StrategyParams {
        let multi = ParamSpec::new()
            .with(
                "fast_len",
                ParamDef::Range(NumRange::Int {
                    min: 5,
                    max: 25,
                    step: 5,
                }),
            )
            .with(
                "slow_len",
                ParamDef::Range(NumRange::Int {
                    min: 30,
                    max: 100,
                    step: 10,
                }),
            )
            .with("use_ema", ParamDef::Flag(true));
        let single = ParamSpec::new()
            .with("fast_len", ParamDef::Scalar(ParamValue::Int(10)))
            .with("slow_len", ParamDef::Scalar(ParamValue::Int(50)))
            .with("use_ema", ParamDef::Flag(false));
        StrategyParams {
            multi,
            single,
            settings: ParamSettings::default(),
        }
    }

    fn generate(&self, prices: &PriceSeries, batch: &ParamBatch) -> Result<Signals, SignalError> {
        generate_columns(prices, batch, column)
    }
}
