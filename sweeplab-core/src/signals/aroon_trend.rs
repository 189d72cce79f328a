//! Smoothed Aroon oscillator crossing its signal line.
//!
//! The oscillator (Aroon Up - Aroon Down over `length`) is smoothed with a
//! zero-lag EMA (`smooth`, `gain_limit`). Long when it crosses above its
//! `signal_len` trailing mean, short when it crosses below.

use crate::domain::PriceSeries;
use crate::indicators::{aroon_oscillator, crossover, crossunder, signal_line, zero_lag};
use crate::params::{NumRange, ParamBatch, ParamDef, ParamSettings, ParamSpec, ParamValue, StrategyParams};

use super::{generate_columns, ParamView, SignalError, SignalGenerator, Signals};

#[derive(Debug, Clone, Copy, Default)]
pub struct AroonTrend;

impl AroonTrend {
    pub const NAME: &'static str = "aroon_trend";
}

fn column(prices: &PriceSeries, p: ParamView<'_>) -> Result<(Vec<bool>, Vec<bool>), SignalError> {
    let length = p.period("length")?;
    let smooth = p.period("smooth")?;
    let signal_len = p.period("signal_len")?;
    let gain = p.number("gain_limit")?;
    if !(0.0..=1000.0).contains(&gain) {
        return Err(SignalError::InvalidParam {
            name: "gain_limit".into(),
            value: gain.to_string(),
            reason: "expected a value in 0..=1000",
        });
    }

    let raw = aroon_oscillator(&prices.high, &prices.low, length);
    let osc = zero_lag(&raw, smooth, gain.round() as u32);
    let sig = signal_line(&osc, signal_len);
    Ok((crossover(&osc, &sig), crossunder(&osc, &sig)))
}

impl SignalGenerator for AroonTrend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn defaults(&self) -> StrategyParams {
        let range = |min, max, step| ParamDef::Range(NumRange::Int { min, max, step });
        let multi = ParamSpec::new()
            .with("length", range(10, 40, 5))
            .with("smooth", range(3, 9, 3))
            .with("gain_limit", ParamDef::List(vec![ParamValue::Int(10), ParamValue::Int(50)]))
            .with("signal_len", range(5, 15, 5));
        let single = ParamSpec::new()
            .with("length", ParamDef::Scalar(ParamValue::Int(14)))
            .with("smooth", ParamDef::Scalar(ParamValue::Int(5)))
            .with("gain_limit", ParamDef::Scalar(ParamValue::Int(50)))
            .with("signal_len", ParamDef::Scalar(ParamValue::Int(9)));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CombinationKey;

    fn wave(n: usize) -> PriceSeries {
        let mut s = PriceSeries::empty("TEST");
        for i in 0..n {
            let c = 100.0 + 10.0 * (i as f64 / 6.0).sin();
            s.close.push(c);
            s.high.push(c + 1.0);
            s.low.push(c - 1.0);
        }
        s
    }

    fn batch(gain: i64) -> ParamBatch {
        let names: Vec<String> = ["length", "smooth", "gain_limit", "signal_len"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ParamBatch::from_keys(
            &names,
            &[CombinationKey(vec![
                ParamValue::Int(5),
                ParamValue::Int(3),
                ParamValue::Int(gain),
                ParamValue::Int(3),
            ])],
        )
        .unwrap()
    }

    #[test]
    fn oscillating_market_produces_both_sides() {
        let s = AroonTrend.generate(&wave(120), &batch(10)).unwrap();
        assert!(s.long.count_true() > 0);
        assert!(s.short.count_true() > 0);
        // a bar is never both a crossover and a crossunder
        for i in 0..120 {
            assert!(!(s.long.get(i, 0) && s.short.get(i, 0)));
        }
    }

    #[test]
    fn negative_gain_is_rejected() {
        let err = AroonTrend.generate(&wave(30), &batch(-5)).unwrap_err();
        assert!(matches!(err, SignalError::InvalidParam { .. }));
    }
}
