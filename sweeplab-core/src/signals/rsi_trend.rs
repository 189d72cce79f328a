//! RSI with a moving-average trend filter.
//!
//! Long when close is above the MA and RSI is below `rsi_buy`.
//! Short when close is below the MA and RSI is above `rsi_sell`.
//! `flag_ema` and `flag_sma` select the MA kind; both may be on, in which
//! case a bar fires if either MA agrees.

use crate::domain::PriceSeries;
use crate::indicators::{ema, rsi, sma};
use crate::params::{NumRange, ParamBatch, ParamDef, ParamSettings, ParamSpec, ParamValue, StrategyParams};

use super::{generate_columns, ParamView, SignalError, SignalGenerator, Signals};

#[derive(Debug, Clone, Copy, Default)]
pub struct RsiTrend;

impl RsiTrend {
    pub const NAME: &'static str = "rsi_trend";
}

fn column(prices: &PriceSeries, p: ParamView<'_>) -> Result<(Vec<bool>, Vec<bool>), SignalError> {
    let ma_len = p.period("ema_len")?;
    let rsi_len = p.period("rsi_len")?;
    let rsi_buy = p.number("rsi_buy")?;
    let rsi_sell = p.number("rsi_sell")?;

    let close = &prices.close;
    let n = close.len();
    let rsi = rsi(close, rsi_len);
    let mut averages = Vec::with_capacity(2);
    if p.flag("flag_ema") {
        averages.push(ema(close, ma_len));
    }
    if p.flag("flag_sma") {
        averages.push(sma(close, ma_len));
    }

    let mut long = vec![false; n];
    let mut short = vec![false; n];
    for ma in &averages {
        for i in 0..n {
            if close[i] > ma[i] && rsi[i] < rsi_buy {
                long[i] = true;
            }
            if close[i] < ma[i] && rsi[i] > rsi_sell {
                short[i] = true;
            }
        }
    }
    Ok((long, short))
}

impl SignalGenerator for RsiTrend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn defaults(&self) -> StrategyParams {
        let multi = ParamSpec::new()
            .with(
                "ema_len",
                ParamDef::Range(NumRange::Int {
                    min: 10,
                    max: 50,
                    step: 10,
                }),
            )
            .with(
                "rsi_len",
                ParamDef::Range(NumRange::Int {
                    min: 10,
                    max: 20,
                    step: 2,
                }),
            )
            .with(
                "rsi_buy",
                ParamDef::List(vec![ParamValue::Float(25.0), ParamValue::Float(30.0)]),
            )
            .with(
                "rsi_sell",
                ParamDef::List(vec![ParamValue::Float(70.0), ParamValue::Float(75.0)]),
            )
            .with("flag_ema", ParamDef::Flag(true))
            .with("flag_sma", ParamDef::Flag(true));
        let single = ParamSpec::new()
            .with("ema_len", ParamDef::Scalar(ParamValue::Int(20)))
            .with("rsi_len", ParamDef::Scalar(ParamValue::Int(14)))
            .with("rsi_buy", ParamDef::Scalar(ParamValue::Float(30.0)))
            .with("rsi_sell", ParamDef::Scalar(ParamValue::Float(70.0)))
            .with("flag_ema", ParamDef::Flag(true))
            .with("flag_sma", ParamDef::Flag(false));
        StrategyParams {
            multi,
            single,
            settings: ParamSettings { flag_forbidden: true },
        }
    }

    fn generate(&self, prices: &PriceSeries, batch: &ParamBatch) -> Result<Signals, SignalError> {
        generate_columns(prices, batch, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{expand, CombinationKey};

    fn batch(flag_ema: bool, flag_sma: bool) -> ParamBatch {
        let names: Vec<String> = ["ema_len", "rsi_len", "rsi_buy", "rsi_sell", "flag_ema", "flag_sma"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let key = CombinationKey(vec![
            ParamValue::Int(3),
            ParamValue::Int(2),
            ParamValue::Float(60.0),
            ParamValue::Float(40.0),
            ParamValue::Bool(flag_ema),
            ParamValue::Bool(flag_sma),
        ]);
        ParamBatch::from_keys(&names, &[key]).unwrap()
    }

    fn prices(close: &[f64]) -> PriceSeries {
        let mut s = PriceSeries::empty("TEST");
        s.close = close.to_vec();
        s
    }

    #[test]
    fn no_flags_means_no_signals() {
        let p = prices(&[1.0, 2.0, 3.0, 2.0, 1.0, 2.0]);
        let s = RsiTrend.generate(&p, &batch(false, false)).unwrap();
        assert_eq!(s.long.count_true(), 0);
        assert_eq!(s.short.count_true(), 0);
    }

    #[test]
    fn sma_mode_matches_direct_evaluation() {
        let close = [10.0, 11.0, 12.0, 13.0, 14.0, 13.9, 15.0, 12.0, 11.0];
        let p = prices(&close);
        let s = RsiTrend.generate(&p, &batch(false, true)).unwrap();
        assert_eq!(s.long.rows(), close.len());
        let ma = sma(&close, 3);
        let r = rsi(&close, 2);
        for i in 0..close.len() {
            assert_eq!(s.long.get(i, 0), close[i] > ma[i] && r[i] < 60.0, "long bar {i}");
            assert_eq!(s.short.get(i, 0), close[i] < ma[i] && r[i] > 40.0, "short bar {i}");
        }
    }

    #[test]
    fn defaults_expand_and_single_is_one_combination() {
        let d = RsiTrend.defaults();
        let multi = expand(&d.multi).unwrap();
        assert_eq!(multi.len(), 6);
        let single = expand(&d.single).unwrap();
        assert_eq!(single.combinations().count(), 1);
        assert!(d.settings.flag_forbidden);
    }

    #[test]
    fn missing_parameter_fails_the_batch() {
        let b = ParamBatch::from_keys(&["ema_len".to_string()], &[CombinationKey(vec![ParamValue::Int(3)])]).unwrap();
        let err = RsiTrend.generate(&prices(&[1.0, 2.0, 3.0]), &b).unwrap_err();
        assert_eq!(err, SignalError::MissingParam("rsi_len".into()));
    }
}
