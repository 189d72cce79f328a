//! Aroon: time since the highest high and lowest low, as a percentage.
//!
//! Aroon Up = 100 * (period - bars_since_highest_high) / period
//! Aroon Down = 100 * (period - bars_since_lowest_low) / period
//! Oscillator = Up - Down, optionally smoothed by a zero-lag EMA.
//! Lookback: period.

pub fn aroon_up(high: &[f64], period: usize) -> Vec<f64> {
    band(high, period, |candidate, best| candidate >= best)
}

pub fn aroon_down(low: &[f64], period: usize) -> Vec<f64> {
    band(low, period, |candidate, best| candidate <= best)
}

/// Shared window scan. Ties resolve to the most recent bar.
fn band(values: &[f64], period: usize, better: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }
    for i in period..n {
        let window = &values[i - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mut best = window[0];
        let mut offset = 0;
        for (j, &v) in window.iter().enumerate() {
            if better(v, best) {
                best = v;
                offset = j;
            }
        }
        let bars_since = period - offset;
        result[i] = 100.0 * (period - bars_since) as f64 / period as f64;
    }
    result
}

/// Aroon Up minus Aroon Down, in [-100, 100].
pub fn aroon_oscillator(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    aroon_up(high, period)
        .into_iter()
        .zip(aroon_down(low, period))
        .map(|(u, d)| u - d)
        .collect()
}

/// Zero-lag EMA with error correction.
///
/// `gain_limit` is in tenths: 50 means a correction gain of 5.0. Leading NaN
/// values are passed through; the recursion seeds on the first finite value
/// and restarts after a NaN.
pub fn zero_lag(values: &[f64], length: usize, gain_limit: u32) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if length == 0 {
        return result;
    }
    let alpha = 2.0 / (length as f64 + 1.0);
    let gain = gain_limit as f64 / 10.0;

    let mut state: Option<(f64, f64)> = None;
    for (i, &x) in values.iter().enumerate() {
        if x.is_nan() {
            state = None;
            continue;
        }
        let (ema, ec) = match state {
            None => (x, x),
            Some((prev_ema, prev_ec)) => {
                let ema = alpha * x + (1.0 - alpha) * prev_ema;
                let ec = alpha * (ema + gain * (x - prev_ec)) + (1.0 - alpha) * prev_ec;
                (ema, ec)
            }
        };
        result[i] = ec;
        state = Some((ema, ec));
    }
    result
}

/// Trailing mean over up to `period` finite values, using a shorter window
/// at the start of the series.
pub fn signal_line(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }
    for i in 0..n {
        let start = (i + 1).saturating_sub(period);
        let window: Vec<f64> = values[start..=i].iter().copied().filter(|v| !v.is_nan()).collect();
        if !window.is_empty() {
            result[i] = window.iter().sum::<f64>() / window.len() as f64;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn aroon_up_highest_at_end() {
        // Highs 10..13, period 3: highest is the last bar -> 100
        let result = aroon_up(&[10.0, 11.0, 12.0, 13.0], 3);
        assert!(result[2].is_nan());
        assert_approx(result[3], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn aroon_down_lowest_at_start() {
        // Lows 10..13, period 3: lowest is 3 bars ago -> 0
        let result = aroon_down(&[10.0, 11.0, 12.0, 13.0], 3);
        assert_approx(result[3], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ties_resolve_to_most_recent() {
        let result = aroon_up(&[5.0, 5.0, 5.0], 2);
        assert_approx(result[2], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn oscillator_is_up_minus_down() {
        let high = [10.0, 11.0, 12.0, 13.0];
        let low = [9.0, 10.0, 11.0, 12.0];
        let osc = aroon_oscillator(&high, &low, 3);
        assert_approx(osc[3], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_lag_constant_input_is_constant() {
        let out = zero_lag(&[f64::NAN, 4.0, 4.0, 4.0], 5, 50);
        assert!(out[0].is_nan());
        for v in &out[1..] {
            assert_approx(*v, 4.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn signal_line_uses_partial_window_at_start() {
        let out = signal_line(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_approx(out[0], 2.0, DEFAULT_EPSILON);
        assert_approx(out[1], 3.0, DEFAULT_EPSILON);
        assert_approx(out[3], 6.0, DEFAULT_EPSILON);
    }
}
