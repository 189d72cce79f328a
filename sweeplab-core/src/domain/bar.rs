//! Bar and PriceSeries: the market data units fed to a sweep.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::DomainError;

/// OHLCV bar for a single symbol at a single timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Column-oriented price history for one symbol.
///
/// Every signal and exit matrix built for the symbol shares this time index:
/// row `i` of a matrix is bar `i` of the series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub timestamps: Vec<NaiveDateTime>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceSeries {
    /// An empty series for `symbol` (missing data).
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Build a series from bars, assumed sorted by timestamp.
    pub fn from_bars(symbol: impl Into<String>, bars: &[Bar]) -> Self {
        let n = bars.len();
        let mut series = Self {
            symbol: symbol.into(),
            timestamps: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
        };
        for bar in bars {
            series.timestamps.push(bar.timestamp);
            series.open.push(bar.open);
            series.high.push(bar.high);
            series.low.push(bar.low);
            series.close.push(bar.close);
            series.volume.push(bar.volume);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// All columns must have the same length.
    pub fn validate(&self) -> Result<(), DomainError> {
        let n = self.close.len();
        let columns = [
            ("timestamps", self.timestamps.len()),
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("volume", self.volume.len()),
        ];
        for (name, len) in columns {
            if len != n {
                return Err(DomainError::ColumnLength {
                    column: name,
                    expected: n,
                    got: len,
                });
            }
        }
        Ok(())
    }

    /// Median spacing between consecutive bars, in seconds.
    ///
    /// Returns `None` for fewer than two bars or non-increasing timestamps.
    pub fn bar_interval_secs(&self) -> Option<i64> {
        if self.timestamps.len() < 2 {
            return None;
        }
        let mut gaps: Vec<i64> = self
            .timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds())
            .filter(|&g| g > 0)
            .collect();
        if gaps.is_empty() {
            return None;
        }
        gaps.sort_unstable();
        Some(gaps[gaps.len() / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_bar() -> Bar {
        Bar {
            timestamp: ts(0),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn series_from_bars_keeps_order() {
        let mut second = sample_bar();
        second.timestamp = ts(1);
        second.close = 104.0;
        let series = PriceSeries::from_bars("BTCUSDT", &[sample_bar(), second]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.close, vec![103.0, 104.0]);
        assert!(series.validate().is_ok());
    }

    #[test]
    fn ragged_series_fails_validation() {
        let mut series = PriceSeries::from_bars("BTCUSDT", &[sample_bar()]);
        series.high.push(1.0);
        assert!(matches!(
            series.validate(),
            Err(DomainError::ColumnLength { column: "high", .. })
        ));
    }

    #[test]
    fn bar_interval_is_median_gap() {
        let bars: Vec<Bar> = [0, 1, 2, 5]
            .iter()
            .map(|&h| Bar {
                timestamp: ts(h),
                ..sample_bar()
            })
            .collect();
        let series = PriceSeries::from_bars("X", &bars);
        assert_eq!(series.bar_interval_secs(), Some(3600));
    }
}
