//! Indicators over plain `f64` slices.
//!
//! Every function returns a vector the same length as its input, with NaN
//! during the warm-up window and after a NaN input breaks the recursion.

pub mod aroon;
pub mod cross;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use aroon::{aroon_down, aroon_oscillator, aroon_up, signal_line, zero_lag};
pub use cross::{crossover, crossunder};
pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;

/// Assert two f64 values are approximately equal.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
