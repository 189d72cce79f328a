//! Crossover / crossunder of two series. NaN on either bar is no cross.

/// `a` moves from at-or-below `b` to strictly above it.
pub fn crossover(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |prev_a, prev_b, a, b| a > b && prev_a <= prev_b)
}

/// `a` moves from at-or-above `b` to strictly below it.
pub fn crossunder(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |prev_a, prev_b, a, b| a < b && prev_a >= prev_b)
}

fn cross(a: &[f64], b: &[f64], test: impl Fn(f64, f64, f64, f64) -> bool) -> Vec<bool> {
    let n = a.len().min(b.len());
    let mut out = vec![false; a.len()];
    for i in 1..n {
        let vals = [a[i - 1], b[i - 1], a[i], b[i]];
        if vals.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = test(a[i - 1], b[i - 1], a[i], b[i]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_crossover_bar() {
        let a = [1.0, 2.0, 3.0, 2.0];
        let b = [2.0, 2.0, 2.0, 2.0];
        assert_eq!(crossover(&a, &b), vec![false, false, true, false]);
        assert_eq!(crossunder(&a, &b), vec![false, false, false, true]);
    }

    #[test]
    fn nan_is_never_a_cross() {
        let a = [f64::NAN, 3.0];
        let b = [2.0, 2.0];
        assert_eq!(crossover(&a, &b), vec![false, false]);
    }
}
