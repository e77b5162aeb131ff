//! Exponential Moving Average of closes.
//!
//! alpha = 2/(span+1), seeded with the first close, then
//! EMA[i] = C[i]*alpha + EMA[i-1]*(1-alpha). Defined from the first bar.

use crate::domain::bar::Bar;

pub fn smoothing(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// One recursion step. `prev` is NaN for the very first observation.
pub fn next_ema(prev: f64, close: f64, span: usize) -> f64 {
    if prev.is_nan() {
        return close;
    }
    let alpha = smoothing(span);
    close * alpha + prev * (1.0 - alpha)
}

pub fn ema_series(bars: &[Bar], span: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(bars.len());
    let mut prev = f64::NAN;
    for bar in bars {
        prev = next_ema(prev, bar.close, span);
        values.push(prev);
    }
    values
}
