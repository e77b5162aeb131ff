//! Trailing-window statistics that exclude the bar being evaluated.
//!
//! Every value at index `i` is computed from bars `[i - window, i - 1]`, so
//! comparing bar `i` against it (a breakout above the trailing high, volume
//! above its trailing average) never compares the bar with itself.
//! Undefined for i < window.

use crate::domain::bar::Bar;

fn trailing(bars: &[Bar], i: usize, window: usize) -> Option<&[Bar]> {
    if window == 0 || i > bars.len() || i < window {
        return None;
    }
    Some(&bars[i - window..i])
}

pub fn rolling_high(bars: &[Bar], i: usize, window: usize) -> f64 {
    trailing(bars, i, window)
        .map(|w| w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max))
        .unwrap_or(f64::NAN)
}

pub fn rolling_low(bars: &[Bar], i: usize, window: usize) -> f64 {
    trailing(bars, i, window)
        .map(|w| w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min))
        .unwrap_or(f64::NAN)
}

pub fn volume_average(bars: &[Bar], i: usize, window: usize) -> f64 {
    trailing(bars, i, window)
        .map(|w| w.iter().map(|b| b.volume).sum::<f64>() / window as f64)
        .unwrap_or(f64::NAN)
}

/// Typical-price VWAP. A window without volume has no defined VWAP.
pub fn vwap(bars: &[Bar], i: usize, window: usize) -> f64 {
    let Some(w) = trailing(bars, i, window) else {
        return f64::NAN;
    };
    let volume: f64 = w.iter().map(|b| b.volume).sum();
    if volume == 0.0 {
        return f64::NAN;
    }
    w.iter().map(|b| b.typical_price() * b.volume).sum::<f64>() / volume
}
