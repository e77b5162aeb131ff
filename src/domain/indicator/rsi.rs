//! RSI (Relative Strength Index) over a rolling window.
//!
//! Average gain and average loss are simple means of the last `period`
//! close-to-close changes (ratio of averages, no exponential smoothing):
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)).
//!
//! If avg_loss == 0 the ratio is unbounded and RSI = 100. This includes a
//! perfectly flat window, where avg_gain is zero too.
//!
//! Undefined until `period` changes exist, i.e. for i < period.

use crate::domain::bar::Bar;

pub fn rsi_at(bars: &[Bar], i: usize, period: usize) -> f64 {
    if period == 0 || i >= bars.len() || i < period {
        return f64::NAN;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for k in (i + 1 - period)..=i {
        let change = bars[k].close - bars[k - 1].close;
        if change > 0.0 {
            gains += change;
        } else if change < 0.0 {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;

    #[test]
    fn rsi_warmup_period() {
        let bars = closes(&(0..16).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect::<Vec<_>>());
        for i in 0..14 {
            assert!(rsi_at(&bars, i, 14).is_nan(), "index {} should be undefined", i);
        }
        assert!(!rsi_at(&bars, 14, 14).is_nan());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let bars = closes(&(0..15).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        assert!((rsi_at(&bars, 14, 14) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_window_is_100() {
        let bars = closes(&[50.0; 6]);
        assert!((rsi_at(&bars, 5, 5) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let bars = closes(&(0..15).map(|i| 100.0 - i as f64).collect::<Vec<_>>());
        assert!(rsi_at(&bars, 14, 14).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_simple_mean_ratio() {
        // changes: +2, -1, +3, -2 → avg_gain = 5/4, avg_loss = 3/4
        let bars = closes(&[10.0, 12.0, 11.0, 14.0, 12.0]);
        let expected = 100.0 - 100.0 / (1.0 + 5.0 / 3.0);
        assert!((rsi_at(&bars, 4, 4) - expected).abs() < 1e-12);
    }

    #[test]
    fn rsi_only_uses_trailing_window() {
        // a big drop before the window must not matter
        let bars = closes(&[100.0, 50.0, 51.0, 52.0, 53.0]);
        assert!((rsi_at(&bars, 4, 3) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_in_range() {
        let prices: Vec<f64> = (1..=40).map(|i| 100.0 + (i % 7) as f64 * 2.0 - 6.0).collect();
        let bars = closes(&prices);
        for i in 14..bars.len() {
            let v = rsi_at(&bars, i, 14);
            assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
        }
    }

    #[test]
    fn rsi_zero_period_is_undefined() {
        let bars = closes(&[1.0, 2.0]);
        assert!(rsi_at(&bars, 1, 0).is_nan());
    }
}
