//! Average True Range: rolling simple mean of the true range.
//!
//! TR[i] = max(high - low, |high - close[i-1]|, |low - close[i-1]|). The
//! first bar has no predecessor, so its TR is undefined and ATR is
//! undefined for i < period.

use crate::domain::bar::Bar;

pub fn atr_at(bars: &[Bar], i: usize, period: usize) -> f64 {
    if period == 0 || i >= bars.len() || i < period {
        return f64::NAN;
    }

    let sum: f64 = ((i + 1 - period)..=i)
        .map(|k| bars[k].true_range(bars[k - 1].close))
        .sum();
    sum / period as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::hlc;

    #[test]
    fn atr_warmup() {
        let bars: Vec<_> = (0..5).map(|_| hlc(110.0, 90.0, 100.0)).collect();
        assert!(atr_at(&bars, 0, 3).is_nan());
        assert!(atr_at(&bars, 2, 3).is_nan());
        assert!(!atr_at(&bars, 3, 3).is_nan());
    }

    #[test]
    fn atr_is_simple_mean_of_true_range() {
        let bars = vec![
            hlc(110.0, 100.0, 105.0),
            hlc(115.0, 105.0, 110.0),
            hlc(120.0, 110.0, 115.0),
            hlc(140.0, 130.0, 135.0),
        ];
        // TR: 10, 10, max(10, 25, 15) = 25
        let expected = (10.0 + 10.0 + 25.0) / 3.0;
        assert!((atr_at(&bars, 3, 3) - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_uses_previous_close_for_gaps() {
        let bars = vec![hlc(110.0, 100.0, 105.0), hlc(90.0, 85.0, 88.0)];
        // high-low = 5, |90-105| = 15, |85-105| = 20
        assert!((atr_at(&bars, 1, 1) - 20.0).abs() < 1e-9);
    }
}
