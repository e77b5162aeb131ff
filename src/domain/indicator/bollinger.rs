//! Bollinger Bands over closes.
//!
//! - Middle: simple moving average of the last `period` closes
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the sample standard deviation (N-1).
//! Undefined for i < period - 1, and for period < 2.

use super::stddev::sample_stddev;
use crate::domain::bar::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    pub const UNDEFINED: Bands = Bands {
        upper: f64::NAN,
        middle: f64::NAN,
        lower: f64::NAN,
    };
}

pub fn bollinger_at(bars: &[Bar], i: usize, period: usize, multiplier: f64) -> Bands {
    if period < 2 || i >= bars.len() || i + 1 < period {
        return Bands::UNDEFINED;
    }

    let window: Vec<f64> = bars[i + 1 - period..=i].iter().map(|b| b.close).collect();
    let middle = window.iter().sum::<f64>() / period as f64;
    let stddev = sample_stddev(&window);

    Bands {
        upper: middle + multiplier * stddev,
        middle,
        lower: middle - multiplier * stddev,
    }
}
