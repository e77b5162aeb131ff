//! OHLCV bar representation.
//!
//! A bar sequence is a plain `[Bar]` slice in ascending timestamp order;
//! index order is temporal order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Name of the first field that cannot be traded on: a price that is
    /// not finite and positive, or a volume that is not finite and
    /// non-negative.
    pub fn invalid_field(&self) -> Option<&'static str> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        if let Some((name, _)) = prices.into_iter().find(|(_, v)| !v.is_finite() || *v <= 0.0) {
            return Some(name);
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some("volume");
        }
        None
    }
}
