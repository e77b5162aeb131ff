//! Order-flow imbalance from a depth snapshot.

use super::Signal;

/// Price levels as `(price, quantity)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthSnapshot {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl DepthSnapshot {
    pub fn bid_volume(&self) -> f64 {
        self.bids.iter().map(|(_, q)| q).sum()
    }

    pub fn ask_volume(&self) -> f64 {
        self.asks.iter().map(|(_, q)| q).sum()
    }

    /// `(bid - ask) / (bid + ask)`, in `[-1, 1]`. Zero when the book is empty.
    pub fn order_flow_imbalance(&self) -> f64 {
        let bid = self.bid_volume();
        let ask = self.ask_volume();
        let total = bid + ask;
        if total <= 0.0 || !total.is_finite() {
            return 0.0;
        }
        (bid - ask) / total
    }
}

/// Keep a directional signal only when the imbalance agrees with it by at
/// least `threshold`.
pub fn confirm(signal: Signal, imbalance: f64, threshold: f64) -> Signal {
    match signal {
        Signal::Long if imbalance >= threshold => Signal::Long,
        Signal::Short if imbalance <= -threshold => Signal::Short,
        _ => Signal::Flat,
    }
}
