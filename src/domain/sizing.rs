//! Position sizing policies.

use crate::domain::position::Side;

pub trait SizingPolicy {
    /// Quantity to open at `price`. Zero means do not enter.
    fn size_position(&self, capital: f64, price: f64, side: Side) -> f64;
}

/// Commit a fixed fraction of current capital.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFraction {
    pub fraction: f64,
}

impl Default for FixedFraction {
    fn default() -> Self {
        FixedFraction { fraction: 0.1 }
    }
}

impl SizingPolicy for FixedFraction {
    fn size_position(&self, capital: f64, price: f64, _side: Side) -> f64 {
        if price <= 0.0 || capital <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        capital * self.fraction / price
    }
}

/// Trade a fixed notional, rounded down to the venue's quantity step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotionalFloor {
    pub notional: f64,
    pub quantity_step: f64,
}

impl SizingPolicy for NotionalFloor {
    fn size_position(&self, _capital: f64, price: f64, _side: Side) -> f64 {
        if price <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        let raw = self.notional / price;
        if self.quantity_step <= 0.0 {
            return raw;
        }
        // small epsilon so 0.3 / 0.1 does not floor to 2
        let steps = (raw / self.quantity_step + 1e-9).floor();
        steps * self.quantity_step
    }
}
