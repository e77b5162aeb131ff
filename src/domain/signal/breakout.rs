//! Rule-based breakout strategy.
//!
//! Long when the close breaks above the trailing high on above-average
//! volume, trades above both VWAP and EMA, and RSI sits inside the long
//! band. Short is the mirror image against the trailing low. An optional
//! order-flow stage then vetoes signals the book does not support.

use tracing::debug;

use super::order_flow::{self, DepthSnapshot};
use super::{CausalPrefix, Signal, SignalDecision, SignalSource};

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutConfig {
    /// Open interval `(rsi_long_min, rsi_long_max)` for Long entries.
    pub rsi_long_min: f64,
    pub rsi_long_max: f64,
    /// Open interval `(rsi_short_min, rsi_short_max)` for Short entries.
    pub rsi_short_min: f64,
    pub rsi_short_max: f64,
    pub use_order_flow: bool,
    pub imbalance_threshold: f64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        BreakoutConfig {
            rsi_long_min: 50.0,
            rsi_long_max: 70.0,
            rsi_short_min: 30.0,
            rsi_short_max: 50.0,
            use_order_flow: false,
            imbalance_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    config: BreakoutConfig,
}

impl BreakoutStrategy {
    pub fn new(config: BreakoutConfig) -> Self {
        BreakoutStrategy { config }
    }

    pub fn config(&self) -> &BreakoutConfig {
        &self.config
    }

    fn technical_signal(&self, prefix: CausalPrefix<'_>) -> Signal {
        let Some((bar, frame)) = prefix.last() else {
            return Signal::Flat;
        };
        if let Some(missing) = frame.first_missing() {
            debug!(
                indicator = missing,
                timestamp = %bar.timestamp,
                "indicator incomplete on decision bar"
            );
            return Signal::Flat;
        }

        let c = &self.config;
        let close = bar.close;
        let volume_up = bar.volume > frame.vol_avg;

        if close > frame.high_n
            && volume_up
            && close > frame.vwap
            && close > frame.ema
            && frame.rsi > c.rsi_long_min
            && frame.rsi < c.rsi_long_max
        {
            Signal::Long
        } else if close < frame.low_n
            && volume_up
            && close < frame.vwap
            && close < frame.ema
            && frame.rsi > c.rsi_short_min
            && frame.rsi < c.rsi_short_max
        {
            Signal::Short
        } else {
            Signal::Flat
        }
    }
}

impl SignalSource for BreakoutStrategy {
    fn name(&self) -> &str {
        "breakout"
    }

    fn generate(&self, prefix: CausalPrefix<'_>, depth: Option<&DepthSnapshot>) -> SignalDecision {
        let signal = self.technical_signal(prefix);
        if signal == Signal::Flat || !self.config.use_order_flow {
            return SignalDecision::new(signal);
        }

        let Some(depth) = depth else {
            return SignalDecision::new(signal);
        };
        let imbalance = depth.order_flow_imbalance();
        let confirmed = order_flow::confirm(signal, imbalance, self.config.imbalance_threshold);
        if confirmed != signal {
            debug!(?signal, imbalance, "order flow does not confirm signal");
        }
        SignalDecision::new(confirmed)
    }

    fn wants_depth(&self) -> bool {
        self.config.use_order_flow
    }
}
