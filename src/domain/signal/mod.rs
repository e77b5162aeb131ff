//! Signal sources: map a causal prefix of indicator-annotated bars to a
//! directional decision.
//!
//! Every source sees only a [`CausalPrefix`], which ends at the bar being
//! decided on. Sources fail closed: an incomplete indicator frame on that
//! bar always yields [`Signal::Flat`].

pub mod breakout;
pub mod external;
pub mod order_flow;

use crate::domain::bar::Bar;
use crate::domain::indicator::IndicatorFrame;
use crate::domain::position::Side;

pub use order_flow::DepthSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Flat,
}

impl Signal {
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
            Signal::Flat => None,
        }
    }
}

/// Per-trade stop and target, as fractions of the open price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl RiskParams {
    pub fn is_valid(&self) -> bool {
        self.stop_loss_pct.is_finite()
            && self.take_profit_pct.is_finite()
            && self.stop_loss_pct > 0.0
            && self.take_profit_pct > 0.0
            && self.stop_loss_pct < 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDecision {
    pub signal: Signal,
    /// Overrides the configured stop/target when present.
    pub risk: Option<RiskParams>,
}

impl SignalDecision {
    pub fn flat() -> Self {
        SignalDecision {
            signal: Signal::Flat,
            risk: None,
        }
    }

    pub fn new(signal: Signal) -> Self {
        SignalDecision { signal, risk: None }
    }

    pub fn with_risk(signal: Signal, risk: RiskParams) -> Self {
        SignalDecision {
            signal,
            risk: Some(risk),
        }
    }
}

/// Bars and their indicator frames up to and including the decision bar.
#[derive(Debug, Clone, Copy)]
pub struct CausalPrefix<'a> {
    bars: &'a [Bar],
    frames: &'a [IndicatorFrame],
}

impl<'a> CausalPrefix<'a> {
    /// # Panics
    ///
    /// If `bars` and `frames` differ in length.
    pub fn new(bars: &'a [Bar], frames: &'a [IndicatorFrame]) -> Self {
        assert_eq!(
            bars.len(),
            frames.len(),
            "causal prefix needs one frame per bar"
        );
        CausalPrefix { bars, frames }
    }

    /// The prefix ending at `index` of a longer annotated history.
    pub fn ending_at(bars: &'a [Bar], frames: &'a [IndicatorFrame], index: usize) -> Self {
        CausalPrefix::new(&bars[..=index], &frames[..=index])
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    pub fn frames(&self) -> &'a [IndicatorFrame] {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The decision bar and its frame.
    pub fn last(&self) -> Option<(&'a Bar, &'a IndicatorFrame)> {
        Some((self.bars.last()?, self.frames.last()?))
    }

    /// The bar before the decision bar, if any.
    pub fn previous(&self) -> Option<&'a Bar> {
        let n = self.bars.len();
        if n < 2 { None } else { Some(&self.bars[n - 2]) }
    }
}

/// Capability shared by all signal source variants.
pub trait SignalSource {
    fn name(&self) -> &str;

    fn generate(&self, prefix: CausalPrefix<'_>, depth: Option<&DepthSnapshot>) -> SignalDecision;

    /// Whether the source uses a depth snapshot when one is offered.
    fn wants_depth(&self) -> bool {
        false
    }
}
