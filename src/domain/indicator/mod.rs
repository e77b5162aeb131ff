//! Indicator engine.
//!
//! [`compute_indicators`] maps a bar sequence to one [`IndicatorFrame`] per
//! bar. It is a pure function of its inputs: every value at index `i` is
//! derived from bars at or before `i`, so appending or mutating later bars
//! never changes an earlier frame. Values that need a window which is not
//! yet full are NaN; callers check [`IndicatorFrame::is_complete`] before
//! relying on a frame.
//!
//! [`IndicatorStream`] produces the same frames incrementally, one bar at a
//! time, over a bounded buffer.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod stddev;
pub mod trailing;

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;

/// Window lengths and multipliers for every indicator in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub breakout_bars: usize,
    pub volume_lookback: usize,
    pub vwap_period: usize,
    pub rsi_period: usize,
    pub ema_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
    /// Shift RSI, EMA, Bollinger and ATR back one bar as well, so that no
    /// value in the frame at `i` reads bar `i`.
    pub lag_oscillators: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            breakout_bars: 20,
            volume_lookback: 20,
            vwap_period: 20,
            rsi_period: 14,
            ema_period: 20,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
            lag_oscillators: false,
        }
    }
}

impl IndicatorConfig {
    fn lag(&self) -> usize {
        usize::from(self.lag_oscillators)
    }

    /// First bar index at which every value of a frame is defined.
    pub fn warmup_index(&self) -> usize {
        let lag = self.lag();
        [
            self.breakout_bars,
            self.volume_lookback,
            self.vwap_period,
            self.rsi_period + lag,
            self.atr_period + lag,
            self.bb_period.saturating_sub(1) + lag,
            lag,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Minimum number of bars before the newest frame can be complete.
    pub fn min_bars(&self) -> usize {
        self.warmup_index() + 1
    }

    /// Number of trailing bars (newest included) needed to compute the
    /// newest frame once the EMA state is known.
    pub fn lookback_span(&self) -> usize {
        let lag = self.lag();
        [
            self.breakout_bars + 1,
            self.volume_lookback + 1,
            self.vwap_period + 1,
            self.rsi_period + 1 + lag,
            self.atr_period + 1 + lag,
            self.bb_period + lag,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

/// Indicator values for one bar index. NaN marks an undefined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFrame {
    pub high_n: f64,
    pub low_n: f64,
    pub vol_avg: f64,
    pub vwap: f64,
    pub rsi: f64,
    pub ema: f64,
    pub bb_mid: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub atr: f64,
}

impl IndicatorFrame {
    pub const UNDEFINED: IndicatorFrame = IndicatorFrame {
        high_n: f64::NAN,
        low_n: f64::NAN,
        vol_avg: f64::NAN,
        vwap: f64::NAN,
        rsi: f64::NAN,
        ema: f64::NAN,
        bb_mid: f64::NAN,
        bb_upper: f64::NAN,
        bb_lower: f64::NAN,
        atr: f64::NAN,
    };

    fn named(&self) -> [(&'static str, f64); 10] {
        [
            ("high_n", self.high_n),
            ("low_n", self.low_n),
            ("vol_avg", self.vol_avg),
            ("vwap", self.vwap),
            ("rsi", self.rsi),
            ("ema", self.ema),
            ("bb_mid", self.bb_mid),
            ("bb_upper", self.bb_upper),
            ("bb_lower", self.bb_lower),
            ("atr", self.atr),
        ]
    }

    /// Name of the first undefined value, if any.
    pub fn first_missing(&self) -> Option<&'static str> {
        self.named()
            .into_iter()
            .find(|(_, v)| v.is_nan())
            .map(|(name, _)| name)
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Bitwise comparison, so that two undefined values compare equal.
    pub fn bits_eq(&self, other: &IndicatorFrame) -> bool {
        self.named()
            .iter()
            .zip(other.named().iter())
            .all(|((_, a), (_, b))| a.to_bits() == b.to_bits())
    }
}

/// Frame at index `i`. `ema_raw[k]` must hold the unshifted EMA of bar `k`
/// for every `k <= i`.
fn frame_at(bars: &[Bar], ema_raw: &[f64], i: usize, config: &IndicatorConfig) -> IndicatorFrame {
    let anchor = if config.lag_oscillators {
        i.checked_sub(1)
    } else {
        Some(i)
    };

    let (rsi, ema, bands, atr) = match anchor {
        Some(j) => (
            rsi::rsi_at(bars, j, config.rsi_period),
            ema_raw[j],
            bollinger::bollinger_at(bars, j, config.bb_period, config.bb_std_dev),
            atr::atr_at(bars, j, config.atr_period),
        ),
        None => (f64::NAN, f64::NAN, bollinger::Bands::UNDEFINED, f64::NAN),
    };

    IndicatorFrame {
        high_n: trailing::rolling_high(bars, i, config.breakout_bars),
        low_n: trailing::rolling_low(bars, i, config.breakout_bars),
        vol_avg: trailing::volume_average(bars, i, config.volume_lookback),
        vwap: trailing::vwap(bars, i, config.vwap_period),
        rsi,
        ema,
        bb_mid: bands.middle,
        bb_upper: bands.upper,
        bb_lower: bands.lower,
        atr,
    }
}

/// Compute one frame per bar. The output has the same length as `bars`.
pub fn compute_indicators(bars: &[Bar], config: &IndicatorConfig) -> Vec<IndicatorFrame> {
    let ema_raw = ema::ema_series(bars, config.ema_period);
    (0..bars.len())
        .map(|i| frame_at(bars, &ema_raw, i, config))
        .collect()
}

/// Incremental indicator computation over a bounded bar buffer.
///
/// Frames pushed through the stream are bit-identical to the frames
/// [`compute_indicators`] produces for the same full history. Indices
/// reported by the stream are positions in the full history, not in the
/// retained buffer.
#[derive(Debug, Clone)]
pub struct IndicatorStream {
    config: IndicatorConfig,
    capacity: usize,
    bars: Vec<Bar>,
    ema_raw: Vec<f64>,
    frames: Vec<IndicatorFrame>,
    dropped: usize,
}

impl IndicatorStream {
    pub fn new(config: IndicatorConfig, capacity: usize) -> Self {
        let capacity = capacity.max(config.lookback_span()).max(1);
        IndicatorStream {
            config,
            capacity,
            bars: Vec::with_capacity(capacity + 1),
            ema_raw: Vec::with_capacity(capacity + 1),
            frames: Vec::with_capacity(capacity + 1),
            dropped: 0,
        }
    }

    /// Append a bar. Bars not strictly newer than the last one are
    /// ignored and `None` is returned.
    pub fn push(&mut self, bar: Bar) -> Option<IndicatorFrame> {
        if let Some(last) = self.last_timestamp() {
            if bar.timestamp <= last {
                return None;
            }
        }

        let prev = self.ema_raw.last().copied().unwrap_or(f64::NAN);
        self.ema_raw
            .push(ema::next_ema(prev, bar.close, self.config.ema_period));
        self.bars.push(bar);

        let i = self.bars.len() - 1;
        let frame = frame_at(&self.bars, &self.ema_raw, i, &self.config);
        self.frames.push(frame);

        if self.bars.len() > self.capacity {
            let excess = self.bars.len() - self.capacity;
            self.bars.drain(..excess);
            self.ema_raw.drain(..excess);
            self.frames.drain(..excess);
            self.dropped += excess;
        }

        Some(frame)
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn frames(&self) -> &[IndicatorFrame] {
        &self.frames
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    /// History index of the newest bar.
    pub fn last_index(&self) -> Option<usize> {
        (self.dropped + self.bars.len()).checked_sub(1)
    }

    /// Total number of bars accepted since creation.
    pub fn total_bars(&self) -> usize {
        self.dropped + self.bars.len()
    }
}
