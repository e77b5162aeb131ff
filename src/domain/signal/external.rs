//! Signal source that delegates the decision to an external service.
//!
//! The service receives a JSON snapshot of the decision bar and replies with
//! free-form text. The reply may be a JSON object (possibly wrapped in
//! prose) or `key: value` lines. Recognized keys:
//!
//! - direction: `direction`, `signal`, `action`, `side`, `decision`
//! - stop: `stop_loss_pct`, `stop_loss`, `sl`, `stop`
//! - target: `take_profit_pct`, `take_profit`, `tp`, `target`
//!
//! Percentages are accepted as fractions (`0.015`), with a percent sign
//! (`1.5%`), or as bare numbers of at least one (`1.5`, read as percent).
//! Any failure, from the service call to an unknown direction, yields Flat
//! with the default stop/target pair.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::order_flow::DepthSnapshot;
use super::{CausalPrefix, RiskParams, Signal, SignalDecision, SignalSource};
use crate::ports::decision_port::DecisionPort;

const DIRECTION_KEYS: &[&str] = &["direction", "signal", "action", "side", "decision"];
const STOP_KEYS: &[&str] = &["stoplosspct", "stoploss", "sl", "stop"];
const TARGET_KEYS: &[&str] = &["takeprofitpct", "takeprofit", "tp", "target"];

pub struct ExternalDecisionStrategy<P> {
    port: P,
    symbol: String,
    defaults: RiskParams,
    context_bars: usize,
}

impl<P: DecisionPort> ExternalDecisionStrategy<P> {
    pub fn new(port: P, symbol: impl Into<String>, defaults: RiskParams) -> Self {
        ExternalDecisionStrategy {
            port,
            symbol: symbol.into(),
            defaults,
            context_bars: 20,
        }
    }

    /// Number of recent bars included in each request.
    pub fn with_context_bars(mut self, context_bars: usize) -> Self {
        self.context_bars = context_bars.max(1);
        self
    }

    fn fallback(&self) -> SignalDecision {
        SignalDecision::with_risk(Signal::Flat, self.defaults)
    }

    fn build_request(&self, prefix: CausalPrefix<'_>, depth: Option<&DepthSnapshot>) -> Value {
        let bars = prefix.bars();
        let start = bars.len().saturating_sub(self.context_bars);
        let recent: Vec<Value> = bars[start..]
            .iter()
            .map(|b| {
                json!({
                    "timestamp": b.timestamp.to_rfc3339(),
                    "open": b.open,
                    "high": b.high,
                    "low": b.low,
                    "close": b.close,
                    "volume": b.volume,
                })
            })
            .collect();

        let indicators = prefix.last().map(|(_, f)| {
            json!({
                "high_n": f.high_n,
                "low_n": f.low_n,
                "vol_avg": f.vol_avg,
                "vwap": f.vwap,
                "rsi": f.rsi,
                "ema": f.ema,
                "bb_mid": f.bb_mid,
                "bb_upper": f.bb_upper,
                "bb_lower": f.bb_lower,
                "atr": f.atr,
            })
        });

        json!({
            "symbol": self.symbol,
            "bars": recent,
            "indicators": indicators,
            "order_flow_imbalance": depth.map(|d| d.order_flow_imbalance()),
            "default_stop_loss_pct": self.defaults.stop_loss_pct,
            "default_take_profit_pct": self.defaults.take_profit_pct,
        })
    }
}

impl<P: DecisionPort> SignalSource for ExternalDecisionStrategy<P> {
    fn name(&self) -> &str {
        "external"
    }

    fn generate(&self, prefix: CausalPrefix<'_>, depth: Option<&DepthSnapshot>) -> SignalDecision {
        let Some((bar, frame)) = prefix.last() else {
            return self.fallback();
        };
        if let Some(missing) = frame.first_missing() {
            debug!(
                indicator = missing,
                timestamp = %bar.timestamp,
                "indicator incomplete on decision bar"
            );
            return self.fallback();
        }

        let request = self.build_request(prefix, depth);
        match self.port.request_decision(&request) {
            Ok(reply) => parse_decision(&reply, self.defaults),
            Err(e) => {
                warn!(error = %e, "decision source failed, staying flat");
                self.fallback()
            }
        }
    }

    fn wants_depth(&self) -> bool {
        true
    }
}

/// Parse a free-form decision reply. Never fails.
pub fn parse_decision(reply: &str, defaults: RiskParams) -> SignalDecision {
    let fields = json_fields(reply).unwrap_or_else(|| line_fields(reply));

    let signal = lookup(&fields, DIRECTION_KEYS).and_then(parse_direction);
    let Some(signal) = signal else {
        debug!(reply, "unrecognized decision reply");
        return SignalDecision::with_risk(Signal::Flat, defaults);
    };

    let stop = lookup(&fields, STOP_KEYS).and_then(parse_pct);
    let target = lookup(&fields, TARGET_KEYS).and_then(parse_pct);

    let risk = match (stop, target) {
        (Some(stop_loss_pct), Some(take_profit_pct)) => {
            let parsed = RiskParams {
                stop_loss_pct,
                take_profit_pct,
            };
            if parsed.is_valid() { parsed } else { defaults }
        }
        (Some(stop_loss_pct), None) => RiskParams {
            stop_loss_pct,
            ..defaults
        },
        (None, Some(take_profit_pct)) => RiskParams {
            take_profit_pct,
            ..defaults
        },
        (None, None) => defaults,
    };
    let risk = if risk.is_valid() { risk } else { defaults };

    SignalDecision::with_risk(signal, risk)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn lookup<'a>(fields: &'a [(String, String)], keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| {
        fields
            .iter()
            .find(|(name, _)| name == k)
            .map(|(_, v)| v.as_str())
    })
}

/// Top-level fields of the first JSON object embedded in `reply`.
fn json_fields(reply: &str) -> Option<Vec<(String, String)>> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&reply[start..=end]).ok()?;
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (normalize_key(k), text)
            })
            .collect(),
    )
}

fn line_fields(reply: &str) -> Vec<(String, String)> {
    reply
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once([':', '='])?;
            let value = value
                .trim()
                .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == ',');
            Some((normalize_key(key), value.trim().to_string()))
        })
        .collect()
}

fn parse_direction(value: &str) -> Option<Signal> {
    let word: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    match word.as_str() {
        "long" | "buy" => Some(Signal::Long),
        "short" | "sell" => Some(Signal::Short),
        "flat" | "hold" | "none" | "neutral" | "wait" => Some(Signal::Flat),
        _ => None,
    }
}

fn parse_pct(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let (number, is_percent) = match trimmed.strip_suffix('%') {
        Some(n) => (n.trim(), true),
        None => (trimmed, false),
    };
    let parsed: f64 = number.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    if is_percent || parsed >= 1.0 {
        Some(parsed / 100.0)
    } else {
        Some(parsed)
    }
}
