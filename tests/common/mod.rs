#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

pub use breakout_trader::domain::bar::Bar;
use breakout_trader::domain::backtest::BacktestConfig;
use breakout_trader::domain::engine::EngineConfig;
use breakout_trader::domain::error::TraderError;
use breakout_trader::domain::indicator::IndicatorConfig;
use breakout_trader::domain::position::{Side, Trade};
use breakout_trader::domain::signal::{
    CausalPrefix, DepthSnapshot, Signal, SignalDecision, SignalSource,
};
use breakout_trader::ports::decision_port::DecisionPort;
use breakout_trader::ports::market_data_port::MarketDataPort;
use breakout_trader::ports::order_port::{OrderAck, OrderPort};
use breakout_trader::ports::trade_store_port::TradeStorePort;

pub fn ts(minute: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute as i64)
}

pub fn make_bar(minute: usize, close: f64) -> Bar {
    Bar {
        timestamp: ts(minute),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000.0,
    }
}

pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c))
        .collect()
}

/// A deterministic series with enough movement to exercise every indicator.
pub fn wavy_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + 3.0 * (x * 0.37).sin() + 0.05 * x;
            Bar {
                timestamp: ts(i),
                open: close - 0.2 * (x * 0.91).cos(),
                high: close + 0.6 + 0.3 * (x * 1.3).sin().abs(),
                low: close - 0.6 - 0.3 * (x * 0.7).cos().abs(),
                close,
                volume: 1000.0 + 250.0 * (x * 0.53).sin().abs(),
            }
        })
        .collect()
}

/// A 40-bar cycle that breaks out once per cycle under the default
/// breakout and indicator settings.
///
/// Closes chop between 100.0 and 100.6 (RSI near 50), then bar 39 of each
/// cycle closes at 101.2 on triple volume, above the trailing high, VWAP
/// and EMA with RSI about 53. The bar after a breakout closes at 102.5 in
/// odd cycles and 100.0 in even ones, so a long opened with a 0.5% stop
/// and 1% target alternates take-profit and stop-loss exits.
pub fn breakout_series(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let (cycle, k) = (i / 40, i % 40);
            let (close, volume) = match k {
                39 => (101.2, 3000.0),
                0 if cycle % 2 == 1 => (102.5, 1000.0),
                _ => (100.0 + 0.6 * (k % 2) as f64, 1000.0),
            };
            Bar {
                timestamp: ts(i),
                open: close,
                high: close + 0.1,
                low: close - 0.1,
                close,
                volume,
            }
        })
        .collect()
}

/// Small indicator windows so short fixtures warm up quickly.
pub fn small_indicators() -> IndicatorConfig {
    IndicatorConfig {
        breakout_bars: 3,
        volume_lookback: 3,
        vwap_period: 3,
        rsi_period: 3,
        ema_period: 3,
        bb_period: 3,
        bb_std_dev: 2.0,
        atr_period: 3,
        lag_oscillators: false,
    }
}

pub fn engine_config(stop: f64, target: f64, max_hold: usize) -> EngineConfig {
    EngineConfig {
        stop_loss_pct: stop,
        take_profit_pct: target,
        max_hold_bars: max_hold,
        ..EngineConfig::default()
    }
}

pub fn backtest_config(engine: EngineConfig) -> BacktestConfig {
    BacktestConfig {
        engine,
        indicators: small_indicators(),
        initial_capital: 1000.0,
        position_fraction: 0.1,
    }
}

/// Emits a fixed signal at chosen bar indices and Flat elsewhere.
pub struct ScriptedSource {
    signals: HashMap<usize, Signal>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(signals: &[(usize, Signal)]) -> Self {
        Self {
            signals: signals.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, prefix: CausalPrefix<'_>, _depth: Option<&DepthSnapshot>) -> SignalDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = prefix.len() - 1;
        match self.signals.get(&index) {
            Some(&signal) => SignalDecision::new(signal),
            None => SignalDecision::flat(),
        }
    }
}

/// Always asks for the same side.
pub struct ConstantSource(pub Signal);

impl SignalSource for ConstantSource {
    fn name(&self) -> &str {
        "constant"
    }

    fn generate(
        &self,
        _prefix: CausalPrefix<'_>,
        _depth: Option<&DepthSnapshot>,
    ) -> SignalDecision {
        SignalDecision::new(self.0)
    }
}

/// Market feed serving a fixed history and then a queue of latest bars.
/// Once the queue drains the last bar is repeated.
pub struct MockMarketData {
    history: Vec<Bar>,
    latest: Mutex<VecDeque<Bar>>,
    last: Mutex<Option<Bar>>,
    depth: Option<DepthSnapshot>,
    fail_latest: AtomicUsize,
}

impl MockMarketData {
    pub fn new(history: Vec<Bar>, latest: Vec<Bar>) -> Self {
        let last = history.last().copied();
        Self {
            history,
            latest: Mutex::new(latest.into()),
            last: Mutex::new(last),
            depth: None,
            fail_latest: AtomicUsize::new(0),
        }
    }

    pub fn with_depth(mut self, depth: DepthSnapshot) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Fail the next `n` calls to `fetch_latest`.
    pub fn fail_next(self, n: usize) -> Self {
        self.fail_latest.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl MarketDataPort for MockMarketData {
    async fn fetch_history(&self, limit: usize) -> Result<Vec<Bar>, TraderError> {
        let start = self.history.len().saturating_sub(limit);
        Ok(self.history[start..].to_vec())
    }

    async fn fetch_latest(&self) -> Result<Option<Bar>, TraderError> {
        let remaining = self.fail_latest.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_latest.store(remaining - 1, Ordering::SeqCst);
            return Err(TraderError::MarketData {
                reason: "feed unavailable".into(),
            });
        }
        let mut last = self.last.lock().unwrap();
        if let Some(bar) = self.latest.lock().unwrap().pop_front() {
            *last = Some(bar);
        }
        Ok(*last)
    }

    async fn fetch_depth(&self) -> Result<DepthSnapshot, TraderError> {
        self.depth.clone().ok_or_else(|| TraderError::MarketData {
            reason: "no depth".into(),
        })
    }
}

#[derive(Default)]
struct OrderState {
    submitted: Mutex<Vec<(Side, f64)>>,
    reject_next: AtomicUsize,
    reject_all: AtomicBool,
}

/// Order port recording every submission. Clones share state so a test can
/// keep a handle after moving one into a driver.
#[derive(Clone, Default)]
pub struct MockOrders {
    state: Arc<OrderState>,
}

impl MockOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_next(&self, n: usize) {
        self.state.reject_next.store(n, Ordering::SeqCst);
    }

    pub fn reject_all(&self, reject: bool) {
        self.state.reject_all.store(reject, Ordering::SeqCst);
    }

    /// Accepted orders only.
    pub fn submitted(&self) -> Vec<(Side, f64)> {
        self.state.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderPort for MockOrders {
    async fn submit_market_order(
        &self,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, TraderError> {
        let pending = self.state.reject_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.state.reject_next.store(pending - 1, Ordering::SeqCst);
            return Err(TraderError::OrderRejected {
                reason: "rejected by mock".into(),
            });
        }
        if self.state.reject_all.load(Ordering::SeqCst) {
            return Err(TraderError::OrderRejected {
                reason: "rejected by mock".into(),
            });
        }
        let mut submitted = self.state.submitted.lock().unwrap();
        submitted.push((side, quantity));
        Ok(OrderAck {
            broker_order_id: Some(format!("mock-{}", submitted.len())),
        })
    }
}

/// In-memory trade store; clones share the same list.
#[derive(Clone, Default)]
pub struct MemoryStore {
    trades: Arc<Mutex<Vec<Trade>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().unwrap().clone()
    }
}

impl TradeStorePort for MemoryStore {
    fn record_trade(&self, trade: &Trade) -> Result<(), TraderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TraderError::Database {
                reason: "store offline".into(),
            });
        }
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }
}

/// Decision service returning canned replies in order, repeating the last.
pub struct MockAdvisor {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<serde_json::Value>>,
}

impl MockAdvisor {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(reason.to_string())])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }
}

impl DecisionPort for &MockAdvisor {
    fn request_decision(&self, request: &serde_json::Value) -> Result<String, TraderError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(TraderError::DecisionSource { reason }),
            None => Ok(String::new()),
        }
    }
}
