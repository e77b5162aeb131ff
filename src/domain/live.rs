//! Live polling driver.
//!
//! Drives the same position state machine as the backtest, one bar per
//! cycle. Each cycle runs fetch, compute, decide, execute and persist in
//! order and is never interrupted; shutdown is only observed between
//! cycles. Collaborator failures abort the cycle, are logged, and the loop
//! backs off before trying again.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time;
use tracing::{debug, info, warn};

use crate::domain::bar::Bar;
use crate::domain::engine::{EngineConfig, EquityState, PositionStateMachine};
use crate::domain::error::TraderError;
use crate::domain::indicator::{IndicatorConfig, IndicatorStream};
use crate::domain::position::{CloseReason, Position, Trade};
use crate::domain::signal::{CausalPrefix, SignalSource};
use crate::domain::sizing::SizingPolicy;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::order_port::OrderPort;
use crate::ports::trade_store_port::TradeStorePort;

/// Exponential backoff for failed cycles: `base * 2^(attempt-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_secs(10),
            max: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub engine: EngineConfig,
    pub indicators: IndicatorConfig,
    pub initial_capital: f64,
    pub poll_interval: Duration,
    pub history_limit: usize,
    /// Realized PnL for the day at or below which new entries stop.
    pub daily_loss_limit: f64,
    pub use_depth: bool,
    pub retry: RetryPolicy,
    /// Stop once this many consecutive cycles brought no new bar.
    pub stop_after_idle_cycles: Option<usize>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            engine: EngineConfig::default(),
            indicators: IndicatorConfig::default(),
            initial_capital: 1000.0,
            poll_interval: Duration::from_secs(60),
            history_limit: 100,
            daily_loss_limit: -5.0,
            use_depth: false,
            retry: RetryPolicy::default(),
            stop_after_idle_cycles: None,
        }
    }
}

/// Blocks new entries once the day's realized PnL falls to the limit.
///
/// Days are UTC calendar dates of the bar being evaluated. The tally resets
/// when a bar from a new date arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLossBreaker {
    limit: f64,
    day: Option<NaiveDate>,
    realized: f64,
    reported: Option<NaiveDate>,
}

impl DailyLossBreaker {
    pub fn new(limit: f64) -> Self {
        DailyLossBreaker {
            limit,
            day: None,
            realized: 0.0,
            reported: None,
        }
    }

    fn roll(&mut self, date: NaiveDate) {
        if self.day != Some(date) {
            self.day = Some(date);
            self.realized = 0.0;
        }
    }

    pub fn record(&mut self, date: NaiveDate, pnl: f64) {
        self.roll(date);
        self.realized += pnl;
    }

    pub fn realized(&self) -> f64 {
        self.realized
    }

    pub fn is_tripped(&mut self, date: NaiveDate) -> bool {
        self.roll(date);
        let tripped = self.realized <= self.limit;
        if tripped && self.reported != Some(date) {
            self.reported = Some(date);
            warn!(
                %date,
                realized = self.realized,
                limit = self.limit,
                "daily loss limit reached, entries halted"
            );
        }
        tripped
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Timestamp of the new bar, `None` if the feed had nothing new.
    pub bar_time: Option<DateTime<Utc>>,
    pub opened: Option<Position>,
    pub closed: Option<Trade>,
    pub entry_blocked: bool,
}

impl CycleReport {
    pub fn had_new_bar(&self) -> bool {
        self.bar_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSummary {
    pub cycles: usize,
    pub failed_cycles: usize,
    pub trades: Vec<Trade>,
    pub equity: EquityState,
    pub open_position: Option<Position>,
}

struct PendingExit {
    bar: Bar,
    reason: CloseReason,
}

pub struct LiveDriver<M, O> {
    market: M,
    orders: O,
    source: Box<dyn SignalSource>,
    sizing: Box<dyn SizingPolicy>,
    store: Option<Box<dyn TradeStorePort>>,
    config: LiveConfig,
    machine: PositionStateMachine,
    stream: IndicatorStream,
    breaker: DailyLossBreaker,
    pending_exit: Option<PendingExit>,
    trades: Vec<Trade>,
    cycles: usize,
    failed_cycles: usize,
}

impl<M: MarketDataPort, O: OrderPort> LiveDriver<M, O> {
    pub fn new(
        market: M,
        orders: O,
        source: Box<dyn SignalSource>,
        sizing: Box<dyn SizingPolicy>,
        config: LiveConfig,
    ) -> Self {
        let machine = PositionStateMachine::new(config.engine.clone(), config.initial_capital);
        let stream = IndicatorStream::new(config.indicators.clone(), config.history_limit);
        let breaker = DailyLossBreaker::new(config.daily_loss_limit);
        LiveDriver {
            market,
            orders,
            source,
            sizing,
            store: None,
            config,
            machine,
            stream,
            breaker,
            pending_exit: None,
            trades: Vec::new(),
            cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn with_store(mut self, store: Box<dyn TradeStorePort>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn machine(&self) -> &PositionStateMachine {
        &self.machine
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn breaker(&self) -> &DailyLossBreaker {
        &self.breaker
    }

    /// Seed the indicator stream from recent history. Returns the number of
    /// bars accepted.
    pub async fn warm_up(&mut self) -> Result<usize, TraderError> {
        let history = self.market.fetch_history(self.config.history_limit).await?;
        let accepted = history
            .into_iter()
            .filter_map(|bar| self.stream.push(bar))
            .count();
        info!(
            bars = accepted,
            needed = self.config.indicators.min_bars(),
            "indicator warm-up complete"
        );
        Ok(accepted)
    }

    /// Run one fetch, compute, decide, execute, persist cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, TraderError> {
        let mut report = CycleReport::default();

        if let Some(pending) = self.pending_exit.take() {
            report.closed = Some(self.execute_exit(pending).await?);
        }

        let Some(bar) = self.market.fetch_latest().await? else {
            debug!("feed returned no bar");
            return Ok(report);
        };
        if self.stream.push(bar).is_none() {
            debug!(timestamp = %bar.timestamp, "no new bar");
            return Ok(report);
        }
        report.bar_time = Some(bar.timestamp);

        let Some(index) = self.stream.last_index() else {
            return Ok(report);
        };
        let date = bar.timestamp.date_naive();

        if !self.machine.is_flat() {
            if let Some(reason) = self.machine.exit_reason(index, &bar) {
                report.closed = Some(self.execute_exit(PendingExit { bar, reason }).await?);
            }
            return Ok(report);
        }

        if self.breaker.is_tripped(date) {
            report.entry_blocked = true;
            return Ok(report);
        }

        let depth = if self.config.use_depth && self.source.wants_depth() {
            Some(self.market.fetch_depth().await?)
        } else {
            None
        };

        let prefix = CausalPrefix::new(self.stream.bars(), self.stream.frames());
        let decision = self.source.generate(prefix, depth.as_ref());
        let Some(intent) = self
            .machine
            .entry_intent(&decision, &bar, self.sizing.as_ref())
        else {
            return Ok(report);
        };

        match self
            .orders
            .submit_market_order(intent.side, intent.quantity)
            .await
        {
            Ok(ack) => {
                debug!(order_id = ?ack.broker_order_id, "entry order accepted");
                report.opened = Some(self.machine.open(intent, index, &bar).clone());
                Ok(report)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    side = %intent.side,
                    quantity = intent.quantity,
                    "entry order failed, staying flat"
                );
                Err(e)
            }
        }
    }

    async fn execute_exit(&mut self, exit: PendingExit) -> Result<Trade, TraderError> {
        let Some(position) = self.machine.position() else {
            panic!("exit requested with no open position");
        };
        let side = position.side.opposite();
        let quantity = position.quantity;

        if let Err(e) = self.orders.submit_market_order(side, quantity).await {
            warn!(error = %e, reason = %exit.reason, "exit order failed, position kept open");
            self.pending_exit = Some(exit);
            return Err(e);
        }

        let trade = self.machine.close(&exit.bar, exit.reason);
        self.breaker.record(exit.bar.timestamp.date_naive(), trade.pnl);
        if let Some(store) = &self.store {
            if let Err(e) = store.record_trade(&trade) {
                warn!(error = %e, "failed to persist trade");
            }
        }
        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Sleep for `delay` unless shutdown arrives first. Returns true on
    /// shutdown.
    async fn wait(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = time::sleep(delay) => false,
            _ = shutdown.recv() => true,
        }
    }

    fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
        !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
    }

    /// Poll until shutdown (or until the feed stays idle when configured).
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> LiveSummary {
        let mut attempt = 0u32;
        loop {
            match self.warm_up().await {
                Ok(_) => break,
                Err(e) => {
                    attempt += 1;
                    let delay = self.config.retry.delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "warm-up failed, retrying"
                    );
                    if Self::wait(delay, &mut shutdown).await {
                        return self.summary();
                    }
                }
            }
        }

        attempt = 0;
        let mut idle = 0usize;
        while !Self::shutdown_requested(&mut shutdown) {
            self.cycles += 1;
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    attempt = 0;
                    if report.had_new_bar() {
                        idle = 0;
                    } else {
                        idle += 1;
                    }
                    if self
                        .config
                        .stop_after_idle_cycles
                        .is_some_and(|limit| idle >= limit)
                    {
                        info!(idle_cycles = idle, "feed idle, stopping");
                        break;
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    self.failed_cycles += 1;
                    attempt += 1;
                    let delay = self.config.retry.delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "cycle failed, backing off"
                    );
                    delay
                }
            };

            if Self::wait(delay, &mut shutdown).await {
                break;
            }
        }

        info!(cycles = self.cycles, trades = self.trades.len(), "live driver stopped");
        self.summary()
    }

    pub fn summary(&self) -> LiveSummary {
        LiveSummary {
            cycles: self.cycles,
            failed_cycles: self.failed_cycles,
            trades: self.trades.clone(),
            equity: self.machine.equity().clone(),
            open_position: self.machine.position().cloned(),
        }
    }
}
