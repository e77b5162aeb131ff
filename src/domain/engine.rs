//! Position state machine.
//!
//! States are Flat and Open(side). Each bar is evaluated once: when a
//! position is open only its exit rules run, so a position never closes
//! and reopens on the same bar. When flat, a directional signal with a
//! positive size opens a position at the bar close.
//!
//! Exit rules, first match wins: stop-loss, take-profit, timeout. All
//! three compare against the bar close. A bar without a finite close is
//! held through: no exit rule runs and nothing is booked.

use tracing::{info, warn};

use crate::domain::bar::Bar;
use crate::domain::position::{CloseReason, Position, Side, Trade};
use crate::domain::signal::{RiskParams, SignalDecision};
use crate::domain::sizing::SizingPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub symbol: String,
    pub strategy_label: String,
    pub fee_rate: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_bars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            symbol: "BTC/USDT".into(),
            strategy_label: "Scalping_Breakout".into(),
            fee_rate: 0.0004,
            stop_loss_pct: 0.005,
            take_profit_pct: 0.01,
            max_hold_bars: 30,
        }
    }
}

impl EngineConfig {
    pub fn default_risk(&self) -> RiskParams {
        RiskParams {
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
        }
    }
}

/// Running account state. Only [`PositionStateMachine::close`] changes it.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityState {
    pub initial_capital: f64,
    pub capital: f64,
    pub realized_pnl: f64,
    pub fees_paid: f64,
    pub trades_closed: usize,
}

impl EquityState {
    pub fn new(initial_capital: f64) -> Self {
        EquityState {
            initial_capital,
            capital: initial_capital,
            realized_pnl: 0.0,
            fees_paid: 0.0,
            trades_closed: 0,
        }
    }
}

/// A validated request to open a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryIntent {
    pub side: Side,
    pub quantity: f64,
    pub risk: RiskParams,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BarOutcome {
    Idle,
    Opened(Position),
    Held,
    Closed(Trade),
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    config: EngineConfig,
    equity: EquityState,
    position: Option<Position>,
}

impl PositionStateMachine {
    pub fn new(config: EngineConfig, initial_capital: f64) -> Self {
        PositionStateMachine {
            config,
            equity: EquityState::new(initial_capital),
            position: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn equity(&self) -> &EquityState {
        &self.equity
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Advance by one bar, applying exit rules when open and entry rules
    /// when flat.
    pub fn on_bar(
        &mut self,
        index: usize,
        bar: &Bar,
        decision: &SignalDecision,
        sizing: &dyn SizingPolicy,
    ) -> BarOutcome {
        if self.position.is_some() {
            return match self.exit_reason(index, bar) {
                Some(reason) => BarOutcome::Closed(self.close(bar, reason)),
                None => BarOutcome::Held,
            };
        }

        match self.entry_intent(decision, bar, sizing) {
            Some(intent) => BarOutcome::Opened(self.open(intent, index, bar).clone()),
            None => BarOutcome::Idle,
        }
    }

    /// Exit rule that fires on this bar for the open position, if any.
    pub fn exit_reason(&self, index: usize, bar: &Bar) -> Option<CloseReason> {
        let position = self.position.as_ref()?;
        let price = bar.close;
        if !price.is_finite() {
            warn!(timestamp = %bar.timestamp, "close is not finite, exit rules skipped");
            return None;
        }
        if position.should_stop_loss(price) {
            Some(CloseReason::StopLoss)
        } else if position.should_take_profit(price) {
            Some(CloseReason::TakeProfit)
        } else if position.bars_held(index) >= self.config.max_hold_bars {
            Some(CloseReason::TimeOut)
        } else {
            None
        }
    }

    /// Turn a signal into an entry, or `None` when the signal is Flat, the
    /// price is unusable or the sizing policy returns nothing.
    pub fn entry_intent(
        &self,
        decision: &SignalDecision,
        bar: &Bar,
        sizing: &dyn SizingPolicy,
    ) -> Option<EntryIntent> {
        let side = decision.signal.side()?;
        let price = bar.close;
        if !price.is_finite() || price <= 0.0 {
            return None;
        }

        let quantity = sizing.size_position(self.equity.capital, price, side);
        if !quantity.is_finite() || quantity <= 0.0 {
            return None;
        }

        let risk = decision
            .risk
            .filter(RiskParams::is_valid)
            .unwrap_or_else(|| self.config.default_risk());

        Some(EntryIntent {
            side,
            quantity,
            risk,
        })
    }

    /// Open a position at the bar close.
    ///
    /// # Panics
    ///
    /// If a position is already open.
    pub fn open(&mut self, intent: EntryIntent, index: usize, bar: &Bar) -> &Position {
        assert!(
            self.position.is_none(),
            "open called while a position is already open"
        );

        let position = Position {
            side: intent.side,
            open_price: bar.close,
            open_time: bar.timestamp,
            open_index: index,
            quantity: intent.quantity,
            stop_loss_pct: intent.risk.stop_loss_pct,
            take_profit_pct: intent.risk.take_profit_pct,
        };
        info!(
            symbol = %self.config.symbol,
            side = %position.side,
            price = position.open_price,
            quantity = position.quantity,
            stop = position.stop_price(),
            target = position.target_price(),
            "opened position"
        );
        self.position.insert(position)
    }

    /// Close the open position at the bar close and book the result.
    ///
    /// # Panics
    ///
    /// If no position is open.
    pub fn close(&mut self, bar: &Bar, reason: CloseReason) -> Trade {
        let Some(position) = self.position.take() else {
            panic!("close called with no open position");
        };

        let close_price = bar.close;
        let gross = position.gross_pnl(close_price);
        let fee = gross.abs() * self.config.fee_rate;
        let net = gross - fee;

        self.equity.capital += net;
        self.equity.realized_pnl += net;
        self.equity.fees_paid += fee;
        self.equity.trades_closed += 1;

        let trade = Trade {
            symbol: self.config.symbol.clone(),
            strategy: self.config.strategy_label.clone(),
            side: position.side,
            quantity: position.quantity,
            open_time: position.open_time,
            close_time: bar.timestamp,
            open_price: position.open_price,
            close_price,
            fee,
            pnl: net,
            reason,
        };
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            price = close_price,
            pnl = net,
            reason = %reason,
            capital = self.equity.capital,
            "closed position"
        );
        trade
    }
}
