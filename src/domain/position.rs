//! Open position and closed trade records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// +1 for Long, -1 for Short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            "SHORT" | "SELL" => Ok(Side::Short),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// An open position. Side, open price and quantity never change once the
/// position exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub open_index: usize,
    pub quantity: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Position {
    pub fn stop_price(&self) -> f64 {
        match self.side {
            Side::Long => self.open_price * (1.0 - self.stop_loss_pct),
            Side::Short => self.open_price * (1.0 + self.stop_loss_pct),
        }
    }

    pub fn target_price(&self) -> f64 {
        match self.side {
            Side::Long => self.open_price * (1.0 + self.take_profit_pct),
            Side::Short => self.open_price * (1.0 - self.take_profit_pct),
        }
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_price(),
            Side::Short => price >= self.stop_price(),
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.target_price(),
            Side::Short => price <= self.target_price(),
        }
    }

    pub fn bars_held(&self, index: usize) -> usize {
        index.saturating_sub(self.open_index)
    }

    /// Gross PnL if closed at `price`.
    pub fn gross_pnl(&self, price: f64) -> f64 {
        (price - self.open_price) * self.quantity * self.side.sign()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    TimeOut,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::TimeOut => "TIME_OUT",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub strategy: String,
    pub side: Side,
    pub quantity: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open_price: f64,
    pub close_price: f64,
    pub fee: f64,
    pub pnl: f64,
    pub reason: CloseReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
