//! Trade persistence port.
//!
//! Delivery is at-least-once: a driver may submit the same trade again after
//! a failure, and implementations are not required to deduplicate.

use crate::domain::error::TraderError;
use crate::domain::position::Trade;

pub trait TradeStorePort {
    fn record_trade(&self, trade: &Trade) -> Result<(), TraderError>;
}
