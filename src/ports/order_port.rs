//! Order execution port.

use async_trait::async_trait;

use crate::domain::error::TraderError;
use crate::domain::position::Side;

/// An accepted order. Rejections are reported as
/// [`TraderError::OrderRejected`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderAck {
    pub broker_order_id: Option<String>,
}

#[async_trait]
pub trait OrderPort: Send + Sync {
    async fn submit_market_order(&self, side: Side, quantity: f64) -> Result<OrderAck, TraderError>;
}
