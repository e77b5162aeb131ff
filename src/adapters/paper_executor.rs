//! Order executor that fills every valid market order immediately.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::domain::error::TraderError;
use crate::domain::position::Side;
use crate::ports::order_port::{OrderAck, OrderPort};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub side: Side,
    pub quantity: f64,
}

#[derive(Debug, Default)]
pub struct PaperExecutor {
    fills: Mutex<Vec<PaperFill>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fills(&self) -> Vec<PaperFill> {
        self.fills
            .lock()
            .map(|fills| fills.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderPort for PaperExecutor {
    async fn submit_market_order(
        &self,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, TraderError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(TraderError::OrderRejected {
                reason: format!("invalid quantity {}", quantity),
            });
        }

        let mut fills = self.fills.lock().map_err(|_| TraderError::OrderRejected {
            reason: "paper order book poisoned".to_string(),
        })?;
        let order_id = format!("paper-{}", fills.len() + 1);
        info!(%order_id, %side, quantity, "paper order filled");
        fills.push(PaperFill {
            order_id: order_id.clone(),
            side,
            quantity,
        });

        Ok(OrderAck {
            broker_order_id: Some(order_id),
        })
    }
}
