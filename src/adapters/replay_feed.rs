//! Market data feed that replays a fixed bar sequence.
//!
//! The first `warmup` bars count as already closed and are served by
//! `fetch_history`. Each `fetch_latest` call then releases one more bar;
//! once the sequence is exhausted the last bar is returned again, the way
//! a venue keeps reporting its latest closed candle.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::signal::DepthSnapshot;
use crate::ports::market_data_port::MarketDataPort;

pub struct ReplayFeed {
    bars: Vec<Bar>,
    released: AtomicUsize,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Bar>, warmup: usize) -> Self {
        let warmup = warmup.min(bars.len());
        ReplayFeed {
            bars,
            released: AtomicUsize::new(warmup),
        }
    }
}

#[async_trait]
impl MarketDataPort for ReplayFeed {
    async fn fetch_history(&self, limit: usize) -> Result<Vec<Bar>, TraderError> {
        let end = self.released.load(Ordering::SeqCst);
        let start = end.saturating_sub(limit);
        Ok(self.bars[start..end].to_vec())
    }

    async fn fetch_latest(&self) -> Result<Option<Bar>, TraderError> {
        let len = self.bars.len();
        let next = self
            .released
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < len).then_some(n + 1)
            })
            .map(|prev| prev + 1)
            .unwrap_or(len);
        Ok(next.checked_sub(1).map(|i| self.bars[i]))
    }

    async fn fetch_depth(&self) -> Result<DepthSnapshot, TraderError> {
        Err(TraderError::MarketData {
            reason: "replay feed has no order book".to_string(),
        })
    }
}
