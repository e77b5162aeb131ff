//! Market data port used by the live driver.

use async_trait::async_trait;

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::signal::DepthSnapshot;

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Up to `limit` most recent closed bars, ascending.
    async fn fetch_history(&self, limit: usize) -> Result<Vec<Bar>, TraderError>;

    /// The most recent closed bar, or `None` when the feed has nothing.
    async fn fetch_latest(&self) -> Result<Option<Bar>, TraderError>;

    async fn fetch_depth(&self) -> Result<DepthSnapshot, TraderError>;
}
