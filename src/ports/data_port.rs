//! Historical bar source and bar storage ports.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;

pub trait DataPort {
    /// All stored bars for `symbol`, ascending by timestamp.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError>;
}

pub trait BarStorePort {
    /// Insert bars, replacing any existing bar with the same timestamp.
    /// Returns the number of rows written.
    fn store_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, TraderError>;
}
