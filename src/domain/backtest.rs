//! Historical replay driver.
//!
//! Indicators are computed once over the whole sequence (they never read
//! ahead), then each bar from index 1 onward is decided on its causal
//! prefix and fed to the state machine. The run is deterministic: the same
//! bars and configuration always yield the same trades and capital.

use tracing::{debug, warn};

use crate::domain::bar::Bar;
use crate::domain::engine::{BarOutcome, EngineConfig, PositionStateMachine};
use crate::domain::indicator::{compute_indicators, IndicatorConfig};
use crate::domain::position::{Position, Trade};
use crate::domain::signal::{CausalPrefix, SignalSource};
use crate::domain::sizing::FixedFraction;
use crate::ports::trade_store_port::TradeStorePort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub engine: EngineConfig,
    pub indicators: IndicatorConfig,
    pub initial_capital: f64,
    pub position_fraction: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            engine: EngineConfig::default(),
            indicators: IndicatorConfig::default(),
            initial_capital: 1000.0,
            position_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    /// Position still open after the last bar, if any. It is not closed
    /// and contributes nothing to `final_capital`.
    pub open_position: Option<Position>,
    pub bars_evaluated: usize,
}

/// Replay `bars` through `source` and the position state machine.
///
/// Trades are forwarded to `store` as they close. A store failure is
/// logged and the run continues; the in-memory trade list stays complete.
pub fn run_backtest(
    bars: &[Bar],
    source: &dyn SignalSource,
    config: &BacktestConfig,
    store: Option<&dyn TradeStorePort>,
) -> BacktestResult {
    let frames = compute_indicators(bars, &config.indicators);
    let sizing = FixedFraction {
        fraction: config.position_fraction,
    };
    let mut machine = PositionStateMachine::new(config.engine.clone(), config.initial_capital);
    let mut trades = Vec::new();

    for index in 1..bars.len() {
        let bar = &bars[index];
        let decision = source.generate(CausalPrefix::ending_at(bars, &frames, index), None);

        match machine.on_bar(index, bar, &decision, &sizing) {
            BarOutcome::Closed(trade) => {
                if let Some(store) = store {
                    if let Err(e) = store.record_trade(&trade) {
                        warn!(error = %e, "failed to persist trade");
                    }
                }
                trades.push(trade);
            }
            BarOutcome::Opened(position) => {
                debug!(index, side = %position.side, "entry");
            }
            BarOutcome::Held | BarOutcome::Idle => {}
        }
    }

    BacktestResult {
        initial_capital: config.initial_capital,
        final_capital: machine.equity().capital,
        trades,
        open_position: machine.position().cloned(),
        bars_evaluated: bars.len().saturating_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;
    use crate::domain::signal::{DepthSnapshot, Signal, SignalDecision};
    use std::cell::Cell;

    /// Goes long on every bar whose close is above the previous close.
    struct Momentum {
        calls: Cell<usize>,
        max_prefix_seen: Cell<usize>,
    }

    impl Momentum {
        fn new() -> Self {
            Momentum {
                calls: Cell::new(0),
                max_prefix_seen: Cell::new(0),
            }
        }
    }

    impl SignalSource for Momentum {
        fn name(&self) -> &str {
            "momentum"
        }

        fn generate(
            &self,
            prefix: CausalPrefix<'_>,
            _depth: Option<&DepthSnapshot>,
        ) -> SignalDecision {
            self.calls.set(self.calls.get() + 1);
            self.max_prefix_seen.set(self.max_prefix_seen.get().max(prefix.len()));
            let (bar, _) = prefix.last().unwrap();
            match prefix.previous() {
                Some(prev) if bar.close > prev.close => SignalDecision::new(Signal::Long),
                _ => SignalDecision::flat(),
            }
        }
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            engine: EngineConfig {
                stop_loss_pct: 0.02,
                take_profit_pct: 0.03,
                max_hold_bars: 2,
                ..EngineConfig::default()
            },
            position_fraction: 0.1,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn empty_and_single_bar_inputs() {
        let source = Momentum::new();
        let result = run_backtest(&[], &source, &config(), None);
        assert!(result.trades.is_empty());
        assert_eq!(result.final_capital, 1000.0);

        let result = run_backtest(&closes(&[100.0]), &source, &config(), None);
        assert_eq!(result.bars_evaluated, 0);
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn first_bar_is_skipped_and_prefix_is_causal() {
        let source = Momentum::new();
        let bars = closes(&[100.0, 101.0, 101.0, 101.0, 101.0]);
        let result = run_backtest(&bars, &source, &config(), None);
        // entry on bar 1, timeout on bar 3, no momentum on bar 4
        assert_eq!(result.trades.len(), 1);
        assert_eq!(source.max_prefix_seen.get(), 5);
        assert_eq!(source.calls.get(), 4);
    }

    #[test]
    fn open_position_is_reported_not_closed() {
        let source = Momentum::new();
        let bars = closes(&[100.0, 101.0, 101.5]);
        let result = run_backtest(&bars, &source, &config(), None);
        assert!(result.trades.is_empty());
        assert!(result.open_position.is_some());
        assert_eq!(result.final_capital, 1000.0);
    }
}
