//! Backtest driver integration tests.
//!
//! Tests cover:
//! - Fee and capital bookkeeping on a stop-loss exit
//! - Take-profit and timeout exits at the exact bar
//! - One position at a time, no re-entry on the closing bar
//! - Determinism of repeated runs with the breakout strategy
//! - Trade persistence through a store, including a failing store
//! - External decision source driven through a mock advisor

mod common;

use approx::assert_relative_eq;
use common::*;

use breakout_trader::domain::backtest::run_backtest;
use breakout_trader::domain::position::{CloseReason, Side};
use breakout_trader::domain::signal::breakout::{BreakoutConfig, BreakoutStrategy};
use breakout_trader::domain::signal::external::ExternalDecisionStrategy;
use breakout_trader::domain::signal::{RiskParams, Signal};

mod exits {
    use super::*;

    #[test]
    fn stop_loss_books_fee_and_capital() {
        let bars = make_bars(&[100.0, 100.0, 98.0, 98.0]);
        let source = ScriptedSource::new(&[(1, Signal::Long)]);
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.reason, CloseReason::StopLoss);
        assert_relative_eq!(trade.quantity, 1.0);
        assert_relative_eq!(trade.fee, 0.0008, epsilon = 1e-12);
        assert_relative_eq!(trade.pnl, -2.0008, epsilon = 1e-12);
        assert_relative_eq!(result.final_capital, 997.9992, epsilon = 1e-9);
        assert_eq!(trade.open_time, ts(1));
        assert_eq!(trade.close_time, ts(2));
        assert!(result.open_position.is_none());
    }

    #[test]
    fn short_take_profit_at_exact_threshold() {
        let bars = make_bars(&[100.0, 100.0, 101.0, 97.0, 97.0]);
        let source = ScriptedSource::new(&[(1, Signal::Short)]);
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.reason, CloseReason::TakeProfit);
        assert_eq!(trade.close_time, ts(3));
        assert_relative_eq!(trade.pnl, 3.0 - 0.0012, epsilon = 1e-12);
    }

    #[test]
    fn stop_wins_when_both_thresholds_cross() {
        let bars = make_bars(&[100.0, 100.0, 97.0]);
        let source = ScriptedSource::new(&[(1, Signal::Long)]);
        // A negative target puts the take-profit below entry so one close
        // crosses both.
        let config = backtest_config(engine_config(0.02, -0.05, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].reason, CloseReason::StopLoss);
    }

    #[test]
    fn non_finite_close_does_not_corrupt_capital() {
        let bars = make_bars(&[100.0, 100.0, 100.0, f64::NAN, 100.0]);
        let source = ScriptedSource::new(&[(1, Signal::Long)]);
        let config = backtest_config(engine_config(0.02, 0.03, 2));

        let result = run_backtest(&bars, &source, &config, None);

        // the timeout due on bar 3 waits for the first finite close
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.reason, CloseReason::TimeOut);
        assert_eq!(trade.close_time, ts(4));
        assert!(trade.pnl.is_finite());
        assert_relative_eq!(result.final_capital, 1000.0);
    }

    #[test]
    fn timeout_closes_on_exact_bar() {
        let bars = make_bars(&[100.0; 8]);
        let source = ScriptedSource::new(&[(2, Signal::Long)]);
        let config = backtest_config(engine_config(0.02, 0.03, 3));

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.reason, CloseReason::TimeOut);
        assert_eq!(trade.open_time, ts(2));
        assert_eq!(trade.close_time, ts(5));
        assert_relative_eq!(trade.pnl, 0.0);
    }
}

mod position_rules {
    use super::*;

    #[test]
    fn one_position_at_a_time() {
        let bars = make_bars(&[100.0; 8]);
        let source = ConstantSource(Signal::Long);
        let config = backtest_config(engine_config(0.02, 0.03, 2));

        let result = run_backtest(&bars, &source, &config, None);

        // open 1, close 3, open 4, close 6, open 7 (still open)
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].open_time, ts(1));
        assert_eq!(result.trades[0].close_time, ts(3));
        assert_eq!(result.trades[1].open_time, ts(4));
        assert_eq!(result.trades[1].close_time, ts(6));
        for pair in result.trades.windows(2) {
            assert!(pair[0].close_time < pair[1].open_time);
        }
        let open = result.open_position.expect("position opened on the last bar");
        assert_eq!(open.open_time, ts(7));
    }

    #[test]
    fn open_position_at_end_is_not_booked() {
        let bars = make_bars(&[100.0, 100.0, 100.5]);
        let source = ScriptedSource::new(&[(1, Signal::Long)]);
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert!(result.trades.is_empty());
        assert!(result.open_position.is_some());
        assert_relative_eq!(result.final_capital, 1000.0);
    }

    #[test]
    fn source_sees_every_bar_after_the_first() {
        let bars = make_bars(&[100.0; 6]);
        let source = ScriptedSource::new(&[]);
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(source.calls(), 5);
        assert_eq!(result.bars_evaluated, 5);
    }
}

mod breakout_runs {
    use super::*;
    use breakout_trader::domain::backtest::BacktestConfig;

    fn breakout_config(max_hold: usize) -> BacktestConfig {
        let mut config = backtest_config(engine_config(0.005, 0.01, max_hold));
        config.indicators = Default::default();
        config
    }

    #[test]
    fn repeated_runs_are_identical() {
        let bars = breakout_series(300);
        let source = BreakoutStrategy::new(BreakoutConfig::default());
        let config = breakout_config(30);

        let first = run_backtest(&bars, &source, &config, None);
        let second = run_backtest(&bars, &source, &config, None);

        // breakouts on bars 39, 79, ..., 279, each closed on the next bar
        assert_eq!(first.trades.len(), 7);
        assert!(first.open_position.is_none());
        assert_eq!(first.trades, second.trades);
        assert_eq!(first.final_capital.to_bits(), second.final_capital.to_bits());
        assert_eq!(first.open_position, second.open_position);
    }

    #[test]
    fn no_entries_before_warmup() {
        let mut bars = breakout_series(200);
        // a breakout-shaped bar while the windows are still filling
        bars[10].close = 101.2;
        bars[10].high = 101.3;
        bars[10].volume = 3000.0;
        let source = BreakoutStrategy::new(BreakoutConfig::default());
        let config = breakout_config(30);
        let warmup = config.indicators.warmup_index();
        assert!(warmup > 10);

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 4);
        assert_eq!(result.trades[0].open_time, ts(39));
        for trade in &result.trades {
            assert!(trade.open_time >= ts(warmup));
        }
        let open = result.open_position.expect("breakout on the last bar");
        assert_eq!(open.open_time, ts(199));
    }

    #[test]
    fn capital_matches_sum_of_trade_pnl() {
        let bars = breakout_series(400);
        let source = BreakoutStrategy::new(BreakoutConfig::default());
        let config = breakout_config(10);

        let result = run_backtest(&bars, &source, &config, None);

        assert_eq!(result.trades.len(), 9);
        for (n, trade) in result.trades.iter().enumerate() {
            assert_eq!(trade.side, Side::Long);
            let expected = if n % 2 == 0 {
                CloseReason::TakeProfit
            } else {
                CloseReason::StopLoss
            };
            assert_eq!(trade.reason, expected, "trade {n}");
        }
        let pnl: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert_relative_eq!(result.final_capital, 1000.0 + pnl, epsilon = 1e-9);
        assert!((result.final_capital - 1000.0).abs() > 1e-6);
    }
}

mod persistence {
    use super::*;

    #[test]
    fn store_receives_every_trade() {
        let bars = make_bars(&[100.0; 8]);
        let source = ConstantSource(Signal::Short);
        let config = backtest_config(engine_config(0.02, 0.03, 2));
        let store = MemoryStore::new();

        let result = run_backtest(&bars, &source, &config, Some(&store));

        assert_eq!(store.trades(), result.trades);
    }

    #[test]
    fn failing_store_does_not_stop_the_run() {
        let bars = make_bars(&[100.0; 8]);
        let source = ConstantSource(Signal::Long);
        let config = backtest_config(engine_config(0.02, 0.03, 2));
        let store = MemoryStore::failing();

        let result = run_backtest(&bars, &source, &config, Some(&store));

        assert_eq!(result.trades.len(), 2);
        assert!(store.trades().is_empty());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_store_round_trips_trades() {
        use breakout_trader::adapters::sqlite_adapter::SqliteAdapter;

        let bars = make_bars(&[100.0, 100.0, 98.0, 100.0, 100.0, 103.0]);
        let source = ScriptedSource::new(&[(1, Signal::Long), (3, Signal::Long)]);
        let config = backtest_config(engine_config(0.02, 0.03, 30));
        let store = SqliteAdapter::in_memory().unwrap();

        let result = run_backtest(&bars, &source, &config, Some(&store));

        assert_eq!(result.trades.len(), 2);
        let stored = store.fetch_trades(&config.engine.symbol).unwrap();
        assert_eq!(stored, result.trades);
        assert_eq!(stored[0].reason, CloseReason::StopLoss);
        assert_eq!(stored[1].reason, CloseReason::TakeProfit);
    }
}

mod external_source {
    use super::*;

    fn defaults() -> RiskParams {
        RiskParams {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.03,
        }
    }

    #[test]
    fn advisor_is_only_asked_on_complete_frames() {
        let bars = wavy_bars(30);
        let advisor = MockAdvisor::replying(&["direction: flat"]);
        let source = ExternalDecisionStrategy::new(&advisor, "BTC/USDT", defaults());
        let config = backtest_config(engine_config(0.02, 0.03, 30));
        let warmup = config.indicators.warmup_index();

        let result = run_backtest(&bars, &source, &config, None);

        assert!(result.trades.is_empty());
        assert!(result.open_position.is_none());
        let requests = advisor.requests();
        assert_eq!(requests.len(), bars.len() - warmup);
        assert_eq!(requests[0]["symbol"], "BTC/USDT");
        assert!(requests[0]["indicators"].is_object());
    }

    #[test]
    fn advisor_risk_overrides_engine_defaults() {
        let bars = make_bars(&[100.0; 12]);
        let reply = r#"{"action": "BUY", "stop_loss": "1%", "take_profit": "5%"}"#;
        let advisor = MockAdvisor::replying(&[reply]);
        let source = ExternalDecisionStrategy::new(&advisor, "BTC/USDT", defaults());
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        let position = result.open_position.expect("advisor asked for a long");
        assert_eq!(position.side, Side::Long);
        assert_relative_eq!(position.stop_loss_pct, 0.01);
        assert_relative_eq!(position.take_profit_pct, 0.05);
    }

    #[test]
    fn failing_advisor_stays_flat() {
        let bars = wavy_bars(30);
        let advisor = MockAdvisor::failing("advisor offline");
        let source = ExternalDecisionStrategy::new(&advisor, "BTC/USDT", defaults());
        let config = backtest_config(engine_config(0.02, 0.03, 30));

        let result = run_backtest(&bars, &source, &config, None);

        assert!(result.trades.is_empty());
        assert!(result.open_position.is_none());
        assert!(!advisor.requests().is_empty());
    }
}
