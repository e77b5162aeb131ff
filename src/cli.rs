//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapters::command_advisor::{CommandAdvisor, DEFAULT_DECISION_TIMEOUT};
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_executor::PaperExecutor;
use crate::adapters::replay_feed::ReplayFeed;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::bar::Bar;
use crate::domain::config_validation::validate_config;
use crate::domain::engine::EngineConfig;
use crate::domain::error::TraderError;
use crate::domain::indicator::IndicatorConfig;
use crate::domain::live::{LiveConfig, LiveDriver, LiveSummary, RetryPolicy};
use crate::domain::metrics::Metrics;
use crate::domain::position::Trade;
use crate::domain::signal::breakout::{BreakoutConfig, BreakoutStrategy};
use crate::domain::signal::external::ExternalDecisionStrategy;
use crate::domain::signal::{RiskParams, SignalSource};
use crate::domain::sizing::NotionalFloor;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::trade_store_port::TradeStorePort;

#[derive(Parser, Debug)]
#[command(name = "breakout-trader", about = "Scalping breakout backtester and paper trader")]
pub struct Cli {
    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over historical bars
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// CSV bar file; overrides `[backtest] data_csv` and the SQLite store
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
    /// Paper-trade by replaying a CSV file through the live driver
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import CSV bars into the SQLite `ohlcv` table
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest { config, data } => run_backtest(&config, data.as_deref()),
        Command::Live { config, data } => run_live(&config, &data),
        Command::Validate { config } => run_validate(&config),
        Command::Import { config, data } => run_import(&config, &data),
    }
}

/// Load and validate a config file, reporting failures on stderr.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let adapter = FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return Err((&e).into());
    }
    Ok(adapter)
}

fn usize_value(adapter: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    adapter.get_int(section, key, default as i64).max(0) as usize
}

pub fn build_engine_config(adapter: &dyn ConfigPort) -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        symbol: adapter
            .get_string("engine", "symbol")
            .unwrap_or(defaults.symbol),
        strategy_label: adapter
            .get_string("engine", "strategy_label")
            .unwrap_or(defaults.strategy_label),
        fee_rate: adapter.get_double("engine", "fee_rate", defaults.fee_rate),
        stop_loss_pct: adapter.get_double("engine", "stop_loss_pct", defaults.stop_loss_pct),
        take_profit_pct: adapter.get_double("engine", "take_profit_pct", defaults.take_profit_pct),
        max_hold_bars: usize_value(adapter, "engine", "max_hold_bars", defaults.max_hold_bars),
    }
}

pub fn build_indicator_config(adapter: &dyn ConfigPort) -> IndicatorConfig {
    let d = IndicatorConfig::default();
    IndicatorConfig {
        breakout_bars: usize_value(adapter, "indicators", "breakout_bars", d.breakout_bars),
        volume_lookback: usize_value(adapter, "indicators", "volume_lookback", d.volume_lookback),
        vwap_period: usize_value(adapter, "indicators", "vwap_period", d.vwap_period),
        rsi_period: usize_value(adapter, "indicators", "rsi_period", d.rsi_period),
        ema_period: usize_value(adapter, "indicators", "ema_period", d.ema_period),
        bb_period: usize_value(adapter, "indicators", "bb_period", d.bb_period),
        bb_std_dev: adapter.get_double("indicators", "bb_std_dev", d.bb_std_dev),
        atr_period: usize_value(adapter, "indicators", "atr_period", d.atr_period),
        lag_oscillators: adapter.get_bool("indicators", "lag_oscillators", d.lag_oscillators),
    }
}

pub fn build_breakout_config(adapter: &dyn ConfigPort) -> BreakoutConfig {
    let d = BreakoutConfig::default();
    BreakoutConfig {
        rsi_long_min: adapter.get_double("signal", "rsi_long_min", d.rsi_long_min),
        rsi_long_max: adapter.get_double("signal", "rsi_long_max", d.rsi_long_max),
        rsi_short_min: adapter.get_double("signal", "rsi_short_min", d.rsi_short_min),
        rsi_short_max: adapter.get_double("signal", "rsi_short_max", d.rsi_short_max),
        use_order_flow: adapter.get_bool("signal", "use_order_flow", d.use_order_flow),
        imbalance_threshold: adapter.get_double(
            "signal",
            "imbalance_threshold",
            d.imbalance_threshold,
        ),
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> BacktestConfig {
    let d = BacktestConfig::default();
    BacktestConfig {
        engine: build_engine_config(adapter),
        indicators: build_indicator_config(adapter),
        initial_capital: adapter.get_double("backtest", "initial_capital", d.initial_capital),
        position_fraction: adapter.get_double("backtest", "position_fraction", d.position_fraction),
    }
}

pub fn build_live_config(adapter: &dyn ConfigPort) -> LiveConfig {
    let d = LiveConfig::default();
    let retry = RetryPolicy {
        base: Duration::from_secs(
            adapter.get_int("live", "retry_base_secs", d.retry.base.as_secs() as i64).max(1) as u64,
        ),
        max: Duration::from_secs(
            adapter.get_int("live", "retry_max_secs", d.retry.max.as_secs() as i64).max(1) as u64,
        ),
    };
    LiveConfig {
        engine: build_engine_config(adapter),
        indicators: build_indicator_config(adapter),
        initial_capital: adapter.get_double("backtest", "initial_capital", d.initial_capital),
        poll_interval: Duration::from_secs(
            adapter
                .get_int("live", "poll_interval_secs", d.poll_interval.as_secs() as i64)
                .max(0) as u64,
        ),
        history_limit: usize_value(adapter, "live", "history_limit", d.history_limit).max(1),
        daily_loss_limit: adapter.get_double("live", "daily_loss_limit", d.daily_loss_limit),
        use_depth: adapter.get_bool("live", "use_depth", d.use_depth),
        retry,
        stop_after_idle_cycles: d.stop_after_idle_cycles,
    }
}

pub fn build_sizing(adapter: &dyn ConfigPort) -> NotionalFloor {
    NotionalFloor {
        notional: adapter.get_double("live", "notional", 100.0),
        quantity_step: adapter.get_double("live", "quantity_step", 0.01),
    }
}

/// Pick the configured signal source. `external` wraps the `[external]`
/// command; anything else is the rule-based breakout.
pub fn build_signal_source(
    adapter: &dyn ConfigPort,
    engine: &EngineConfig,
) -> Result<Box<dyn SignalSource>, TraderError> {
    let source = adapter
        .get_string("signal", "source")
        .unwrap_or_else(|| "breakout".to_string())
        .to_lowercase();

    if source != "external" {
        return Ok(Box::new(BreakoutStrategy::new(build_breakout_config(adapter))));
    }

    let command = adapter
        .get_string("external", "command")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "external".into(),
            key: "command".into(),
        })?;
    let timeout = adapter.get_int(
        "external",
        "timeout_secs",
        DEFAULT_DECISION_TIMEOUT.as_secs() as i64,
    );
    let advisor = CommandAdvisor::from_command_line(&command)?
        .with_timeout(Duration::from_secs(timeout.max(1) as u64));
    let defaults = RiskParams {
        stop_loss_pct: adapter.get_double(
            "external",
            "default_stop_loss_pct",
            engine.stop_loss_pct,
        ),
        take_profit_pct: adapter.get_double(
            "external",
            "default_take_profit_pct",
            engine.take_profit_pct,
        ),
    };
    Ok(Box::new(ExternalDecisionStrategy::new(
        advisor,
        engine.symbol.clone(),
        defaults,
    )))
}

/// Bars for a backtest: `--data`, then `[backtest] data_csv`, then SQLite.
pub fn load_backtest_bars(
    adapter: &dyn ConfigPort,
    data: Option<&Path>,
    symbol: &str,
) -> Result<Vec<Bar>, TraderError> {
    let csv_path = data
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("backtest", "data_csv").map(PathBuf::from));
    if let Some(path) = csv_path {
        return CsvAdapter::new(path).fetch_bars(symbol);
    }

    #[cfg(feature = "sqlite")]
    {
        if adapter.has_key("sqlite", "path") {
            let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(adapter)?;
            return store.fetch_bars(symbol);
        }
    }

    Err(TraderError::ConfigMissing {
        section: "backtest".into(),
        key: "data_csv".into(),
    })
}

/// Trade store for closed trades, when `[sqlite] path` is configured.
pub fn open_trade_store(
    adapter: &dyn ConfigPort,
) -> Result<Option<Box<dyn TradeStorePort>>, TraderError> {
    #[cfg(feature = "sqlite")]
    {
        if adapter.has_key("sqlite", "path") {
            let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(adapter)?;
            return Ok(Some(Box::new(store)));
        }
    }
    #[cfg(not(feature = "sqlite"))]
    {
        if adapter.has_key("sqlite", "path") {
            warn!("sqlite feature is disabled, trades will not be persisted");
        }
    }
    Ok(None)
}

fn run_backtest(config_path: &Path, data: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match run_backtest_pipeline(&adapter, data) {
        Ok(result) => {
            print_backtest_summary(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load bars, run the backtest and persist trades when a store is configured.
pub fn run_backtest_pipeline(
    adapter: &dyn ConfigPort,
    data: Option<&Path>,
) -> Result<BacktestResult, TraderError> {
    let config = build_backtest_config(adapter);
    let symbol = config.engine.symbol.clone();

    let bars = load_backtest_bars(adapter, data, &symbol)?;
    let minimum = config.indicators.min_bars();
    if bars.len() < minimum {
        return Err(TraderError::InsufficientData {
            symbol,
            bars: bars.len(),
            minimum,
        });
    }
    eprintln!("Loaded {} bars for {}", bars.len(), symbol);

    let source = build_signal_source(adapter, &config.engine)?;
    let store = open_trade_store(adapter)?;

    info!(symbol = %symbol, source = source.name(), bars = bars.len(), "running backtest");
    Ok(backtest_engine::run_backtest(
        &bars,
        source.as_ref(),
        &config,
        store.as_deref(),
    ))
}

fn print_trade(trade: &Trade) {
    eprintln!(
        "  {} {} {:.6} @ {:.4} -> {:.4}  pnl {:+.4}  fee {:.4}  {}",
        trade.close_time.format("%Y-%m-%d %H:%M"),
        trade.side,
        trade.quantity,
        trade.open_price,
        trade.close_price,
        trade.pnl,
        trade.fee,
        trade.reason,
    );
}

fn print_metrics(initial_capital: f64, trades: &[Trade]) {
    let metrics = Metrics::compute(initial_capital, trades);
    eprintln!("\nSummary:");
    eprintln!("  Trades:        {}", metrics.total_trades);
    eprintln!("  Won / Lost:    {} / {}", metrics.trades_won, metrics.trades_lost);
    eprintln!("  Win rate:      {:.2}%", metrics.win_rate * 100.0);
    eprintln!("  Total fees:    {:.4}", metrics.total_fees);
    eprintln!("  Net PnL:       {:+.4}", metrics.net_pnl);
    eprintln!("  Return:        {:+.2}%", metrics.total_return * 100.0);
    eprintln!("  Max drawdown:  {:.2}%", metrics.max_drawdown * 100.0);
    eprintln!("  Profit factor: {:.2}", metrics.profit_factor);

    if !trades.is_empty() {
        eprintln!("\nLast trades:");
        for trade in trades.iter().rev().take(5).rev() {
            print_trade(trade);
        }
    }
}

fn print_backtest_summary(result: &BacktestResult) {
    eprintln!("\nBacktest complete over {} bars", result.bars_evaluated);
    eprintln!("  Initial capital: {:.4}", result.initial_capital);
    eprintln!("  Final capital:   {:.4}", result.final_capital);
    if let Some(position) = &result.open_position {
        eprintln!(
            "  Still open:      {} {:.6} @ {:.4}",
            position.side, position.quantity, position.open_price
        );
    }
    print_metrics(result.initial_capital, &result.trades);
}

fn run_live(config_path: &Path, data: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let e = TraderError::from(e);
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match runtime.block_on(run_paper_session(&adapter, data)) {
        Ok(summary) => {
            print_live_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Replay a CSV file through the live driver with a paper executor. Stops
/// once the feed is exhausted or on Ctrl-C.
pub async fn run_paper_session(
    adapter: &dyn ConfigPort,
    data: &Path,
) -> Result<LiveSummary, TraderError> {
    let mut config = build_live_config(adapter);
    config.poll_interval = Duration::ZERO;
    config.stop_after_idle_cycles = Some(1);
    if config.use_depth {
        warn!("replay feed has no order book, ignoring [live] use_depth");
        config.use_depth = false;
    }

    let bars = CsvAdapter::new(data).fetch_bars(&config.engine.symbol)?;
    eprintln!("Replaying {} bars for {}", bars.len(), config.engine.symbol);

    let feed = ReplayFeed::new(bars, config.history_limit);
    let source = build_signal_source(adapter, &config.engine)?;
    let sizing = Box::new(build_sizing(adapter));
    let store = open_trade_store(adapter)?;

    let mut driver = LiveDriver::new(feed, PaperExecutor::new(), source, sizing, config);
    if let Some(store) = store {
        driver = driver.with_store(store);
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current cycle");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for interrupt");
                // Keep the sender alive so the driver does not read a closed
                // channel as a shutdown request.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    Ok(driver.run(shutdown_rx).await)
}

fn print_live_summary(summary: &LiveSummary) {
    eprintln!(
        "\nPaper session complete: {} cycles ({} failed)",
        summary.cycles, summary.failed_cycles
    );
    eprintln!("  Initial capital: {:.4}", summary.equity.initial_capital);
    eprintln!("  Final capital:   {:.4}", summary.equity.capital);
    if let Some(position) = &summary.open_position {
        eprintln!(
            "  Still open:      {} {:.6} @ {:.4}",
            position.side, position.quantity, position.open_price
        );
    }
    print_metrics(summary.equity.initial_capital, &summary.trades);
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let engine = build_engine_config(&adapter);
    let indicators = build_indicator_config(&adapter);
    let source = adapter
        .get_string("signal", "source")
        .unwrap_or_else(|| "breakout".to_string());

    eprintln!("\nEngine:");
    eprintln!("  symbol:          {}", engine.symbol);
    eprintln!("  fee_rate:        {}", engine.fee_rate);
    eprintln!("  stop_loss_pct:   {}", engine.stop_loss_pct);
    eprintln!("  take_profit_pct: {}", engine.take_profit_pct);
    eprintln!("  max_hold_bars:   {}", engine.max_hold_bars);
    eprintln!("\nSignal source: {}", source);
    eprintln!("Minimum bars before the first decision: {}", indicators.min_bars());

    eprintln!("\nConfig is valid");
    ExitCode::SUCCESS
}

fn run_import(config_path: &Path, data: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match import_bars(&adapter, data) {
        Ok(written) => {
            eprintln!("Imported {} bars from {}", written, data.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Copy CSV bars into the SQLite `ohlcv` table under the configured symbol.
#[cfg(feature = "sqlite")]
pub fn import_bars(adapter: &dyn ConfigPort, data: &Path) -> Result<usize, TraderError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use crate::ports::data_port::BarStorePort;

    let symbol = build_engine_config(adapter).symbol;
    let bars = CsvAdapter::new(data).fetch_bars(&symbol)?;
    let store = SqliteAdapter::from_config(adapter)?;
    store.store_bars(&symbol, &bars)
}

#[cfg(not(feature = "sqlite"))]
pub fn import_bars(_adapter: &dyn ConfigPort, _data: &Path) -> Result<usize, TraderError> {
    Err(TraderError::Database {
        reason: "sqlite feature is required for import".into(),
    })
}
