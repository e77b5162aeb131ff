//! Configuration validation.
//!
//! Validates every section before a run so that the builders in
//! [`crate::cli`] can read values with plain defaults.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;

/// Largest accepted indicator window.
pub const MAX_PERIOD: i64 = 10_000;
/// Largest accepted live history buffer, in bars.
pub const MAX_HISTORY_LIMIT: i64 = 100_000;

const INT_KEYS: &[(&str, &str)] = &[
    ("engine", "max_hold_bars"),
    ("indicators", "breakout_bars"),
    ("indicators", "volume_lookback"),
    ("indicators", "vwap_period"),
    ("indicators", "rsi_period"),
    ("indicators", "ema_period"),
    ("indicators", "bb_period"),
    ("indicators", "atr_period"),
    ("live", "poll_interval_secs"),
    ("live", "history_limit"),
    ("live", "retry_base_secs"),
    ("live", "retry_max_secs"),
    ("external", "timeout_secs"),
];

const FLOAT_KEYS: &[(&str, &str)] = &[
    ("engine", "fee_rate"),
    ("engine", "stop_loss_pct"),
    ("engine", "take_profit_pct"),
    ("indicators", "bb_std_dev"),
    ("signal", "rsi_long_min"),
    ("signal", "rsi_long_max"),
    ("signal", "rsi_short_min"),
    ("signal", "rsi_short_max"),
    ("signal", "imbalance_threshold"),
    ("external", "default_stop_loss_pct"),
    ("external", "default_take_profit_pct"),
    ("backtest", "initial_capital"),
    ("backtest", "position_fraction"),
    ("live", "daily_loss_limit"),
    ("live", "notional"),
    ("live", "quantity_step"),
];

const BOOL_KEYS: &[(&str, &str)] = &[
    ("indicators", "lag_oscillators"),
    ("signal", "use_order_flow"),
    ("live", "use_depth"),
];

/// Validate every section used by any subcommand.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_value_types(config)?;
    validate_engine_config(config)?;
    validate_indicator_config(config)?;
    validate_signal_config(config)?;
    validate_backtest_config(config)?;
    validate_live_config(config)?;
    Ok(())
}

/// Reject values that are present but not parseable, which the config port
/// would otherwise replace with the default silently.
pub fn validate_value_types(config: &dyn ConfigPort) -> Result<(), TraderError> {
    for &(section, key) in INT_KEYS {
        if let Some(raw) = config.get_string(section, key) {
            if raw.trim().parse::<i64>().is_err() {
                let reason = format!("'{}' is not an integer", raw);
                return Err(TraderError::invalid(section, key, reason));
            }
        }
    }
    for &(section, key) in FLOAT_KEYS {
        if let Some(raw) = config.get_string(section, key) {
            if !raw.trim().parse::<f64>().is_ok_and(f64::is_finite) {
                let reason = format!("'{}' is not a number", raw);
                return Err(TraderError::invalid(section, key, reason));
            }
        }
    }
    for &(section, key) in BOOL_KEYS {
        if let Some(raw) = config.get_string(section, key) {
            let known = matches!(
                raw.trim().to_lowercase().as_str(),
                "true" | "false" | "yes" | "no" | "1" | "0"
            );
            if !known {
                let reason = format!("'{}' is not a boolean", raw);
                return Err(TraderError::invalid(section, key, reason));
            }
        }
    }
    Ok(())
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(symbol) = config.get_string("engine", "symbol") {
        if symbol.trim().is_empty() {
            return Err(TraderError::invalid("engine", "symbol", "symbol must not be empty"));
        }
    }

    let fee_rate = config.get_double("engine", "fee_rate", 0.0004);
    if !(0.0..1.0).contains(&fee_rate) {
        return Err(TraderError::invalid("engine", "fee_rate", "fee_rate must be in [0, 1)"));
    }

    let stop = config.get_double("engine", "stop_loss_pct", 0.005);
    if stop <= 0.0 || stop >= 1.0 {
        return Err(TraderError::invalid(
            "engine",
            "stop_loss_pct",
            "stop_loss_pct must be between 0 and 1",
        ));
    }

    let target = config.get_double("engine", "take_profit_pct", 0.01);
    if target <= 0.0 {
        return Err(TraderError::invalid(
            "engine",
            "take_profit_pct",
            "take_profit_pct must be positive",
        ));
    }

    if config.get_int("engine", "max_hold_bars", 30) < 1 {
        return Err(TraderError::invalid(
            "engine",
            "max_hold_bars",
            "max_hold_bars must be at least 1",
        ));
    }
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    for key in [
        "breakout_bars",
        "volume_lookback",
        "vwap_period",
        "rsi_period",
        "ema_period",
        "atr_period",
    ] {
        let period = config.get_int("indicators", key, 14);
        if !(1..=MAX_PERIOD).contains(&period) {
            let reason = format!("{} must be between 1 and {}", key, MAX_PERIOD);
            return Err(TraderError::invalid("indicators", key, reason));
        }
    }

    let bb_period = config.get_int("indicators", "bb_period", 20);
    if !(2..=MAX_PERIOD).contains(&bb_period) {
        return Err(TraderError::invalid(
            "indicators",
            "bb_period",
            format!("bb_period must be between 2 and {}", MAX_PERIOD),
        ));
    }

    if config.get_double("indicators", "bb_std_dev", 2.0) <= 0.0 {
        return Err(TraderError::invalid(
            "indicators",
            "bb_std_dev",
            "bb_std_dev must be positive",
        ));
    }
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let source = config
        .get_string("signal", "source")
        .unwrap_or_else(|| "breakout".to_string());
    match source.trim().to_lowercase().as_str() {
        "breakout" => {}
        "external" => match config.get_string("external", "command") {
            Some(c) if !c.trim().is_empty() => {}
            _ => {
                return Err(TraderError::ConfigMissing {
                    section: "external".to_string(),
                    key: "command".to_string(),
                })
            }
        },
        other => {
            return Err(TraderError::invalid(
                "signal",
                "source",
                format!("unknown signal source '{}', expected breakout or external", other),
            ))
        }
    }

    validate_band(config, "rsi_long_min", 50.0, "rsi_long_max", 70.0)?;
    validate_band(config, "rsi_short_min", 30.0, "rsi_short_max", 50.0)?;

    let threshold = config.get_double("signal", "imbalance_threshold", 0.3);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(TraderError::invalid(
            "signal",
            "imbalance_threshold",
            "imbalance_threshold must be between 0 and 1",
        ));
    }

    for key in ["default_stop_loss_pct", "default_take_profit_pct"] {
        let value = config.get_double("external", key, 0.01);
        if value <= 0.0 || value >= 1.0 {
            let reason = format!("{} must be between 0 and 1", key);
            return Err(TraderError::invalid("external", key, reason));
        }
    }

    if config.get_int("external", "timeout_secs", 30) < 1 {
        return Err(TraderError::invalid(
            "external",
            "timeout_secs",
            "timeout_secs must be at least 1",
        ));
    }
    Ok(())
}

fn validate_band(
    config: &dyn ConfigPort,
    min_key: &str,
    min_default: f64,
    max_key: &str,
    max_default: f64,
) -> Result<(), TraderError> {
    let min = config.get_double("signal", min_key, min_default);
    let max = config.get_double("signal", max_key, max_default);
    for (key, value) in [(min_key, min), (max_key, max)] {
        if !(0.0..=100.0).contains(&value) {
            let reason = format!("{} must be between 0 and 100", key);
            return Err(TraderError::invalid("signal", key, reason));
        }
    }
    if min >= max {
        return Err(TraderError::invalid(
            "signal",
            min_key,
            format!("{} must be below {}", min_key, max_key),
        ));
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_double("backtest", "initial_capital", 1000.0) <= 0.0 {
        return Err(TraderError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let fraction = config.get_double("backtest", "position_fraction", 0.1);
    if fraction <= 0.0 || fraction > 1.0 {
        return Err(TraderError::invalid(
            "backtest",
            "position_fraction",
            "position_fraction must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_int("live", "poll_interval_secs", 60) < 0 {
        return Err(TraderError::invalid(
            "live",
            "poll_interval_secs",
            "poll_interval_secs must be non-negative",
        ));
    }

    let history_limit = config.get_int("live", "history_limit", 100);
    if !(1..=MAX_HISTORY_LIMIT).contains(&history_limit) {
        return Err(TraderError::invalid(
            "live",
            "history_limit",
            format!("history_limit must be between 1 and {}", MAX_HISTORY_LIMIT),
        ));
    }

    if config.get_double("live", "daily_loss_limit", -5.0) >= 0.0 {
        return Err(TraderError::invalid(
            "live",
            "daily_loss_limit",
            "daily_loss_limit must be negative",
        ));
    }

    if config.get_double("live", "notional", 100.0) <= 0.0 {
        return Err(TraderError::invalid("live", "notional", "notional must be positive"));
    }

    if config.get_double("live", "quantity_step", 0.01) < 0.0 {
        return Err(TraderError::invalid(
            "live",
            "quantity_step",
            "quantity_step must be non-negative",
        ));
    }

    let base = config.get_int("live", "retry_base_secs", 10);
    let max = config.get_int("live", "retry_max_secs", 300);
    if base < 1 {
        return Err(TraderError::invalid(
            "live",
            "retry_base_secs",
            "retry_base_secs must be at least 1",
        ));
    }
    if max < base {
        return Err(TraderError::invalid(
            "live",
            "retry_max_secs",
            "retry_max_secs must not be below retry_base_secs",
        ));
    }
    Ok(())
}
