//! Core domain types and logic.

pub mod bar;
pub mod indicator;
pub mod signal;
pub mod position;
pub mod sizing;
pub mod engine;
pub mod backtest;
pub mod live;
pub mod metrics;
pub mod config_validation;
pub mod error;
