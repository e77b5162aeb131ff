//! breakout-trader: scalping breakout strategy with a backtest and a live
//! paper-trading driver sharing one position state machine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], process wiring in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
