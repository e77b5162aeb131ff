//! Concrete adapter implementations for ports.

pub mod command_advisor;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod paper_executor;
pub mod replay_feed;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
