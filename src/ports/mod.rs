//! Collaborator traits implemented by [`crate::adapters`].

pub mod config_port;
pub mod data_port;
pub mod decision_port;
pub mod market_data_port;
pub mod order_port;
pub mod trade_store_port;
