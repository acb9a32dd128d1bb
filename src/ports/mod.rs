//! Port traits at the I/O seams of the backtester.

pub mod config_port;
pub mod data_port;
pub mod trade_log_port;
