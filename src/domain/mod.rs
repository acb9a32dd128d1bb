//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_table;
pub mod signal;
pub mod position;
pub mod exit;
pub mod state_machine;
pub mod sizing;
pub mod ledger;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod error;
