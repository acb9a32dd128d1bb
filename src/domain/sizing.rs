//! Risk sizing: confidence-weighted allocation capped by ATR risk.

use super::exit::STOP_ATR_MULTIPLE;
use super::ledger::ExecutionCosts;

#[derive(Debug, Clone, PartialEq)]
pub struct SizingParams {
    /// Fraction of available cash committed at confidence 1.0.
    pub base_position_fraction: f64,
    /// Fraction of account capital risked over a 1.5 ATR stop.
    pub risk_per_trade: f64,
}

impl Default for SizingParams {
    fn default() -> Self {
        SizingParams {
            base_position_fraction: 0.95,
            risk_per_trade: 0.01,
        }
    }
}

/// Inputs that vary per order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInput {
    pub price: f64,
    pub confidence: f64,
    pub atr: Option<f64>,
    pub available_cash: f64,
    pub account_capital: f64,
}

/// Fraction of available cash to commit.
pub fn allocation_ratio(params: &SizingParams, input: &SizingInput) -> f64 {
    let weighted = params.base_position_fraction * input.confidence;
    match input.atr.filter(|a| a.is_finite() && *a > 0.0) {
        Some(atr) if input.price > 0.0 => {
            let risk_units =
                input.account_capital * params.risk_per_trade / (STOP_ATR_MULTIPLE * atr * input.price);
            let capped = if input.available_cash > 0.0 {
                risk_units * input.price / input.available_cash
            } else {
                0.0
            };
            weighted.min(capped)
        }
        _ => weighted,
    }
}

/// Whole units to order; never below 1. Whether the account can afford them
/// is decided by the ledger.
pub fn position_size(params: &SizingParams, input: &SizingInput, costs: &ExecutionCosts) -> i64 {
    if input.price <= 0.0 || !input.price.is_finite() {
        return 1;
    }
    let ratio = allocation_ratio(params, input);
    let units = (input.available_cash * ratio / (input.price * costs.buy_factor())).floor();
    if units.is_finite() && units >= 1.0 {
        units as i64
    } else {
        1
    }
}
