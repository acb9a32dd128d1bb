//! Account state and equity tracking.

use chrono::NaiveDateTime;

use super::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct EquitySample {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub position_value: f64,
    pub total_equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub position: Position,
    pub equity_curve: Vec<EquitySample>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            position: Position::flat(),
            equity_curve: Vec::new(),
        }
    }

    /// Appends one equity sample valued at `close`. Called once per bar.
    pub fn mark_to_market(&mut self, timestamp: NaiveDateTime, close: f64) -> &EquitySample {
        let position_value = self.position.market_value(close);
        self.equity_curve.push(EquitySample {
            timestamp,
            cash: self.cash,
            position_value,
            total_equity: self.cash + position_value,
        });
        &self.equity_curve[self.equity_curve.len() - 1]
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|s| s.total_equity)
            .unwrap_or(self.initial_capital)
    }
}
