//! Stop-loss / take-profit / reversal exit check for an open position.
//!
//! Levels are measured from the position's entry price. With at least 14
//! prior bars and a usable ATR the distances are ATR multiples, otherwise
//! fixed percentages of entry. `check_exit` is a pure function: calling it
//! twice on the same bar and position yields the same verdict.

use std::fmt;

use super::indicator_table::IndicatorTable;
use super::position::{Position, PositionSide};
use super::signal::{Direction, SignalEngine};

pub const ATR_MIN_INDEX: usize = 14;
pub const STOP_ATR_MULTIPLE: f64 = 1.5;
pub const TARGET_ATR_MULTIPLE: f64 = 2.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ExitParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for ExitParams {
    fn default() -> Self {
        ExitParams {
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
        }
    }
}

/// Stop and target prices. A `None` level never triggers (percentage of 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub stop: Option<f64>,
    pub target: Option<f64>,
    pub atr_based: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Reversal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::Reversal => write!(f, "reversal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub levels: ExitLevels,
    pub message: String,
}

/// Stop/target for `position` at bar `index`; `None` when flat or out of range.
pub fn exit_levels(
    table: &IndicatorTable,
    index: usize,
    position: &Position,
    params: &ExitParams,
) -> Option<ExitLevels> {
    let bar = table.get(index)?;
    let entry = position.entry_price;
    let sign = match position.side() {
        PositionSide::Long => 1.0,
        PositionSide::Short => -1.0,
        PositionSide::Flat => return None,
    };

    let atr = bar
        .indicators
        .atr
        .filter(|a| index >= ATR_MIN_INDEX && a.is_finite() && *a > 0.0);
    let levels = match atr {
        Some(atr) => ExitLevels {
            stop: Some(entry - sign * STOP_ATR_MULTIPLE * atr),
            target: Some(entry + sign * TARGET_ATR_MULTIPLE * atr),
            atr_based: true,
        },
        None => ExitLevels {
            stop: (params.stop_loss_pct > 0.0)
                .then(|| entry * (1.0 - sign * params.stop_loss_pct)),
            target: (params.take_profit_pct > 0.0)
                .then(|| entry * (1.0 + sign * params.take_profit_pct)),
            atr_based: false,
        },
    };
    Some(levels)
}

/// Evaluates stop, then target, then reversal against bar `index`.
pub fn check_exit(
    engine: &SignalEngine,
    table: &IndicatorTable,
    index: usize,
    position: &Position,
    params: &ExitParams,
) -> Option<ExitDecision> {
    let levels = exit_levels(table, index, position, params)?;
    let price = table.get(index)?.close;
    let long = position.is_long();
    let side = if long { "long" } else { "short" };

    if let Some(stop) = levels.stop {
        let hit = if long { price <= stop } else { price >= stop };
        if hit {
            return Some(ExitDecision {
                reason: ExitReason::StopLoss,
                levels,
                message: format!("{} stop-loss: close {:.2}, stop {:.2}", side, price, stop),
            });
        }
    }

    if let Some(target) = levels.target {
        let hit = if long { price >= target } else { price <= target };
        if hit {
            return Some(ExitDecision {
                reason: ExitReason::TakeProfit,
                levels,
                message: format!(
                    "{} take-profit: close {:.2}, target {:.2}",
                    side, price, target
                ),
            });
        }
    }

    // Unreachable from the state machine, which acts on opposite signals first.
    let against = if long { Direction::Sell } else { Direction::Buy };
    let signal = engine.composite(table, index)?;
    if signal.direction == against {
        return Some(ExitDecision {
            reason: ExitReason::Reversal,
            levels,
            message: format!("reversal exit: {}", signal.reason),
        });
    }
    None
}
