//! Position state machine: turns one bar's composite signal into order intents.
//!
//! Priority per bar:
//! 1. BUY while not long: cover any short, then open long.
//! 2. SELL while not short: close any long, then open short (if allowed).
//! 3. Otherwise, while holding, run the exit check and close on a trigger.
//!
//! An opposite signal is always taken by rule 1 or 2, so the exit check never
//! reports a reversal from here.

use super::exit::{ExitDecision, ExitReason};
use super::ledger::Action;
use super::position::PositionSide;
use super::signal::{CompositeSignal, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderQuantity {
    /// Everything currently held on the closing side.
    Full,
    /// Decided by risk sizing at execution time.
    Sized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub action: Action,
    pub quantity: OrderQuantity,
    pub reason: String,
    pub exit: Option<ExitReason>,
}

impl OrderIntent {
    fn close(action: Action, reason: String) -> Self {
        OrderIntent {
            action,
            quantity: OrderQuantity::Full,
            reason,
            exit: None,
        }
    }

    fn open(action: Action, reason: &str) -> Self {
        OrderIntent {
            action,
            quantity: OrderQuantity::Sized,
            reason: reason.to_string(),
            exit: None,
        }
    }
}

/// Intents for one bar, in execution order. `exit_check` runs only when the
/// signal leaves a held position untouched.
pub fn transition(
    signal: &CompositeSignal,
    side: PositionSide,
    allow_shorting: bool,
    exit_check: impl FnOnce() -> Option<ExitDecision>,
) -> Vec<OrderIntent> {
    let mut intents = Vec::new();
    match (signal.direction, side) {
        (Direction::Buy, PositionSide::Flat | PositionSide::Short) => {
            if side == PositionSide::Short {
                intents.push(OrderIntent::close(
                    Action::BuyToCover,
                    format!("close short; {}", signal.reason),
                ));
            }
            intents.push(OrderIntent::open(Action::Buy, &signal.reason));
        }
        (Direction::Sell, PositionSide::Flat | PositionSide::Long) => {
            if side == PositionSide::Long {
                intents.push(OrderIntent::close(
                    Action::Sell,
                    format!("close long; {}", signal.reason),
                ));
            }
            if allow_shorting {
                intents.push(OrderIntent::open(Action::SellShort, &signal.reason));
            }
        }
        (_, PositionSide::Flat) => {}
        (_, held) => {
            if let Some(decision) = exit_check() {
                let action = if held == PositionSide::Long {
                    Action::Sell
                } else {
                    Action::BuyToCover
                };
                intents.push(OrderIntent {
                    action,
                    quantity: OrderQuantity::Full,
                    reason: decision.message,
                    exit: Some(decision.reason),
                });
            }
        }
    }
    intents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exit::ExitLevels;
    use crate::domain::indicator_table::Indicators;
    use chrono::NaiveDate;

    fn signal(direction: Direction) -> CompositeSignal {
        CompositeSignal {
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            direction,
            price: 100.0,
            confidence: 0.3,
            buy_score: 0.0,
            sell_score: 0.0,
            indicators: Indicators::default(),
            reason: "why".into(),
        }
    }

    fn stop() -> Option<ExitDecision> {
        Some(ExitDecision {
            reason: ExitReason::StopLoss,
            levels: ExitLevels {
                stop: Some(97.0),
                target: Some(105.0),
                atr_based: true,
            },
            message: "long stop-loss".into(),
        })
    }

    fn actions(intents: &[OrderIntent]) -> Vec<Action> {
        intents.iter().map(|i| i.action).collect()
    }

    #[test]
    fn buy_from_flat_opens_long() {
        let intents = transition(&signal(Direction::Buy), PositionSide::Flat, true, || None);
        assert_eq!(actions(&intents), vec![Action::Buy]);
        assert_eq!(intents[0].quantity, OrderQuantity::Sized);
        assert_eq!(intents[0].reason, "why");
    }

    #[test]
    fn buy_from_short_covers_then_opens() {
        let intents = transition(&signal(Direction::Buy), PositionSide::Short, true, || None);
        assert_eq!(actions(&intents), vec![Action::BuyToCover, Action::Buy]);
        assert_eq!(intents[0].quantity, OrderQuantity::Full);
        assert_eq!(intents[0].reason, "close short; why");
    }

    #[test]
    fn sell_from_long_closes_then_shorts() {
        let intents = transition(&signal(Direction::Sell), PositionSide::Long, true, || None);
        assert_eq!(actions(&intents), vec![Action::Sell, Action::SellShort]);
        assert_eq!(intents[0].reason, "close long; why");
    }

    #[test]
    fn sell_without_shorting_only_closes() {
        let intents = transition(&signal(Direction::Sell), PositionSide::Long, false, || None);
        assert_eq!(actions(&intents), vec![Action::Sell]);
        let intents = transition(&signal(Direction::Sell), PositionSide::Flat, false, || None);
        assert!(intents.is_empty());
    }

    #[test]
    fn same_direction_signal_runs_exit_check() {
        let intents = transition(&signal(Direction::Buy), PositionSide::Long, true, stop);
        assert_eq!(actions(&intents), vec![Action::Sell]);
        assert_eq!(intents[0].exit, Some(ExitReason::StopLoss));
        assert_eq!(intents[0].reason, "long stop-loss");
    }

    #[test]
    fn hold_while_short_exits_with_cover() {
        let intents = transition(&signal(Direction::Hold), PositionSide::Short, true, stop);
        assert_eq!(actions(&intents), vec![Action::BuyToCover]);
    }

    #[test]
    fn hold_while_flat_never_checks_exit() {
        let intents = transition(&signal(Direction::Hold), PositionSide::Flat, true, || -> Option<ExitDecision> {
            panic!("exit check must not run while flat")
        });
        assert!(intents.is_empty());
    }

    #[test]
    fn opposite_signal_never_reaches_exit_check() {
        for (direction, side) in [
            (Direction::Sell, PositionSide::Long),
            (Direction::Buy, PositionSide::Short),
        ] {
            for allow_shorting in [true, false] {
                let intents = transition(&signal(direction), side, allow_shorting, || -> Option<ExitDecision> {
                    panic!("exit check must not run on an opposite signal")
                });
                assert!(intents.iter().all(|i| i.exit.is_none()));
                assert!(!intents.is_empty());
            }
        }
    }

    #[test]
    fn no_trigger_no_orders() {
        let intents = transition(&signal(Direction::Hold), PositionSide::Long, true, || None);
        assert!(intents.is_empty());
    }
}
