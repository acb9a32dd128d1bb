//! Backtest run loop.
//!
//! All mutable run state lives in a [`SimulationContext`] that is created
//! fresh for every run and threaded through [`step`]. The indicator table is
//! only ever read, so independent runs over the same table can proceed in
//! parallel as long as each has its own context.

use chrono::{NaiveDate, NaiveDateTime};

use super::exit::{check_exit, ExitReason};
use super::indicator_table::IndicatorTable;
use super::ledger::{self, Action, ExecutionCosts, Order, RejectReason, Trade};
use super::metrics::{daily_returns, pair_round_trips, MatchPolicy, Metrics, RoundTrip};
use super::portfolio::{EquitySample, Portfolio};
use super::signal::{CompositeSignal, SignalEngine};
use super::sizing::{position_size, SizingInput};
use super::state_machine::{transition, OrderQuantity};
use super::strategy::Strategy;
use crate::ports::trade_log_port::TradeLogPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub costs: ExecutionCosts,
    /// Date range handed to the data source; `None` is unbounded.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub match_policy: MatchPolicy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            costs: ExecutionCosts::default(),
            start_date: None,
            end_date: None,
            match_policy: MatchPolicy::default(),
        }
    }
}

/// Non-fatal conditions observed during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    OrderRejected {
        timestamp: NaiveDateTime,
        action: Action,
        quantity: i64,
        reason: RejectReason,
    },
    ExitTriggered {
        timestamp: NaiveDateTime,
        reason: ExitReason,
        price: f64,
    },
    /// A closing trade with no unmatched opening trade to pair with.
    UnmatchedClose {
        trade_index: usize,
        timestamp: NaiveDateTime,
        action: Action,
    },
}

pub struct SimulationContext<'a> {
    pub portfolio: Portfolio,
    pub trades: Vec<Trade>,
    pub events: Vec<SimulationEvent>,
    pub signals: Vec<CompositeSignal>,
    trade_log: Option<&'a mut dyn TradeLogPort>,
}

impl<'a> SimulationContext<'a> {
    pub fn new(initial_capital: f64, trade_log: Option<&'a mut dyn TradeLogPort>) -> Self {
        SimulationContext {
            portfolio: Portfolio::new(initial_capital),
            trades: Vec::new(),
            events: Vec::new(),
            signals: Vec::new(),
            trade_log,
        }
    }

    fn record_trade(&mut self, trade: Trade) {
        if let Some(log) = self.trade_log.as_mut() {
            if let Err(e) = log.record(&trade) {
                tracing::warn!("Failed to write trade log: {}", e);
            }
        }
        self.trades.push(trade);
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub metrics: Metrics,
    pub equity_curve: Vec<EquitySample>,
    pub trades: Vec<Trade>,
    pub daily_returns: Vec<f64>,
    pub round_trips: Vec<RoundTrip>,
    pub events: Vec<SimulationEvent>,
    pub signals: Vec<CompositeSignal>,
}

/// Processes bar `index`: signal, state transition, orders, then one equity
/// sample at the bar's close.
pub fn step(
    ctx: &mut SimulationContext<'_>,
    table: &IndicatorTable,
    index: usize,
    engine: &SignalEngine,
    strategy: &Strategy,
    costs: &ExecutionCosts,
) {
    let Some(bar) = table.get(index) else {
        return;
    };
    let Some(signal) = engine.composite(table, index) else {
        return;
    };

    let position = &ctx.portfolio.position;
    let intents = transition(&signal, position.side(), strategy.allow_shorting, || {
        check_exit(engine, table, index, position, &strategy.exits)
    });

    for intent in intents {
        let quantity = match intent.quantity {
            OrderQuantity::Full => ctx.portfolio.position.quantity.abs(),
            OrderQuantity::Sized => position_size(
                &strategy.sizing,
                &SizingInput {
                    price: signal.price,
                    confidence: signal.confidence,
                    atr: bar.indicators.atr,
                    available_cash: ctx.portfolio.cash,
                    account_capital: ctx.portfolio.initial_capital,
                },
                costs,
            ),
        };

        if let Some(reason) = intent.exit {
            tracing::debug!("{} exit at {} ({:.2})", reason, signal.timestamp, signal.price);
            ctx.events.push(SimulationEvent::ExitTriggered {
                timestamp: signal.timestamp,
                reason,
                price: signal.price,
            });
        }

        let order = Order {
            timestamp: signal.timestamp,
            action: intent.action,
            price: signal.price,
            quantity,
            reason: intent.reason,
        };
        match ledger::execute(&mut ctx.portfolio, &order, costs) {
            Ok(trade) => {
                tracing::debug!(
                    "{} {} {} @ {:.2}, cash {:.2}, position {}",
                    trade.timestamp,
                    trade.action,
                    trade.quantity,
                    trade.price,
                    trade.cash_after,
                    trade.position_after
                );
                ctx.record_trade(trade);
            }
            Err(reason) => {
                tracing::debug!(
                    "{} {} {} rejected: {}",
                    order.timestamp,
                    order.action,
                    order.quantity,
                    reason
                );
                ctx.events.push(SimulationEvent::OrderRejected {
                    timestamp: order.timestamp,
                    action: order.action,
                    quantity: order.quantity,
                    reason,
                });
            }
        }
    }

    ctx.portfolio.mark_to_market(bar.timestamp, bar.close);
    ctx.signals.push(signal);
}

/// Runs the strategy over every bar of `table` with fresh account state.
pub fn run_backtest(
    table: &IndicatorTable,
    strategy: &Strategy,
    config: &BacktestConfig,
    trade_log: Option<&mut dyn TradeLogPort>,
) -> BacktestResult {
    let engine = strategy.engine();
    let mut ctx = SimulationContext::new(config.initial_capital, trade_log);

    tracing::info!(
        "Running backtest '{}' over {} bars, initial capital {:.2}",
        strategy.name,
        table.len(),
        config.initial_capital
    );
    for index in 0..table.len() {
        step(&mut ctx, table, index, &engine, strategy, &config.costs);
    }

    let pairing = pair_round_trips(&ctx.trades, config.match_policy);
    for &trade_index in &pairing.unmatched_closes {
        let trade = &ctx.trades[trade_index];
        tracing::debug!("Unmatched {} at {}", trade.action, trade.timestamp);
        ctx.events.push(SimulationEvent::UnmatchedClose {
            trade_index,
            timestamp: trade.timestamp,
            action: trade.action,
        });
    }

    let SimulationContext {
        portfolio,
        trades,
        events,
        signals,
        ..
    } = ctx;
    let metrics = Metrics::compute(
        &portfolio.equity_curve,
        portfolio.initial_capital,
        &trades,
        &pairing.round_trips,
    );
    let final_capital = portfolio.final_equity();
    tracing::info!(
        "Backtest finished: {} trades, final capital {:.2}",
        trades.len(),
        final_capital
    );

    BacktestResult {
        start: table.bars().first().map(|b| b.timestamp),
        end: table.bars().last().map(|b| b.timestamp),
        initial_capital: portfolio.initial_capital,
        final_capital,
        metrics,
        daily_returns: daily_returns(&portfolio.equity_curve),
        equity_curve: portfolio.equity_curve,
        trades,
        round_trips: pairing.round_trips,
        events,
        signals,
    }
}
