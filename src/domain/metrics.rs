//! Performance reducer: pairs closing trades with opening trades and reduces
//! the trade list and equity curve into summary statistics.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::ledger::{Action, Trade};
use super::portfolio::EquitySample;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Which unmatched opening trade a close pairs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Most recent unmatched opening trade.
    #[default]
    Lifo,
    /// Oldest unmatched opening trade.
    Fifo,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::Lifo => write!(f, "lifo"),
            MatchPolicy::Fifo => write!(f, "fifo"),
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lifo" => Ok(MatchPolicy::Lifo),
            "fifo" => Ok(MatchPolicy::Fifo),
            other => Err(format!("expected 'lifo' or 'fifo', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripSide {
    Long,
    Short,
}

/// A closing trade paired with the opening trade it realizes.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub side: RoundTripSide,
    /// Indices into the trade list.
    pub open_index: usize,
    pub close_index: usize,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Recorded cost of a long entry or proceeds of a short entry.
    pub open_amount: f64,
    /// Recorded proceeds of a long exit or cost of a short cover.
    pub close_amount: f64,
    pub pnl: f64,
    pub pnl_ratio: f64,
}

impl RoundTrip {
    pub fn holding_days(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / SECONDS_PER_DAY
    }

    pub fn is_win(&self) -> bool {
        self.pnl_ratio > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pairing {
    pub round_trips: Vec<RoundTrip>,
    /// Indices of closing trades with no unmatched opening trade.
    pub unmatched_closes: Vec<usize>,
}

/// Walks `trades` once, pairing each SELL / BUY_TO_COVER with an unmatched
/// BUY / SELL_SHORT that precedes it. An opening trade is consumed by the
/// first close it pairs with.
pub fn pair_round_trips(trades: &[Trade], policy: MatchPolicy) -> Pairing {
    let mut matched = vec![false; trades.len()];
    let mut pairing = Pairing::default();

    for (close_index, close) in trades.iter().enumerate() {
        let Some(opening) = close.action.opened_by() else {
            continue;
        };
        let mut candidates = (0..close_index)
            .filter(|&i| !matched[i] && trades[i].action == opening);
        let found = match policy {
            MatchPolicy::Lifo => candidates.next_back(),
            MatchPolicy::Fifo => candidates.next(),
        };
        let Some(open_index) = found else {
            pairing.unmatched_closes.push(close_index);
            continue;
        };
        matched[open_index] = true;

        let open = &trades[open_index];
        let quantity = close.quantity.min(open.quantity);
        if quantity <= 0 {
            continue;
        }
        let open_amount = open.amount_or(quantity);
        let close_amount = close.amount_or(quantity);
        let (side, pnl) = match opening {
            Action::Buy => (RoundTripSide::Long, close_amount - open_amount),
            _ => (RoundTripSide::Short, open_amount - close_amount),
        };
        let pnl_ratio = if open_amount != 0.0 {
            pnl / open_amount
        } else {
            0.0
        };

        pairing.round_trips.push(RoundTrip {
            side,
            open_index,
            close_index,
            entry_time: open.timestamp,
            exit_time: close.timestamp,
            quantity,
            entry_price: open.price,
            exit_price: close.price,
            open_amount,
            close_amount,
            pnl,
            pnl_ratio,
        });
    }
    pairing
}

/// Fractional change between consecutive equity samples; 0 when the
/// previous equity is 0.
pub fn daily_returns(equity_curve: &[EquitySample]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].total_equity;
            if prev != 0.0 {
                w[1].total_equity / prev - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
    /// Most negative (equity - peak) / peak; 0 or below.
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    /// Opening trades (BUY and SELL_SHORT).
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// `f64::INFINITY` when there are no losing round trips.
    pub profit_factor: f64,
    pub avg_trade_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_days: f64,
    pub max_holding_days: f64,
}

impl Metrics {
    pub fn compute(
        equity_curve: &[EquitySample],
        initial_capital: f64,
        trades: &[Trade],
        round_trips: &[RoundTrip],
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|s| s.total_equity)
            .unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_days(),
            _ => 0,
        };
        let annual_return = if days > 0 && total_return > -1.0 {
            (1.0 + total_return).powf(365.0 / days as f64) - 1.0
        } else {
            0.0
        };

        let returns = daily_returns(equity_curve);
        let (mean, stddev) = mean_and_sample_std(&returns);
        let sharpe_ratio = if returns.len() >= 2 && stddev > 0.0 {
            mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        };
        let annual_volatility = stddev * TRADING_DAYS_PER_YEAR.sqrt();

        let max_drawdown = compute_max_drawdown(equity_curve);
        let calmar_ratio = if max_drawdown < 0.0 {
            annual_return / max_drawdown.abs()
        } else {
            0.0
        };

        let total_trades = trades.iter().filter(|t| t.action.is_opening()).count();

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut winning_amount = 0.0_f64;
        let mut losing_amount = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        for rt in round_trips {
            if rt.is_win() {
                winning_trades += 1;
                winning_amount += rt.pnl;
                largest_win = largest_win.max(rt.pnl_ratio);
            } else {
                losing_trades += 1;
                losing_amount += rt.pnl;
                largest_loss = largest_loss.min(rt.pnl_ratio);
            }
        }

        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };
        let profit_factor = if losing_amount < 0.0 {
            (winning_amount / losing_amount).abs()
        } else {
            f64::INFINITY
        };
        let avg_win = if winning_trades > 0 {
            winning_amount / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            losing_amount / losing_trades as f64
        } else {
            0.0
        };
        let avg_trade_return = if round_trips.is_empty() {
            0.0
        } else {
            round_trips.iter().map(|rt| rt.pnl_ratio).sum::<f64>() / round_trips.len() as f64
        };

        let holding: Vec<f64> = round_trips.iter().map(RoundTrip::holding_days).collect();
        let avg_holding_days = if holding.is_empty() {
            0.0
        } else {
            holding.iter().sum::<f64>() / holding.len() as f64
        };
        let max_holding_days = holding.iter().copied().fold(0.0_f64, f64::max);

        Metrics {
            total_return,
            annual_return,
            annual_volatility,
            sharpe_ratio,
            max_drawdown,
            calmar_ratio,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            profit_factor,
            avg_trade_return,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_holding_days,
            max_holding_days,
        }
    }
}

fn compute_max_drawdown(equity_curve: &[EquitySample]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for sample in equity_curve {
        peak = peak.max(sample.total_equity);
        if peak > 0.0 {
            max_dd = max_dd.min((sample.total_equity - peak) / peak);
        }
    }
    max_dd
}

/// Mean and sample (n - 1) standard deviation; std is 0 below two values.
fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
