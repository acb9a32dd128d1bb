//! Execution ledger: applies orders to the account's cash and position.
//!
//! Each action is atomic: either cash, position and the returned [`Trade`]
//! all change together, or nothing changes and a [`RejectReason`] is returned.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::portfolio::Portfolio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    SellShort,
    BuyToCover,
}

impl Action {
    pub fn is_opening(self) -> bool {
        matches!(self, Action::Buy | Action::SellShort)
    }

    /// Opening action a closing action pairs with; `None` for opening actions.
    pub fn opened_by(self) -> Option<Action> {
        match self {
            Action::Sell => Some(Action::Buy),
            Action::BuyToCover => Some(Action::SellShort),
            Action::Buy | Action::SellShort => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::SellShort => write!(f, "SELL_SHORT"),
            Action::BuyToCover => write!(f, "BUY_TO_COVER"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "SELL_SHORT" => Ok(Action::SellShort),
            "BUY_TO_COVER" => Ok(Action::BuyToCover),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// An executed order. Buys carry `cost`, sells carry `revenue`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub action: Action,
    pub price: f64,
    pub quantity: i64,
    pub cash_after: f64,
    pub position_after: i64,
    pub reason: String,
    pub cost: Option<f64>,
    pub revenue: Option<f64>,
}

impl Trade {
    /// Recorded cost or revenue, falling back to `price * quantity` for the
    /// given quantity.
    pub fn amount_or(&self, quantity: i64) -> f64 {
        self.cost
            .or(self.revenue)
            .unwrap_or(self.price * quantity as f64)
    }
}

/// Proportional commission and slippage, both as fractions of trade value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionCosts {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl ExecutionCosts {
    pub fn free() -> Self {
        ExecutionCosts {
            commission_rate: 0.0,
            slippage_rate: 0.0,
        }
    }

    /// Cash paid per unit of value bought.
    pub fn buy_factor(&self) -> f64 {
        1.0 + self.commission_rate + self.slippage_rate
    }

    /// Cash received per unit of value sold.
    pub fn sell_factor(&self) -> f64 {
        1.0 - self.commission_rate - self.slippage_rate
    }
}

impl Default for ExecutionCosts {
    fn default() -> Self {
        ExecutionCosts {
            commission_rate: 0.002,
            slippage_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub timestamp: NaiveDateTime,
    pub action: Action,
    pub price: f64,
    pub quantity: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    InsufficientCash { required: f64, available: f64 },
    /// Close requested with no position on that side.
    NothingToClose,
    /// Opening on the side opposite to the current position.
    WrongSide,
    InvalidQuantity(i64),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientCash {
                required,
                available,
            } => write!(
                f,
                "insufficient cash: required {:.2}, available {:.2}",
                required, available
            ),
            RejectReason::NothingToClose => write!(f, "no position to close"),
            RejectReason::WrongSide => write!(f, "position is on the opposite side"),
            RejectReason::InvalidQuantity(q) => write!(f, "invalid quantity {}", q),
        }
    }
}

/// Applies `order` to `portfolio`. Close orders are clamped to the held
/// quantity; open orders are never partially filled.
pub fn execute(
    portfolio: &mut Portfolio,
    order: &Order,
    costs: &ExecutionCosts,
) -> Result<Trade, RejectReason> {
    if order.quantity <= 0 {
        return Err(RejectReason::InvalidQuantity(order.quantity));
    }
    match order.action {
        Action::Buy => buy(portfolio, order, costs),
        Action::Sell => sell(portfolio, order, costs),
        Action::SellShort => sell_short(portfolio, order, costs),
        Action::BuyToCover => buy_to_cover(portfolio, order, costs),
    }
}

fn buy(
    portfolio: &mut Portfolio,
    order: &Order,
    costs: &ExecutionCosts,
) -> Result<Trade, RejectReason> {
    if portfolio.position.is_short() {
        return Err(RejectReason::WrongSide);
    }
    let cost = order.quantity as f64 * order.price * costs.buy_factor();
    check_cash(cost, portfolio.cash)?;

    portfolio.cash -= cost;
    portfolio
        .position
        .add_long(order.quantity, order.price, order.timestamp);
    Ok(record(portfolio, order, order.quantity, Some(cost), None))
}

fn sell(
    portfolio: &mut Portfolio,
    order: &Order,
    costs: &ExecutionCosts,
) -> Result<Trade, RejectReason> {
    if !portfolio.position.is_long() {
        return Err(RejectReason::NothingToClose);
    }
    let quantity = portfolio.position.reduce(order.quantity);
    let revenue = quantity as f64 * order.price * costs.sell_factor();

    portfolio.cash += revenue;
    Ok(record(portfolio, order, quantity, None, Some(revenue)))
}

fn sell_short(
    portfolio: &mut Portfolio,
    order: &Order,
    costs: &ExecutionCosts,
) -> Result<Trade, RejectReason> {
    if portfolio.position.is_long() {
        return Err(RejectReason::WrongSide);
    }
    let notional = order.quantity as f64 * order.price;
    check_cash(notional * costs.buy_factor(), portfolio.cash)?;
    let revenue = notional * costs.sell_factor();

    portfolio.cash += revenue;
    portfolio
        .position
        .add_short(order.quantity, order.price, order.timestamp);
    Ok(record(portfolio, order, order.quantity, None, Some(revenue)))
}

fn buy_to_cover(
    portfolio: &mut Portfolio,
    order: &Order,
    costs: &ExecutionCosts,
) -> Result<Trade, RejectReason> {
    if !portfolio.position.is_short() {
        return Err(RejectReason::NothingToClose);
    }
    let quantity = portfolio.position.reduce(order.quantity);
    let cost = quantity as f64 * order.price * costs.buy_factor();

    portfolio.cash -= cost;
    Ok(record(portfolio, order, quantity, Some(cost), None))
}

fn check_cash(required: f64, available: f64) -> Result<(), RejectReason> {
    if required > available {
        return Err(RejectReason::InsufficientCash {
            required,
            available,
        });
    }
    Ok(())
}

fn record(
    portfolio: &Portfolio,
    order: &Order,
    quantity: i64,
    cost: Option<f64>,
    revenue: Option<f64>,
) -> Trade {
    Trade {
        timestamp: order.timestamp,
        action: order.action,
        price: order.price,
        quantity,
        cash_after: portfolio.cash,
        position_after: portfolio.position.quantity,
        reason: order.reason.clone(),
        cost,
        revenue,
    }
}
