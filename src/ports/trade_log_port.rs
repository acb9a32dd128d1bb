//! Side-channel trade log port.

use crate::domain::error::TraderError;
use crate::domain::ledger::Trade;

/// Receives every executed trade as it happens during a run.
pub trait TradeLogPort {
    fn record(&mut self, trade: &Trade) -> Result<(), TraderError>;
}
