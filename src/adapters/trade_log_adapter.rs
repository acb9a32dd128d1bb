//! Delimited-text trade log written row by row as trades execute.

use crate::domain::error::TraderError;
use crate::domain::ledger::Trade;
use crate::ports::trade_log_port::TradeLogPort;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

pub const HEADER: [&str; 7] = [
    "timestamp",
    "action",
    "price",
    "quantity",
    "cash_after",
    "position_after",
    "reason",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    fn byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Tab => write!(f, "tab"),
            Delimiter::Comma => write!(f, "comma"),
        }
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tab" => Ok(Delimiter::Tab),
            "comma" => Ok(Delimiter::Comma),
            other => Err(format!("expected 'tab' or 'comma', got '{}'", other)),
        }
    }
}

pub struct CsvTradeLog {
    writer: csv::Writer<File>,
}

impl CsvTradeLog {
    /// Truncates `path` and writes the header row.
    pub fn create<P: AsRef<Path>>(path: P, delimiter: Delimiter) -> Result<Self, TraderError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter.byte())
            .from_path(path.as_ref())?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        tracing::debug!("Trade log opened at {}", path.as_ref().display());
        Ok(Self { writer })
    }
}

impl TradeLogPort for CsvTradeLog {
    fn record(&mut self, trade: &Trade) -> Result<(), TraderError> {
        self.writer.write_record([
            trade.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            trade.action.to_string(),
            format!("{:.4}", trade.price),
            trade.quantity.to_string(),
            format!("{:.2}", trade.cash_after),
            trade.position_after.to_string(),
            trade.reason.clone(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}
