//! CSV file data adapter.
//!
//! Reads one headered CSV of bars. Column names are matched case-insensitively.
//! When the file also carries the conventional indicator columns the adapter
//! can hand back a ready-made [`IndicatorTable`].

use crate::domain::error::TraderError;
use crate::domain::indicator_table::{
    ma_column, Bar, IndicatorTable, Indicators, COLUMN_ATR, COLUMN_BB_LOWER, COLUMN_BB_MIDDLE,
    COLUMN_BB_UPPER, COLUMN_MACD, COLUMN_MACD_SIGNAL, COLUMN_PRICE_CHANGE, COLUMN_RSI,
    COLUMN_VOLUME_RATIO,
};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs::File;
use std::path::PathBuf;

const TIMESTAMP_COLUMNS: [&str; 4] = ["timestamp", "datetime", "date", "time"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M",
];

pub struct CsvAdapter {
    path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl CsvAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn require(&self, headers: &StringRecord, names: &[&str]) -> Result<usize, TraderError> {
        find_column(headers, names).ok_or_else(|| TraderError::MissingColumn {
            column: names[0].to_string(),
            source_name: self.source_name(),
        })
    }

    /// Parsed bars with their raw records, filtered, sorted and deduplicated.
    fn read_rows(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<(StringRecord, Vec<(OhlcvBar, StringRecord)>), TraderError> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);
        let headers = rdr.headers()?.clone();
        let cols = Columns {
            timestamp: self.require(&headers, &TIMESTAMP_COLUMNS)?,
            open: self.require(&headers, &["open"])?,
            high: self.require(&headers, &["high"])?,
            low: self.require(&headers, &["low"])?,
            close: self.require(&headers, &["close"])?,
            volume: self.require(&headers, &["volume"])?,
        };

        let mut rows = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            let row = line + 2;
            let timestamp = parse_timestamp(field(&record, cols.timestamp)).ok_or_else(|| {
                TraderError::Data {
                    reason: format!(
                        "row {}: invalid timestamp '{}'",
                        row,
                        field(&record, cols.timestamp)
                    ),
                }
            })?;

            let date = timestamp.date();
            if start_date.is_some_and(|s| date < s) || end_date.is_some_and(|e| date > e) {
                continue;
            }

            let bar = OhlcvBar {
                timestamp,
                open: parse_price(&record, cols.open, "open", row)?,
                high: parse_price(&record, cols.high, "high", row)?,
                low: parse_price(&record, cols.low, "low", row)?,
                close: parse_price(&record, cols.close, "close", row)?,
                volume: parse_price(&record, cols.volume, "volume", row)?,
            };
            rows.push((bar, record));
        }

        if rows.is_empty() {
            return Err(TraderError::NoData {
                source_name: self.source_name(),
            });
        }

        rows.sort_by_key(|(bar, _)| bar.timestamp);
        if let Some(pair) = rows.windows(2).find(|w| w[0].0.timestamp == w[1].0.timestamp) {
            return Err(TraderError::Data {
                reason: format!("duplicate timestamp {}", pair[1].0.timestamp),
            });
        }

        tracing::debug!("Read {} bars from {}", rows.len(), self.source_name());
        Ok((headers, rows))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        let (_, rows) = self.read_rows(start_date, end_date)?;
        Ok(rows.into_iter().map(|(bar, _)| bar).collect())
    }

    fn fetch_indicator_table(
        &self,
        fast_period: usize,
        slow_period: usize,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Option<IndicatorTable>, TraderError> {
        let (headers, rows) = self.read_rows(start_date, end_date)?;

        let fast_name = ma_column(fast_period);
        let slow_name = ma_column(slow_period);
        let names = [
            fast_name.as_str(),
            slow_name.as_str(),
            COLUMN_RSI,
            COLUMN_MACD,
            COLUMN_MACD_SIGNAL,
            COLUMN_BB_UPPER,
            COLUMN_BB_MIDDLE,
            COLUMN_BB_LOWER,
            COLUMN_VOLUME_RATIO,
            COLUMN_PRICE_CHANGE,
            COLUMN_ATR,
        ];
        let mut idx = [0usize; 11];
        for (slot, name) in idx.iter_mut().zip(names) {
            match find_column(&headers, &[name]) {
                Some(i) => *slot = i,
                None => {
                    tracing::debug!(
                        "{} has no {} column, indicators will be computed",
                        self.source_name(),
                        name
                    );
                    return Ok(None);
                }
            }
        }

        let mut bars = Vec::with_capacity(rows.len());
        for (row, (ohlcv, record)) in rows.iter().enumerate() {
            let value = |i: usize| parse_indicator(&record, idx[i], names[i], row + 2);
            let indicators = Indicators {
                ma_fast: value(0)?,
                ma_slow: value(1)?,
                rsi: value(2)?,
                macd: value(3)?,
                macd_signal: value(4)?,
                bb_upper: value(5)?,
                bb_middle: value(6)?,
                bb_lower: value(7)?,
                volume_ratio: value(8)?,
                price_change: value(9)?,
                atr: value(10)?,
            };
            bars.push(Bar::from_ohlcv(ohlcv, indicators));
        }

        tracing::info!(
            "Loaded {} bars with precomputed indicators from {}",
            bars.len(),
            self.source_name()
        );
        IndicatorTable::new(fast_period, slow_period, bars).map(Some)
    }
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    })
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("")
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_price(
    record: &StringRecord,
    index: usize,
    column: &str,
    row: usize,
) -> Result<f64, TraderError> {
    let raw = field(record, index);
    raw.parse::<f64>().map_err(|_| TraderError::Data {
        reason: format!("row {}: invalid {} value '{}'", row, column, raw),
    })
}

/// Empty and NaN cells are missing values.
fn parse_indicator(
    record: &StringRecord,
    index: usize,
    column: &str,
    row: usize,
) -> Result<Option<f64>, TraderError> {
    let raw = field(record, index);
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(TraderError::Data {
            reason: format!("row {}: invalid {} value '{}'", row, column, raw),
        }),
    }
}
