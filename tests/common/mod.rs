#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fusetrader::domain::backtest::BacktestConfig;
use fusetrader::domain::error::TraderError;
use fusetrader::domain::indicator_table::{Bar, IndicatorTable, Indicators};
use fusetrader::domain::ledger::{Action, ExecutionCosts, Trade};
pub use fusetrader::domain::ohlcv::OhlcvBar;
use fusetrader::ports::data_port::DataPort;
use fusetrader::ports::trade_log_port::TradeLogPort;

/// In-memory data source. Serves `table` as a precomputed indicator table
/// when set, otherwise only raw bars.
pub struct MockDataPort {
    pub bars: Vec<OhlcvBar>,
    pub table: Option<IndicatorTable>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn with_bars(bars: Vec<OhlcvBar>) -> Self {
        Self {
            bars,
            table: None,
            error: None,
        }
    }

    pub fn with_table(table: IndicatorTable) -> Self {
        Self {
            bars: Vec::new(),
            table: Some(table),
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            table: None,
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        _start_date: Option<NaiveDate>,
        _end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        if let Some(reason) = &self.error {
            return Err(TraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.bars.clone())
    }

    fn fetch_indicator_table(
        &self,
        _fast_period: usize,
        _slow_period: usize,
        _start_date: Option<NaiveDate>,
        _end_date: Option<NaiveDate>,
    ) -> Result<Option<IndicatorTable>, TraderError> {
        Ok(self.table.clone())
    }
}

#[derive(Default)]
pub struct VecTradeLog {
    pub rows: Vec<Trade>,
}

impl TradeLogPort for VecTradeLog {
    fn record(&mut self, trade: &Trade) -> Result<(), TraderError> {
        self.rows.push(trade.clone());
        Ok(())
    }
}

/// 15-minute bars from 2024-01-02 00:00.
pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::minutes(15 * i as i64)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_ohlcv(i: usize, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp: ts(i),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

/// Oscillating closes with a slow drift; enough swings to cross averages.
pub fn wave_ohlcv(n: usize) -> Vec<OhlcvBar> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            make_ohlcv(i, 100.0 + 8.0 * (x / 9.0).sin() + 3.0 * (x / 4.0).cos() + 0.02 * x)
        })
        .collect()
}

/// Every sub-signal neutral: MAs level, RSI mid, MACD flat and positive,
/// wide bands, normal volume.
pub fn neutral() -> Indicators {
    Indicators {
        ma_fast: Some(100.0),
        ma_slow: Some(100.0),
        rsi: Some(50.0),
        macd: Some(0.5),
        macd_signal: Some(0.5),
        bb_upper: Some(150.0),
        bb_middle: Some(100.0),
        bb_lower: Some(50.0),
        volume_ratio: Some(1.0),
        price_change: Some(0.0),
        atr: None,
    }
}

/// Fast MA above slow, MACD positive: a BUY on the bar where this follows
/// [`bearish`].
pub fn bullish() -> Indicators {
    Indicators {
        ma_fast: Some(101.0),
        ..neutral()
    }
}

/// Fast MA below slow, MACD negative.
pub fn bearish() -> Indicators {
    Indicators {
        ma_fast: Some(99.0),
        macd: Some(-0.5),
        macd_signal: Some(-0.5),
        ..neutral()
    }
}

pub fn bar(i: usize, close: f64, indicators: Indicators) -> Bar {
    Bar {
        timestamp: ts(i),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000.0,
        indicators,
    }
}

pub fn table(bars: Vec<Bar>) -> IndicatorTable {
    IndicatorTable::new(3, 8, bars).unwrap()
}

pub fn free_config(initial_capital: f64) -> BacktestConfig {
    BacktestConfig {
        initial_capital,
        costs: ExecutionCosts::free(),
        ..BacktestConfig::default()
    }
}

pub fn signed_quantity(trades: &[Trade]) -> i64 {
    trades
        .iter()
        .map(|t| match t.action {
            Action::Buy | Action::BuyToCover => t.quantity,
            Action::Sell | Action::SellShort => -t.quantity,
        })
        .sum()
}

pub fn actions(trades: &[Trade]) -> Vec<Action> {
    trades.iter().map(|t| t.action).collect()
}
