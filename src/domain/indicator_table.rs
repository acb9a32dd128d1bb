//! Indicator table: time-ordered bars augmented with the indicator values the
//! signal engine consumes.
//!
//! Built once before a run (either computed from raw OHLCV or loaded with
//! precomputed columns) and read-only during simulation.

use chrono::NaiveDateTime;

use crate::domain::error::TraderError;
use crate::domain::indicator::{
    bollinger, calculate_atr, calculate_bollinger, calculate_macd, calculate_price_change,
    calculate_rsi, calculate_sma, calculate_volume_ratio, macd,
};
use crate::domain::ohlcv::OhlcvBar;

pub const COLUMN_RSI: &str = "RSI";
pub const COLUMN_MACD: &str = "MACD";
pub const COLUMN_MACD_SIGNAL: &str = "MACD_Signal";
pub const COLUMN_BB_UPPER: &str = "BB_Upper";
pub const COLUMN_BB_MIDDLE: &str = "BB_Middle";
pub const COLUMN_BB_LOWER: &str = "BB_Lower";
pub const COLUMN_VOLUME_RATIO: &str = "Volume_Ratio";
pub const COLUMN_PRICE_CHANGE: &str = "Price_Change";
pub const COLUMN_ATR: &str = "ATR";

/// Column name of a moving average by convention, e.g. `MA_72`.
pub fn ma_column(period: usize) -> String {
    format!("MA_{}", period)
}

/// Per-bar indicator values; `None` marks a value that is missing or still
/// inside its warmup window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Indicators {
    pub ma_fast: Option<f64>,
    pub ma_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub price_change: Option<f64>,
    pub atr: Option<f64>,
}

impl Indicators {
    pub fn is_complete(&self) -> bool {
        [
            self.ma_fast,
            self.ma_slow,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.bb_upper,
            self.bb_middle,
            self.bb_lower,
            self.volume_ratio,
            self.price_change,
            self.atr,
        ]
        .iter()
        .all(|v| v.is_some_and(f64::is_finite))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub indicators: Indicators,
}

impl Bar {
    pub fn from_ohlcv(bar: &OhlcvBar, indicators: Indicators) -> Self {
        Bar {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            indicators,
        }
    }
}

/// Lookback periods used to compute an [`IndicatorTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_stddev_mult_x100: u32,
    pub volume_ma_period: usize,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            fast_ma_period: 72,
            slow_ma_period: 216,
            rsi_period: 14,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            bb_period: bollinger::DEFAULT_PERIOD,
            bb_stddev_mult_x100: bollinger::DEFAULT_STDDEV_MULT_X100,
            volume_ma_period: 20,
            atr_period: crate::domain::indicator::atr::DEFAULT_PERIOD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorTable {
    fast_period: usize,
    slow_period: usize,
    bars: Vec<Bar>,
}

impl IndicatorTable {
    /// Wraps bars into a table, rejecting duplicate or out-of-order timestamps.
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        bars: Vec<Bar>,
    ) -> Result<Self, TraderError> {
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(TraderError::UnorderedBars {
                    index: i + 1,
                    timestamp: pair[1].timestamp.to_string(),
                });
            }
        }
        Ok(IndicatorTable {
            fast_period,
            slow_period,
            bars,
        })
    }

    /// Computes every indicator column from raw OHLCV bars.
    pub fn compute(ohlcv: &[OhlcvBar], params: &IndicatorParams) -> Result<Self, TraderError> {
        let ma_fast = calculate_sma(ohlcv, params.fast_ma_period);
        let ma_slow = calculate_sma(ohlcv, params.slow_ma_period);
        let rsi = calculate_rsi(ohlcv, params.rsi_period);
        let macd = calculate_macd(
            ohlcv,
            params.macd_fast,
            params.macd_slow,
            params.macd_signal,
        );
        let bands = calculate_bollinger(ohlcv, params.bb_period, params.bb_stddev_mult_x100);
        let volume_ratio = calculate_volume_ratio(ohlcv, params.volume_ma_period);
        let price_change = calculate_price_change(ohlcv);
        let atr = calculate_atr(ohlcv, params.atr_period);

        let bars = ohlcv
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let (macd_line, macd_signal) = macd.macd_at(i).unzip();
                let (bb_upper, bb_middle, bb_lower) = match bands.bollinger_at(i) {
                    Some((u, m, l)) => (Some(u), Some(m), Some(l)),
                    None => (None, None, None),
                };
                let indicators = Indicators {
                    ma_fast: ma_fast.simple_at(i),
                    ma_slow: ma_slow.simple_at(i),
                    rsi: rsi.simple_at(i),
                    macd: macd_line,
                    macd_signal,
                    bb_upper,
                    bb_middle,
                    bb_lower,
                    volume_ratio: volume_ratio.simple_at(i),
                    price_change: price_change.simple_at(i),
                    atr: atr.simple_at(i),
                };
                Bar::from_ohlcv(bar, indicators)
            })
            .collect();

        IndicatorTable::new(params.fast_ma_period, params.slow_ma_period, bars)
    }

    /// Drops every row with an unresolved indicator value.
    pub fn complete(mut self) -> Self {
        self.bars.retain(|b| b.indicators.is_complete());
        self
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn fast_ma_column(&self) -> String {
        ma_column(self.fast_period)
    }

    pub fn slow_ma_column(&self) -> String {
        ma_column(self.slow_period)
    }
}
