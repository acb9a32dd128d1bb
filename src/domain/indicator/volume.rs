//! Volume ratio and price change.
//!
//! VOLUME_RATIO(n)[i] = V[i] / SMA(V, n)[i]; invalid during warmup or when the
//! average volume is zero.
//! PRICE_CHANGE[i] = C[i] / C[i-1] - 1; invalid on the first bar or when the
//! previous close is zero.

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_ratio(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let values: Vec<Option<f64>> = rolling_mean(&volumes, period)
        .into_iter()
        .zip(&volumes)
        .map(|(avg, v)| avg.filter(|a| *a > 0.0).map(|a| v / a))
        .collect();

    simple_series(
        IndicatorType::VolumeRatio(period),
        bars.iter().map(|b| b.timestamp),
        &values,
    )
}

pub fn calculate_price_change(bars: &[OhlcvBar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let change = match i.checked_sub(1).map(|p| bars[p].close) {
            Some(prev) if prev != 0.0 => Some(bar.close / prev - 1.0),
            _ => None,
        };
        values.push(change);
    }

    simple_series(
        IndicatorType::PriceChange,
        bars.iter().map(|b| b.timestamp),
        &values,
    )
}
