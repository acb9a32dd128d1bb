//! Signal fusion engine.
//!
//! Five independent sub-signals (MA crossover, RSI extremes, MACD crossover,
//! Bollinger touch, volume breakout) each vote BUY/SELL/HOLD with a confidence
//! in [0, 1]. Votes are combined by fixed weights and the winning direction is
//! then checked against a trend-confirmation filter that can only downgrade it.
//!
//! Every function here is a pure function of the bar table and an index.

use std::fmt;

use chrono::NaiveDateTime;

use super::indicator_table::{Bar, IndicatorTable, Indicators};

/// Minimum fused score for a BUY or SELL.
pub const SIGNAL_THRESHOLD: f64 = 0.18;
/// Minimum |fast MA - slow MA| as a fraction of price for the trend filter.
pub const MIN_MA_GAP: f64 = 0.001;

const MA_CONFIDENCE_CAP: f64 = 0.8;
const MACD_CONFIDENCE_CAP: f64 = 0.7;
const MACD_ZERO_SIGNAL_CONFIDENCE: f64 = 0.5;
const BB_CONFIDENCE_CAP: f64 = 0.6;
const VOLUME_CONFIDENCE_CAP: f64 = 0.5;
const VOLUME_RATIO_BREAKOUT: f64 = 1.5;
const VOLUME_PRICE_CHANGE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
            Direction::Hold => Direction::Hold,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Indicator family behind a sub-signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    MovingAverage,
    Rsi,
    Macd,
    Bollinger,
    Volume,
}

impl SignalSource {
    /// Order in which reasons are reported.
    pub const ALL: [SignalSource; 5] = [
        SignalSource::MovingAverage,
        SignalSource::Rsi,
        SignalSource::Macd,
        SignalSource::Bollinger,
        SignalSource::Volume,
    ];

    pub fn weight(self) -> f64 {
        match self {
            SignalSource::MovingAverage => 0.35,
            SignalSource::Macd => 0.25,
            SignalSource::Rsi => 0.20,
            SignalSource::Bollinger => 0.15,
            SignalSource::Volume => 0.05,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SignalSource::MovingAverage => "MA",
            SignalSource::Rsi => "RSI",
            SignalSource::Macd => "MACD",
            SignalSource::Bollinger => "BB",
            SignalSource::Volume => "VOL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubSignal {
    pub source: SignalSource,
    pub direction: Direction,
    pub confidence: f64,
    pub reason: String,
}

impl SubSignal {
    fn hold(source: SignalSource, reason: impl Into<String>) -> Self {
        SubSignal {
            source,
            direction: Direction::Hold,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    fn vote(source: SignalSource, direction: Direction, confidence: f64, reason: String) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        SubSignal {
            source,
            direction,
            confidence,
            reason,
        }
    }
}

/// The fused decision for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSignal {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub price: f64,
    pub confidence: f64,
    pub buy_score: f64,
    pub sell_score: f64,
    pub indicators: Indicators,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    params: SignalParams,
}

impl SignalEngine {
    pub fn new(params: SignalParams) -> Self {
        SignalEngine { params }
    }

    pub fn ma_crossover(&self, bars: &[Bar], index: usize) -> SubSignal {
        let source = SignalSource::MovingAverage;
        let Some((prev, cur)) = adjacent(bars, index) else {
            return SubSignal::hold(source, "insufficient data");
        };
        let (Some(pf), Some(ps), Some(cf), Some(cs)) = (
            prev.indicators.ma_fast,
            prev.indicators.ma_slow,
            cur.indicators.ma_fast,
            cur.indicators.ma_slow,
        ) else {
            return SubSignal::hold(source, "MA data missing");
        };

        let confidence = if cs == 0.0 {
            MA_CONFIDENCE_CAP
        } else {
            MA_CONFIDENCE_CAP.min((cf - cs).abs() / cs.abs() * 100.0)
        };
        if pf <= ps && cf > cs {
            SubSignal::vote(
                source,
                Direction::Buy,
                confidence,
                format!("fast MA crossed above slow MA ({:.2} > {:.2})", cf, cs),
            )
        } else if pf >= ps && cf < cs {
            SubSignal::vote(
                source,
                Direction::Sell,
                confidence,
                format!("fast MA crossed below slow MA ({:.2} < {:.2})", cf, cs),
            )
        } else {
            SubSignal::hold(source, "no crossover")
        }
    }

    pub fn rsi(&self, bars: &[Bar], index: usize) -> SubSignal {
        let source = SignalSource::Rsi;
        let Some(rsi) = bars.get(index).and_then(|b| b.indicators.rsi) else {
            return SubSignal::hold(source, "RSI data missing");
        };
        let SignalParams {
            rsi_oversold: oversold,
            rsi_overbought: overbought,
        } = self.params;

        if rsi < oversold {
            let confidence = if oversold > 0.0 {
                (oversold - rsi) / oversold
            } else {
                1.0
            };
            SubSignal::vote(
                source,
                Direction::Buy,
                confidence,
                format!("RSI oversold ({:.2} < {})", rsi, oversold),
            )
        } else if rsi > overbought {
            let confidence = if overbought < 100.0 {
                (rsi - overbought) / (100.0 - overbought)
            } else {
                1.0
            };
            SubSignal::vote(
                source,
                Direction::Sell,
                confidence,
                format!("RSI overbought ({:.2} > {})", rsi, overbought),
            )
        } else {
            SubSignal::hold(source, format!("RSI neutral ({:.2})", rsi))
        }
    }

    pub fn macd(&self, bars: &[Bar], index: usize) -> SubSignal {
        let source = SignalSource::Macd;
        let Some((prev, cur)) = adjacent(bars, index) else {
            return SubSignal::hold(source, "insufficient data");
        };
        let (Some(pm), Some(psig), Some(cm), Some(csig)) = (
            prev.indicators.macd,
            prev.indicators.macd_signal,
            cur.indicators.macd,
            cur.indicators.macd_signal,
        ) else {
            return SubSignal::hold(source, "MACD data missing");
        };

        let confidence = if csig == 0.0 {
            MACD_ZERO_SIGNAL_CONFIDENCE
        } else {
            MACD_CONFIDENCE_CAP.min((cm - csig).abs() / csig.abs())
        };
        if pm <= psig && cm > csig {
            SubSignal::vote(
                source,
                Direction::Buy,
                confidence,
                format!("MACD crossed above signal ({:.4} > {:.4})", cm, csig),
            )
        } else if pm >= psig && cm < csig {
            SubSignal::vote(
                source,
                Direction::Sell,
                confidence,
                format!("MACD crossed below signal ({:.4} < {:.4})", cm, csig),
            )
        } else {
            SubSignal::hold(source, "no MACD crossover")
        }
    }

    pub fn bollinger(&self, bars: &[Bar], index: usize) -> SubSignal {
        let source = SignalSource::Bollinger;
        let Some(bar) = bars.get(index) else {
            return SubSignal::hold(source, "insufficient data");
        };
        let (Some(upper), Some(lower)) = (bar.indicators.bb_upper, bar.indicators.bb_lower) else {
            return SubSignal::hold(source, "Bollinger data missing");
        };
        let price = bar.close;

        if price <= lower {
            let confidence = if lower != 0.0 {
                BB_CONFIDENCE_CAP.min((lower - price) / lower.abs() * 10.0)
            } else {
                BB_CONFIDENCE_CAP
            };
            SubSignal::vote(
                source,
                Direction::Buy,
                confidence,
                format!("close at or below lower band ({:.2} <= {:.2})", price, lower),
            )
        } else if price >= upper {
            let confidence = if upper != 0.0 {
                BB_CONFIDENCE_CAP.min((price - upper) / upper.abs() * 10.0)
            } else {
                BB_CONFIDENCE_CAP
            };
            SubSignal::vote(
                source,
                Direction::Sell,
                confidence,
                format!("close at or above upper band ({:.2} >= {:.2})", price, upper),
            )
        } else {
            SubSignal::hold(source, format!("close inside bands ({:.2})", price))
        }
    }

    pub fn volume(&self, bars: &[Bar], index: usize) -> SubSignal {
        let source = SignalSource::Volume;
        let Some(bar) = bars.get(index) else {
            return SubSignal::hold(source, "insufficient data");
        };
        let (Some(ratio), Some(change)) = (bar.indicators.volume_ratio, bar.indicators.price_change)
        else {
            return SubSignal::hold(source, "volume data missing");
        };

        let confidence = VOLUME_CONFIDENCE_CAP.min(ratio / 3.0 * change.abs() * 10.0);
        if ratio > VOLUME_RATIO_BREAKOUT && change > VOLUME_PRICE_CHANGE {
            SubSignal::vote(
                source,
                Direction::Buy,
                confidence,
                format!(
                    "volume breakout up (ratio {:.2}, change {:.2}%)",
                    ratio,
                    change * 100.0
                ),
            )
        } else if ratio > VOLUME_RATIO_BREAKOUT && change < -VOLUME_PRICE_CHANGE {
            SubSignal::vote(
                source,
                Direction::Sell,
                confidence,
                format!(
                    "volume breakout down (ratio {:.2}, change {:.2}%)",
                    ratio,
                    change * 100.0
                ),
            )
        } else {
            SubSignal::hold(source, format!("volume normal (ratio {:.2})", ratio))
        }
    }

    /// All five sub-signals for `index`, in [`SignalSource::ALL`] order.
    pub fn sub_signals(&self, bars: &[Bar], index: usize) -> [SubSignal; 5] {
        [
            self.ma_crossover(bars, index),
            self.rsi(bars, index),
            self.macd(bars, index),
            self.bollinger(bars, index),
            self.volume(bars, index),
        ]
    }

    /// Fused, trend-filtered signal for bar `index`; `None` past the end of the table.
    pub fn composite(&self, table: &IndicatorTable, index: usize) -> Option<CompositeSignal> {
        let bars = table.bars();
        let bar = bars.get(index)?;
        let subs = self.sub_signals(bars, index);

        let score = |dir: Direction| -> f64 {
            subs.iter()
                .filter(|s| s.direction == dir)
                .map(|s| s.confidence * s.source.weight())
                .sum()
        };
        let buy_score = score(Direction::Buy);
        let sell_score = score(Direction::Sell);

        let (mut direction, mut confidence) =
            if buy_score > sell_score && buy_score > SIGNAL_THRESHOLD {
                (Direction::Buy, buy_score)
            } else if sell_score > buy_score && sell_score > SIGNAL_THRESHOLD {
                (Direction::Sell, sell_score)
            } else {
                (Direction::Hold, 0.0)
            };

        let mut reasons = Vec::new();
        if direction != Direction::Hold && !trend_confirms(direction, bar) {
            reasons.push(match direction {
                Direction::Buy => "trend filter: long not confirmed".to_string(),
                _ => "trend filter: short not confirmed".to_string(),
            });
            direction = Direction::Hold;
            confidence = 0.0;
        }
        reasons.extend(
            subs.iter()
                .filter(|s| s.direction != Direction::Hold)
                .map(|s| format!("{}: {}", s.source.label(), s.reason)),
        );
        let reason = if reasons.is_empty() {
            "no indicator signal".to_string()
        } else {
            reasons.join("; ")
        };

        Some(CompositeSignal {
            timestamp: bar.timestamp,
            direction,
            price: bar.close,
            confidence,
            buy_score,
            sell_score,
            indicators: bar.indicators,
            reason,
        })
    }
}

/// Trend-confirmation filter. A missing input never confirms.
///
/// BUY: fast > slow, MACD > 0, MA gap >= 0.1% of price, close >= BB middle.
/// SELL mirrors every condition. HOLD always passes.
pub fn trend_confirms(direction: Direction, bar: &Bar) -> bool {
    let ind = &bar.indicators;
    let (Some(fast), Some(slow), Some(macd), Some(mid)) =
        (ind.ma_fast, ind.ma_slow, ind.macd, ind.bb_middle)
    else {
        return direction == Direction::Hold;
    };
    let price = bar.close;
    let gap = if price != 0.0 {
        (fast - slow).abs() / price
    } else {
        0.0
    };
    match direction {
        Direction::Buy => fast > slow && macd > 0.0 && gap >= MIN_MA_GAP && price >= mid,
        Direction::Sell => fast < slow && macd < 0.0 && gap >= MIN_MA_GAP && price <= mid,
        Direction::Hold => true,
    }
}

fn adjacent(bars: &[Bar], index: usize) -> Option<(&Bar, &Bar)> {
    if index < 1 {
        return None;
    }
    Some((bars.get(index - 1)?, bars.get(index)?))
}
