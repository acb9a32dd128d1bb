//! Strategy configuration: indicator lookbacks, signal thresholds, sizing and
//! exit parameters.

use super::exit::ExitParams;
use super::indicator_table::IndicatorParams;
use super::signal::{SignalEngine, SignalParams};
use super::sizing::SizingParams;

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub indicators: IndicatorParams,
    pub signal: SignalParams,
    pub sizing: SizingParams,
    pub exits: ExitParams,
    pub allow_shorting: bool,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            name: "Signal Fusion".into(),
            indicators: IndicatorParams::default(),
            signal: SignalParams::default(),
            sizing: SizingParams::default(),
            exits: ExitParams::default(),
            allow_shorting: true,
        }
    }
}

impl Strategy {
    pub fn engine(&self) -> SignalEngine {
        SignalEngine::new(self.signal.clone())
    }
}
