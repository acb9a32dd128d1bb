//! Bar data access port.

use crate::domain::error::TraderError;
use crate::domain::indicator_table::IndicatorTable;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Time-ordered bars whose date falls in `[start_date, end_date]`; an
    /// open bound is unbounded.
    fn fetch_ohlcv(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, TraderError>;

    /// A table with precomputed indicator columns, if the source carries
    /// them. Sources without such columns return `Ok(None)`.
    fn fetch_indicator_table(
        &self,
        _fast_period: usize,
        _slow_period: usize,
        _start_date: Option<NaiveDate>,
        _end_date: Option<NaiveDate>,
    ) -> Result<Option<IndicatorTable>, TraderError> {
        Ok(None)
    }
}
