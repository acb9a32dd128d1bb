//! Configuration validation.
//!
//! Validates every `[backtest]` and `[strategy]` field before a run. Values
//! are read as strings so that a malformed number is reported rather than
//! silently replaced by its default.

use crate::domain::error::TraderError;
use crate::domain::metrics::MatchPolicy;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_initial_capital(config)?;
    validate_rate(config, "commission_rate")?;
    validate_rate(config, "slippage_rate")?;
    validate_dates(config)?;
    validate_trade_log_delimiter(config)?;
    validate_match_policy(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_ma_periods(config)?;
    validate_rsi(config)?;
    validate_macd(config)?;
    validate_bollinger(config)?;
    for key in ["volume_ma_period", "atr_period"] {
        let value = parse_int(config, "strategy", key, 1)?;
        if value < 1 {
            return Err(TraderError::invalid("strategy", key, format!("{} must be at least 1", key)));
        }
    }
    validate_sizing(config)?;
    for key in ["stop_loss_pct", "take_profit_pct"] {
        let value = parse_double(config, "strategy", key, 0.0)?;
        if value < 0.0 {
            return Err(TraderError::invalid("strategy", key, format!("{} must be non-negative", key)));
        }
    }
    if let Some(raw) = config.get_string("strategy", "allow_shorting") {
        if parse_bool(&raw).is_none() {
            return Err(TraderError::invalid(
                "strategy",
                "allow_shorting",
                format!("expected true or false, got '{}'", raw),
            ));
        }
    }
    Ok(())
}

/// Parses an optional `YYYY-MM-DD` date from `[backtest] <key>`.
pub fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, TraderError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                TraderError::invalid("backtest", key, format!("invalid {} format, expected YYYY-MM-DD", key))
            }),
    }
}

fn parse_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(TraderError::invalid(section, key, format!("expected a number, got '{}'", s))),
        },
    }
}

fn parse_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s.trim().parse::<i64>().map_err(|_| {
            TraderError::invalid(section, key, format!("expected an integer, got '{}'", s))
        }),
    }
}

/// Accepts `true|yes|1` and `false|no|0`, case-insensitively.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = parse_double(config, "backtest", "initial_capital", 100_000.0)?;
    if value <= 0.0 {
        return Err(TraderError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_rate(config: &dyn ConfigPort, key: &str) -> Result<(), TraderError> {
    let value = parse_double(config, "backtest", key, 0.0)?;
    if value < 0.0 {
        return Err(TraderError::invalid("backtest", key, format!("{} must be non-negative", key)));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(TraderError::invalid(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

fn validate_trade_log_delimiter(config: &dyn ConfigPort) -> Result<(), TraderError> {
    match config.get_string("backtest", "trade_log_delimiter") {
        None => Ok(()),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "tab" | "comma" => Ok(()),
            _ => Err(TraderError::invalid(
                "backtest",
                "trade_log_delimiter",
                format!("expected tab or comma, got '{}'", s),
            )),
        },
    }
}

fn validate_match_policy(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(s) = config.get_string("backtest", "match_policy") {
        s.trim()
            .parse::<MatchPolicy>()
            .map_err(|reason| TraderError::invalid("backtest", "match_policy", reason))?;
    }
    Ok(())
}

fn validate_ma_periods(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let fast = parse_int(config, "strategy", "fast_ma_period", 72)?;
    let slow = parse_int(config, "strategy", "slow_ma_period", 216)?;
    if fast < 1 {
        return Err(TraderError::invalid(
            "strategy",
            "fast_ma_period",
            "fast_ma_period must be at least 1",
        ));
    }
    if fast >= slow {
        return Err(TraderError::invalid(
            "strategy",
            "fast_ma_period",
            "fast_ma_period must be below slow_ma_period",
        ));
    }
    Ok(())
}

fn validate_rsi(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let period = parse_int(config, "strategy", "rsi_period", 14)?;
    if period < 1 {
        return Err(TraderError::invalid("strategy", "rsi_period", "rsi_period must be at least 1"));
    }
    let oversold = parse_double(config, "strategy", "rsi_oversold", 30.0)?;
    let overbought = parse_double(config, "strategy", "rsi_overbought", 70.0)?;
    for (key, value) in [("rsi_oversold", oversold), ("rsi_overbought", overbought)] {
        if !(0.0..=100.0).contains(&value) {
            return Err(TraderError::invalid("strategy", key, format!("{} must be between 0 and 100", key)));
        }
    }
    if oversold >= overbought {
        return Err(TraderError::invalid(
            "strategy",
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }
    Ok(())
}

fn validate_macd(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let fast = parse_int(config, "strategy", "macd_fast", 12)?;
    let slow = parse_int(config, "strategy", "macd_slow", 26)?;
    let signal = parse_int(config, "strategy", "macd_signal", 9)?;
    if fast < 1 {
        return Err(TraderError::invalid("strategy", "macd_fast", "macd_fast must be at least 1"));
    }
    if signal < 1 {
        return Err(TraderError::invalid("strategy", "macd_signal", "macd_signal must be at least 1"));
    }
    if fast >= slow {
        return Err(TraderError::invalid("strategy", "macd_fast", "macd_fast must be below macd_slow"));
    }
    Ok(())
}

fn validate_bollinger(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let period = parse_int(config, "strategy", "bb_period", 20)?;
    if period < 2 {
        return Err(TraderError::invalid("strategy", "bb_period", "bb_period must be at least 2"));
    }
    let stddev = parse_double(config, "strategy", "bb_stddev", 2.0)?;
    if stddev <= 0.0 {
        return Err(TraderError::invalid("strategy", "bb_stddev", "bb_stddev must be positive"));
    }
    Ok(())
}

fn validate_sizing(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let fraction = parse_double(config, "strategy", "base_position_fraction", 0.95)?;
    if fraction <= 0.0 || fraction > 1.0 {
        return Err(TraderError::invalid(
            "strategy",
            "base_position_fraction",
            "base_position_fraction must be in (0, 1]",
        ));
    }
    let risk = parse_double(config, "strategy", "risk_per_trade", 0.01)?;
    if risk <= 0.0 || risk >= 1.0 {
        return Err(TraderError::invalid(
            "strategy",
            "risk_per_trade",
            "risk_per_trade must be in (0, 1)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: TraderError) -> String {
        match err {
            TraderError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 100000.0
commission_rate = 0.002
slippage_rate = 0.001
start_date = 2020-01-01
end_date = 2024-12-31
trade_log_delimiter = comma
match_policy = fifo
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn empty_sections_use_defaults() {
        let config = make_config("[backtest]\n[strategy]\n");
        assert!(validate_backtest_config(&config).is_ok());
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "initial_capital");
    }

    #[test]
    fn malformed_number_is_reported() {
        let config = make_config("[backtest]\ninitial_capital = lots\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "initial_capital");
    }

    #[test]
    fn negative_rates_fail() {
        let config = make_config("[backtest]\ncommission_rate = -0.1\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "commission_rate");
        let config = make_config("[backtest]\nslippage_rate = -0.01\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "slippage_rate");
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn single_date_is_allowed() {
        let config = make_config("[backtest]\nend_date = 2020-01-01\n");
        assert!(validate_backtest_config(&config).is_ok());
        assert_eq!(
            parse_date(&config, "end_date").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(parse_date(&config, "start_date").unwrap(), None);
    }

    #[test]
    fn unknown_delimiter_and_policy_fail() {
        let config = make_config("[backtest]\ntrade_log_delimiter = pipe\n");
        assert_eq!(
            invalid_key(validate_backtest_config(&config).unwrap_err()),
            "trade_log_delimiter"
        );
        let config = make_config("[backtest]\nmatch_policy = random\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "match_policy");
    }

    #[test]
    fn valid_strategy_config_passes() {
        let config = make_config(
            r#"
[strategy]
name = Gold 15m
fast_ma_period = 20
slow_ma_period = 50
rsi_period = 14
rsi_oversold = 25
rsi_overbought = 75
macd_fast = 12
macd_slow = 26
macd_signal = 9
bb_period = 20
bb_stddev = 2.5
base_position_fraction = 1.0
risk_per_trade = 0.02
stop_loss_pct = 0.0
take_profit_pct = 0.0
allow_shorting = false
"#,
        );
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn fast_ma_must_be_below_slow() {
        let config = make_config("[strategy]\nfast_ma_period = 50\nslow_ma_period = 50\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "fast_ma_period");
    }

    #[test]
    fn rsi_thresholds_checked() {
        let config = make_config("[strategy]\nrsi_oversold = 70\nrsi_overbought = 30\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "rsi_oversold");
        let config = make_config("[strategy]\nrsi_overbought = 120\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "rsi_overbought");
    }

    #[test]
    fn macd_fast_must_be_below_slow() {
        let config = make_config("[strategy]\nmacd_fast = 30\nmacd_slow = 26\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "macd_fast");
    }

    #[test]
    fn bollinger_period_needs_two_bars() {
        let config = make_config("[strategy]\nbb_period = 1\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "bb_period");
    }

    #[test]
    fn zero_atr_period_fails() {
        let config = make_config("[strategy]\natr_period = 0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "atr_period");
    }

    #[test]
    fn sizing_ranges() {
        let config = make_config("[strategy]\nbase_position_fraction = 1.5\n");
        assert_eq!(
            invalid_key(validate_strategy_config(&config).unwrap_err()),
            "base_position_fraction"
        );
        let config = make_config("[strategy]\nrisk_per_trade = 1.0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "risk_per_trade");
    }

    #[test]
    fn negative_exit_pct_fails() {
        let config = make_config("[strategy]\nstop_loss_pct = -0.05\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "stop_loss_pct");
    }

    #[test]
    fn allow_shorting_must_be_boolean() {
        let config = make_config("[strategy]\nallow_shorting = sometimes\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "allow_shorting");
    }
}
