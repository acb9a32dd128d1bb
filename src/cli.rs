//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::trade_log_adapter::{CsvTradeLog, Delimiter};
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::TraderError;
use crate::domain::exit::ExitParams;
use crate::domain::indicator_table::{IndicatorParams, IndicatorTable, COLUMN_MACD, COLUMN_RSI};
use crate::domain::ledger::ExecutionCosts;
use crate::domain::metrics::MatchPolicy;
use crate::domain::signal::{CompositeSignal, SignalParams};
use crate::domain::sizing::SizingParams;
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::trade_log_port::TradeLogPort;

#[derive(Parser, Debug)]
#[command(name = "fusetrader", about = "Single-asset signal fusion backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar CSV; overrides [data] path
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Trade log file; overrides [backtest] trade_log
        #[arg(short, long)]
        trade_log: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print every bar's composite signal as CSV
    Signals {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            trade_log,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, data.as_deref(), trade_log.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Signals { config, data } => run_signals(&config, data.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    Ok(adapter)
}

/// Expects a config that already passed `validate_backtest_config`.
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, TraderError> {
    let defaults = BacktestConfig::default();
    let match_policy = match adapter.get_string("backtest", "match_policy") {
        Some(s) => s
            .parse::<MatchPolicy>()
            .map_err(|reason| TraderError::invalid("backtest", "match_policy", reason))?,
        None => defaults.match_policy,
    };
    Ok(BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        costs: ExecutionCosts {
            commission_rate: adapter.get_double(
                "backtest",
                "commission_rate",
                defaults.costs.commission_rate,
            ),
            slippage_rate: adapter.get_double(
                "backtest",
                "slippage_rate",
                defaults.costs.slippage_rate,
            ),
        },
        start_date: parse_date(adapter, "start_date")?,
        end_date: parse_date(adapter, "end_date")?,
        match_policy,
    })
}

/// Expects a config that already passed `validate_strategy_config`.
pub fn build_strategy(adapter: &dyn ConfigPort) -> Strategy {
    let d = Strategy::default();
    let period = |key: &str, default: usize| -> usize {
        adapter.get_int("strategy", key, default as i64).max(1) as usize
    };
    let bb_stddev = adapter.get_double(
        "strategy",
        "bb_stddev",
        f64::from(d.indicators.bb_stddev_mult_x100) / 100.0,
    );

    Strategy {
        name: adapter.get_string("strategy", "name").unwrap_or(d.name),
        indicators: IndicatorParams {
            fast_ma_period: period("fast_ma_period", d.indicators.fast_ma_period),
            slow_ma_period: period("slow_ma_period", d.indicators.slow_ma_period),
            rsi_period: period("rsi_period", d.indicators.rsi_period),
            macd_fast: period("macd_fast", d.indicators.macd_fast),
            macd_slow: period("macd_slow", d.indicators.macd_slow),
            macd_signal: period("macd_signal", d.indicators.macd_signal),
            bb_period: period("bb_period", d.indicators.bb_period),
            bb_stddev_mult_x100: (bb_stddev * 100.0).round() as u32,
            volume_ma_period: period("volume_ma_period", d.indicators.volume_ma_period),
            atr_period: period("atr_period", d.indicators.atr_period),
        },
        signal: SignalParams {
            rsi_oversold: adapter.get_double("strategy", "rsi_oversold", d.signal.rsi_oversold),
            rsi_overbought: adapter.get_double(
                "strategy",
                "rsi_overbought",
                d.signal.rsi_overbought,
            ),
        },
        sizing: SizingParams {
            base_position_fraction: adapter.get_double(
                "strategy",
                "base_position_fraction",
                d.sizing.base_position_fraction,
            ),
            risk_per_trade: adapter.get_double(
                "strategy",
                "risk_per_trade",
                d.sizing.risk_per_trade,
            ),
        },
        exits: ExitParams {
            stop_loss_pct: adapter.get_double("strategy", "stop_loss_pct", d.exits.stop_loss_pct),
            take_profit_pct: adapter.get_double(
                "strategy",
                "take_profit_pct",
                d.exits.take_profit_pct,
            ),
        },
        allow_shorting: adapter.get_bool("strategy", "allow_shorting", d.allow_shorting),
    }
}

/// `--data` wins over `[data] path`.
pub fn resolve_data_path(
    override_path: Option<&Path>,
    adapter: &dyn ConfigPort,
) -> Result<PathBuf, TraderError> {
    if let Some(p) = override_path {
        return Ok(p.to_path_buf());
    }
    adapter
        .get_string("data", "path")
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })
}

/// Uses precomputed indicator columns when the source has them, otherwise
/// computes them. Rows with any missing value are dropped either way.
pub fn load_indicator_table(
    data_port: &dyn DataPort,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
) -> Result<IndicatorTable, TraderError> {
    let params = &strategy.indicators;
    let table = match data_port.fetch_indicator_table(
        params.fast_ma_period,
        params.slow_ma_period,
        bt_config.start_date,
        bt_config.end_date,
    )? {
        Some(table) => table,
        None => {
            let ohlcv = data_port.fetch_ohlcv(bt_config.start_date, bt_config.end_date)?;
            tracing::info!("Computing indicators over {} bars", ohlcv.len());
            IndicatorTable::compute(&ohlcv, params)?
        }
    };

    let raw_len = table.len();
    let table = table.complete();
    tracing::info!(
        "{} of {} bars have every indicator value",
        table.len(),
        raw_len
    );
    if table.is_empty() {
        return Err(TraderError::Data {
            reason: format!(
                "no bars left after indicator warmup ({} bars loaded)",
                raw_len
            ),
        });
    }
    Ok(table)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
    trade_log: Option<&mut dyn TradeLogPort>,
) -> Result<BacktestResult, TraderError> {
    let table = load_indicator_table(data_port, strategy, bt_config)?;
    Ok(backtest_engine::run_backtest(
        &table, strategy, bt_config, trade_log,
    ))
}

fn run_backtest(
    config_path: &Path,
    data_override: Option<&Path>,
    trade_log_override: Option<&Path>,
) -> Result<(), TraderError> {
    let adapter = load_config(config_path)?;
    let strategy = build_strategy(&adapter);
    let bt_config = build_backtest_config(&adapter)?;
    eprintln!("Loading strategy: {}", strategy.name);

    let data_path = resolve_data_path(data_override, &adapter)?;
    eprintln!("Loading bars from {}", data_path.display());
    let data_port = CsvAdapter::new(data_path);

    let log_path = trade_log_override
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("backtest", "trade_log").map(PathBuf::from));
    let mut trade_log = match log_path {
        Some(path) => {
            let delimiter = match adapter.get_string("backtest", "trade_log_delimiter") {
                Some(s) => s.parse::<Delimiter>().map_err(|reason| {
                    TraderError::invalid("backtest", "trade_log_delimiter", reason)
                })?,
                None => Delimiter::default(),
            };
            eprintln!("Writing trade log to {}", path.display());
            Some(CsvTradeLog::create(&path, delimiter)?)
        }
        None => None,
    };

    let result = run_backtest_pipeline(
        &data_port,
        &strategy,
        &bt_config,
        trade_log.as_mut().map(|l| l as &mut dyn TradeLogPort),
    )?;

    print_summary(&result);
    Ok(())
}

pub fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    let period = match (result.start, result.end) {
        (Some(start), Some(end)) => format!("{} to {}", start, end),
        _ => "no bars".to_string(),
    };

    eprintln!("\n=== Backtest Results ===");
    eprintln!("Period:           {}", period);
    eprintln!("Initial Capital:  {:.2}", result.initial_capital);
    eprintln!("Final Capital:    {:.2}", result.final_capital);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annual_return * 100.0);
    eprintln!("Volatility:       {:.2}%", m.annual_volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Max Drawdown:     {:.2}%", m.max_drawdown * 100.0);
    eprintln!("Calmar Ratio:     {:.2}", m.calmar_ratio);

    eprintln!("\n=== Trades ===");
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!(
        "Win / Loss:       {} / {}",
        m.winning_trades, m.losing_trades
    );
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    eprintln!("Avg Trade Return: {:.2}%", m.avg_trade_return * 100.0);
    eprintln!("Avg Win:          {:.2}", m.avg_win);
    eprintln!("Avg Loss:         {:.2}", m.avg_loss);
    eprintln!("Largest Win:      {:.2}%", m.largest_win * 100.0);
    eprintln!("Largest Loss:     {:.2}%", m.largest_loss * 100.0);
    eprintln!("Avg Holding:      {:.2} days", m.avg_holding_days);
    eprintln!("Max Holding:      {:.2} days", m.max_holding_days);

    if !result.events.is_empty() {
        eprintln!("\n{} simulation events (run with RUST_LOG=fusetrader=debug for details)", result.events.len());
    }
}

pub fn run_dry_run(config_path: &Path) -> Result<(), TraderError> {
    let adapter = load_config(config_path)?;
    eprintln!("Config validated successfully");

    let strategy = build_strategy(&adapter);
    let bt_config = build_backtest_config(&adapter)?;
    let ind = &strategy.indicators;
    let fmt_date = |d: Option<chrono::NaiveDate>| d.map_or("open".to_string(), |d| d.to_string());

    eprintln!("\nBacktest:");
    eprintln!("  initial_capital: {:.2}", bt_config.initial_capital);
    eprintln!("  commission_rate: {}", bt_config.costs.commission_rate);
    eprintln!("  slippage_rate:   {}", bt_config.costs.slippage_rate);
    eprintln!(
        "  dates:           {} to {}",
        fmt_date(bt_config.start_date),
        fmt_date(bt_config.end_date)
    );
    eprintln!("  match_policy:    {}", bt_config.match_policy);

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!(
        "  MA {}/{}, RSI {} ({}/{}), MACD {}/{}/{}, BB {} x{:.2}",
        ind.fast_ma_period,
        ind.slow_ma_period,
        ind.rsi_period,
        strategy.signal.rsi_oversold,
        strategy.signal.rsi_overbought,
        ind.macd_fast,
        ind.macd_slow,
        ind.macd_signal,
        ind.bb_period,
        f64::from(ind.bb_stddev_mult_x100) / 100.0
    );
    eprintln!(
        "  volume MA {}, ATR {}",
        ind.volume_ma_period, ind.atr_period
    );
    eprintln!(
        "  sizing: fraction {}, risk per trade {}",
        strategy.sizing.base_position_fraction, strategy.sizing.risk_per_trade
    );
    eprintln!(
        "  exits: stop {}, target {}, shorting {}",
        strategy.exits.stop_loss_pct,
        strategy.exits.take_profit_pct,
        if strategy.allow_shorting { "on" } else { "off" }
    );

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), TraderError> {
    load_config(config_path)?;
    eprintln!("Configuration is valid.");
    Ok(())
}

fn run_signals(config_path: &Path, data_override: Option<&Path>) -> Result<(), TraderError> {
    let adapter = load_config(config_path)?;
    let strategy = build_strategy(&adapter);
    let bt_config = build_backtest_config(&adapter)?;
    let data_port = CsvAdapter::new(resolve_data_path(data_override, &adapter)?);

    let table = load_indicator_table(&data_port, &strategy, &bt_config)?;
    let engine = strategy.engine();
    let signals: Vec<CompositeSignal> = (0..table.len())
        .filter_map(|i| engine.composite(&table, i))
        .collect();

    let stdout = std::io::stdout();
    write_signals(stdout.lock(), &table, &signals)
}

/// Signals as CSV. The moving-average snapshot columns carry the table's
/// `MA_<period>` names.
pub fn write_signals<W: Write>(
    out: W,
    table: &IndicatorTable,
    signals: &[CompositeSignal],
) -> Result<(), TraderError> {
    let mut writer = csv::Writer::from_writer(out);
    let fast_column = table.fast_ma_column();
    let slow_column = table.slow_ma_column();
    writer.write_record([
        "timestamp",
        "direction",
        "price",
        "confidence",
        "buy_score",
        "sell_score",
        fast_column.as_str(),
        slow_column.as_str(),
        COLUMN_RSI,
        COLUMN_MACD,
        "reason",
    ])?;
    let cell = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_default();
    for s in signals {
        writer.write_record([
            s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            s.direction.to_string(),
            format!("{:.4}", s.price),
            format!("{:.4}", s.confidence),
            format!("{:.4}", s.buy_score),
            format!("{:.4}", s.sell_score),
            cell(s.indicators.ma_fast),
            cell(s.indicators.ma_slow),
            cell(s.indicators.rsi),
            cell(s.indicators.macd),
            s.reason.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
