//! Single-run backtest CLI (spec §6): reads a candle series, runs one
//! strategy against it, and writes an event stream plus a result record.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use rustrade::application::backtest::{FeeSchedule, RunConfig, SimulatorConfig};
use rustrade::domain::backtest::candle::Candle;
use rustrade::domain::backtest::event::{Event, JsonLinesSink, Sink};
use rustrade::domain::backtest::pair::{MarketType, PairDescriptor, parse_params};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about = "Run a single candle-driven backtest", long_about = None)]
struct Cli {
    /// File with one JSON-encoded candle per line, sorted by openTime.
    #[arg(long)]
    candles: String,

    #[arg(long)]
    exchange: String,

    #[arg(long)]
    pair: String,

    #[arg(long, default_value = "FUTURES")]
    market_type: String,

    #[arg(long, default_value = "1h")]
    timeframe: String,

    /// Inclusive start of the candle window (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS).
    #[arg(long)]
    start: Option<String>,

    /// Exclusive end of the candle window.
    #[arg(long)]
    end: Option<String>,

    #[arg(long)]
    strategy: String,

    /// `key=value,key2=value2`.
    #[arg(long, default_value = "")]
    params: String,

    #[arg(long)]
    initial_balance: String,

    #[arg(long, default_value = "0.01")]
    tick_size: String,

    #[arg(long, default_value = "0.001")]
    qty_step: String,

    #[arg(long, default_value = "1")]
    leverage: String,

    /// Overrides the market type's default taker fee percent.
    #[arg(long)]
    taker_fee: Option<String>,

    /// Overrides the market type's default maker fee percent.
    #[arg(long)]
    maker_fee: Option<String>,

    /// Path to write the line-delimited event stream.
    #[arg(long)]
    events: String,

    /// Path to write the final result record, as one JSON object.
    #[arg(long)]
    result: String,
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt).timestamp());
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid timestamp '{raw}', expected YYYY-MM-DD[THH:MM:SS]"))?;
    let dt = date
        .and_hms_opt(0, 0, 0)
        .context("midnight is always a valid time")?;
    Ok(Utc.from_utc_datetime(&dt).timestamp())
}

fn load_candles(path: &str, start: Option<i64>, end: Option<i64>) -> Result<Vec<Candle>> {
    let file = File::open(path).with_context(|| format!("failed to open candles file '{path}'"))?;
    let reader = BufReader::new(file);
    let mut candles = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let candle: Candle =
            serde_json::from_str(&line).with_context(|| format!("invalid candle line: {line}"))?;
        if start.is_some_and(|s| candle.open_time < s) {
            continue;
        }
        if end.is_some_and(|e| candle.open_time >= e) {
            continue;
        }
        candles.push(candle);
    }
    Ok(candles)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let market_type: MarketType = cli
        .market_type
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid --market-type")?;
    let timeframe: rustrade::domain::market::timeframe::Timeframe = cli
        .timeframe
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid --timeframe")?;
    let strategy_params = parse_params(&cli.params).context("invalid --params")?;

    let (base_currency, quote_currency) = cli.pair.split_once('/').unwrap_or((cli.pair.as_str(), ""));

    let start = cli.start.as_deref().map(parse_timestamp).transpose()?;
    let end = cli.end.as_deref().map(parse_timestamp).transpose()?;
    let candles = load_candles(&cli.candles, start, end)?;

    let initial_balance: Decimal = cli.initial_balance.parse().context("invalid --initial-balance")?;
    let tick_size: Decimal = cli.tick_size.parse().context("invalid --tick-size")?;
    let qty_step: Decimal = cli.qty_step.parse().context("invalid --qty-step")?;
    let leverage: Decimal = cli.leverage.parse().context("invalid --leverage")?;

    let mut fees = FeeSchedule::default_for(market_type);
    if let Some(taker) = cli.taker_fee {
        fees.taker_percent = taker.parse().context("invalid --taker-fee")?;
    }
    if let Some(maker) = cli.maker_fee {
        fees.maker_percent = maker.parse().context("invalid --maker-fee")?;
    }

    let run_config = RunConfig {
        pair: PairDescriptor::new(
            cli.exchange.clone(),
            cli.pair.clone(),
            market_type,
            timeframe,
            base_currency,
            quote_currency,
            cli.strategy.clone(),
            strategy_params,
        ),
        initial_balance,
        tick_size,
        qty_step,
        leverage,
        fees,
        simulator: SimulatorConfig::default(),
    };

    let events_file =
        File::create(&cli.events).with_context(|| format!("failed to create '{}'", cli.events))?;
    let mut sink = JsonLinesSink::new(events_file);

    let (mut simulator, warnings) = match run_config.build() {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "run construction failed");
            sink.append(&Event::Error { message: e.to_string() })?;
            sink.flush()?;
            anyhow::bail!(e);
        }
    };

    let mut record = match simulator.run(&candles, &mut sink) {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "backtest run failed");
            sink.append(&Event::Error { message: e.to_string() })?;
            sink.flush()?;
            anyhow::bail!(e);
        }
    };

    record.created_at = Utc::now().timestamp();
    record.warnings = warnings.iter().map(|w| w.to_string()).collect();

    let mut result_file =
        File::create(&cli.result).with_context(|| format!("failed to create '{}'", cli.result))?;
    let json = serde_json::to_string_pretty(&record)?;
    result_file.write_all(json.as_bytes())?;
    result_file.write_all(b"\n")?;

    info!(
        trades_finished = record.trades.finished,
        final_balance = %record.final_balance,
        liquidated = record.liquidated,
        "backtest complete"
    );
    Ok(())
}

fn main() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
