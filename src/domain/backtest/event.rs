use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::errors::SinkError;
use crate::domain::backtest::position::{CloseReason, Direction};
use crate::domain::backtest::result::ResultRecord;

/// A single item in the simulator's event stream (spec §7). Tagged so the
/// line-delimited-JSON sink can be consumed by a generic reader without
/// knowing the strategy ahead of time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Init {
        pair: String,
        strategy: String,
        initial_balance: Decimal,
    },
    Candle {
        time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        /// Snapshot of the running strategy's `use_indicators()` values at
        /// this candle (spec §6: candle record carries `ind`). Empty during
        /// indicator warmup.
        #[serde(rename = "ind")]
        indicators: Vec<(String, f64)>,
    },
    PositionOpen {
        time: i64,
        position_id: String,
        direction: Direction,
        price: Decimal,
        volume: Decimal,
    },
    DcaFill {
        time: i64,
        position_id: String,
        price: Decimal,
        added_volume: Decimal,
    },
    BreakevenLock {
        time: i64,
        position_id: String,
        stop_loss_price: Decimal,
    },
    PartialClose {
        time: i64,
        position_id: String,
        price: Decimal,
        closed_volume: Decimal,
        realized_pnl: Decimal,
    },
    PositionClose {
        time: i64,
        position_id: String,
        price: Decimal,
        reason: CloseReason,
        realized_pnl: Decimal,
    },
    Balance {
        time: i64,
        balance: Decimal,
    },
    Progress {
        time: i64,
        candles_processed: u64,
        candles_total: u64,
    },
    Result {
        record: Box<ResultRecord>,
    },
    Error {
        message: String,
    },
    Done,
}

/// Where the simulator's event stream goes. `append` must not buffer
/// indefinitely; `flush` forces any buffered bytes out, so a panic or
/// early return after the last `append` never silently drops output
/// (spec §7 durability note).
pub trait Sink {
    fn append(&mut self, event: &Event) -> Result<(), SinkError>;
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// An in-memory sink for tests and for embedding the simulator in another
/// process without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<Event>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn append(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one JSON object per line to an underlying `io::Write`, the
/// format the CLI's `--events` file uses.
pub struct JsonLinesSink<W: std::io::Write> {
    writer: W,
}

impl<W: std::io::Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: std::io::Write> Sink for JsonLinesSink<W> {
    fn append(&mut self, event: &Event) -> Result<(), SinkError> {
        let line = serde_json::to_string(event).map_err(|e| SinkError::Write(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| SinkError::Write(e.to_string()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|e| SinkError::Flush(e.to_string()))
    }
}
