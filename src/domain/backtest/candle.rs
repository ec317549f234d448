use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::errors::DataError;

/// A single OHLCV bar. `open_time` is in seconds and must be strictly
/// increasing within a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, DataError> {
        let candle = Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.low > self.open.min(self.close) {
            return Err(DataError::InvalidCandle {
                reason: format!(
                    "low {} exceeds min(open,close) at t={}",
                    self.low, self.open_time
                ),
            });
        }
        if self.high < self.open.max(self.close) {
            return Err(DataError::InvalidCandle {
                reason: format!(
                    "high {} below max(open,close) at t={}",
                    self.high, self.open_time
                ),
            });
        }
        if self.volume < Decimal::ZERO {
            return Err(DataError::InvalidCandle {
                reason: format!("negative volume at t={}", self.open_time),
            });
        }
        Ok(())
    }

    /// Whether `price` lies within this candle's `[low, high]` range
    /// inclusive — used by the simulator's fill-detection step.
    pub fn contains_price(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Validates that a candle series is ordered and strictly monotone in
/// `open_time`. Gaps (missing intervals) are accepted per spec §7; only
/// non-monotonic or duplicate timestamps are rejected.
pub fn validate_series(candles: &[Candle]) -> Result<(), DataError> {
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(DataError::NonMonotonicTimestamps {
                previous: pair[0].open_time,
                next: pair[1].open_time,
            });
        }
    }
    Ok(())
}

/// A bounded view over the most recent candles, handed to strategies so
/// they can compute indicators without holding the whole series.
#[derive(Debug, Clone)]
pub struct MarketView {
    window: Vec<Candle>,
    capacity: usize,
}

impl MarketView {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        self.window.push(candle);
        if self.window.len() > self.capacity {
            self.window.remove(0);
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.window
    }

    pub fn closes(&self) -> Vec<f64> {
        self.window
            .iter()
            .map(|c| rust_decimal::prelude::ToPrimitive::to_f64(&c.close).unwrap_or(0.0))
            .collect()
    }

    pub fn current(&self) -> Option<&Candle> {
        self.window.last()
    }
}
