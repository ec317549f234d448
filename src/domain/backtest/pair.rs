use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::domain::market::timeframe::Timeframe;

/// Spot markets settle in the base currency directly; futures markets are
/// leveraged and carry a liquidation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Futures,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => write!(f, "SPOT"),
            MarketType::Futures => write!(f, "FUTURES"),
        }
    }
}

impl FromStr for MarketType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SPOT" => Ok(MarketType::Spot),
            "FUTURES" => Ok(MarketType::Futures),
            other => Err(anyhow!("invalid market type: {other}")),
        }
    }
}

/// Canonical key-value map of strategy parameters, e.g.
/// `{"takeProfitPercent": "5", "breakevenLockEnabled": "true"}`.
pub type StrategyParams = BTreeMap<String, String>;

/// Identifies the market and strategy a single backtest run targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDescriptor {
    pub exchange_name: String,
    pub ticker: String,
    pub market_type: MarketType,
    pub timeframe: Timeframe,
    pub base_currency: String,
    pub quote_currency: String,
    pub strategy_name: String,
    pub strategy_params: StrategyParams,
}

impl PairDescriptor {
    pub fn new(
        exchange_name: impl Into<String>,
        ticker: impl Into<String>,
        market_type: MarketType,
        timeframe: Timeframe,
        base_currency: impl Into<String>,
        quote_currency: impl Into<String>,
        strategy_name: impl Into<String>,
        strategy_params: StrategyParams,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            ticker: ticker.into(),
            market_type,
            timeframe,
            base_currency: base_currency.into(),
            quote_currency: quote_currency.into(),
            strategy_name: strategy_name.into(),
            strategy_params,
        }
    }
}

/// Parses a `key=value,key2=value2` CLI argument into a `StrategyParams` map.
pub fn parse_params(raw: &str) -> Result<StrategyParams> {
    let mut params = StrategyParams::new();
    if raw.trim().is_empty() {
        return Ok(params);
    }
    for pair in raw.split(',') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid param '{pair}', expected key=value"))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}
