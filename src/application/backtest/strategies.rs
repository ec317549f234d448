//! Concrete example strategies implementing `domain::backtest::strategy::Strategy`:
//! an RSI-reversal single-entry strategy (SL/TP/Breakeven-Lock) and an
//! RSI-triggered DCA grid strategy. These are the reference implementations
//! of the two strategy families spec §4.3 describes in the abstract; a real
//! deployment would add more, registered the same way.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::backtest::candle::MarketView;
use crate::domain::backtest::dca::{DcaGrid, OffsetMode};
use crate::domain::backtest::errors::{ValidationError, ValidationWarning};
use crate::domain::backtest::indicators;
use crate::domain::backtest::money::{PercentDirection, percent_modify};
use crate::domain::backtest::parameters::{ParameterDescriptor, ParameterType};
use crate::domain::backtest::pair::StrategyParams;
use crate::domain::backtest::position::{Direction, Position};
use crate::domain::backtest::strategy::{ExchangeSettings, PositionAction, Strategy, validate_risk_parameters};
use crate::domain::backtest::volume::{self, TradingContext, VolumeMode};

fn param_str<'a>(params: &'a StrategyParams, key: &str, default: &'a str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or(default)
}

fn param_decimal(params: &StrategyParams, key: &str, default: &str) -> Decimal {
    param_str(params, key, default).trim().parse().unwrap_or_else(|_| {
        default.parse().expect("default parameter value must parse")
    })
}

fn param_usize(params: &StrategyParams, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn param_bool(params: &StrategyParams, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        None => default,
    }
}

/// Single-entry strategy: enters on an RSI reversal out of an oversold
/// (long) or overbought (short) zone, with SL/TP set at entry and an
/// optional Breakeven-Lock (spec §4.3, §9).
#[derive(Debug, Default)]
pub struct RsiSingleEntryStrategy;

impl RsiSingleEntryStrategy {
    fn rsi_period(&self, params: &StrategyParams) -> usize {
        param_usize(params, "rsiPeriod", 14)
    }

    fn rsi_cross(&self, params: &StrategyParams, view: &MarketView) -> Option<(f64, f64)> {
        let period = self.rsi_period(params);
        let closes = view.closes();
        let values = indicators::rsi(&closes, period)?;
        if values.len() < 2 {
            return None;
        }
        Some((values[values.len() - 2], values[values.len() - 1]))
    }
}

impl Strategy for RsiSingleEntryStrategy {
    fn name(&self) -> &'static str {
        "rsi_single_entry"
    }

    fn display_name(&self) -> String {
        "RSI Reversal (Single Entry)".to_string()
    }

    fn parameters(&self) -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::new("rsiPeriod", "RSI Period", ParameterType::Int, "indicators", "14"),
            ParameterDescriptor::new("rsiOversold", "RSI Oversold", ParameterType::Float, "indicators", "30"),
            ParameterDescriptor::new("rsiOverbought", "RSI Overbought", ParameterType::Float, "indicators", "70"),
            ParameterDescriptor::new("entryVolume", "Entry Volume", ParameterType::String, "sizing", "100"),
            ParameterDescriptor::new("takeProfitPercent", "Take Profit %", ParameterType::Float, "exit", "5"),
            ParameterDescriptor::new("stopLossPercent", "Stop Loss %", ParameterType::Float, "exit", "5"),
            ParameterDescriptor::new(
                "breakevenLockEnabled",
                "Breakeven-Lock Enabled",
                ParameterType::Bool,
                "breakeven_lock",
                "false",
            ),
            ParameterDescriptor::new(
                "breakevenLockTriggerPercent",
                "Breakeven-Lock Trigger %",
                ParameterType::Float,
                "breakeven_lock",
                "50",
            )
            .with_enabled_when("breakevenLockEnabled", "true"),
            ParameterDescriptor::new(
                "breakevenLockClosePercent",
                "Breakeven-Lock Close %",
                ParameterType::Float,
                "breakeven_lock",
                "50",
            )
            .with_enabled_when("breakevenLockEnabled", "true"),
            ParameterDescriptor::new(
                "isolatedMargin",
                "Isolated Margin",
                ParameterType::Bool,
                "exchange",
                "false",
            ),
        ]
    }

    fn validate(
        &self,
        params: &StrategyParams,
        settings: &ExchangeSettings,
    ) -> Result<Vec<ValidationWarning>, ValidationError> {
        let stop_loss_percent = param_decimal(params, "stopLossPercent", "5");
        let bl_enabled = param_bool(params, "breakevenLockEnabled", false);
        let trigger = bl_enabled.then(|| param_decimal(params, "breakevenLockTriggerPercent", "50"));
        validate_risk_parameters(stop_loss_percent, trigger, settings)
    }

    fn requests_isolated_margin(&self, params: &StrategyParams) -> bool {
        param_bool(params, "isolatedMargin", false)
    }

    fn use_indicators(&self) -> Vec<&'static str> {
        vec!["rsi"]
    }

    fn indicator_snapshot(&self, params: &StrategyParams, view: &MarketView) -> Vec<(&'static str, f64)> {
        let period = self.rsi_period(params);
        match indicators::rsi(&view.closes(), period) {
            Some(values) => values.last().map(|v| vec![("rsi", *v)]).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn should_long(&self, params: &StrategyParams, view: &MarketView) -> bool {
        let oversold = param_decimal(params, "rsiOversold", "30").to_f64().unwrap_or(30.0);
        match self.rsi_cross(params, view) {
            Some((prev, curr)) => prev <= oversold && curr > oversold,
            None => false,
        }
    }

    fn should_short(&self, params: &StrategyParams, view: &MarketView) -> bool {
        let overbought = param_decimal(params, "rsiOverbought", "70").to_f64().unwrap_or(70.0);
        match self.rsi_cross(params, view) {
            Some((prev, curr)) => prev >= overbought && curr < overbought,
            None => false,
        }
    }

    fn entry_volume(
        &self,
        params: &StrategyParams,
        _view: &MarketView,
        _direction: Direction,
        context: TradingContext,
    ) -> Decimal {
        let raw = param_str(params, "entryVolume", "100");
        let spec = volume::parse_entry_volume(raw).unwrap_or(crate::domain::backtest::volume::EntryVolumeSpec {
            value: Decimal::from(100),
            mode: VolumeMode::AbsoluteQuote,
        });
        volume::resolve(spec, context)
    }

    fn initial_stop_loss_and_take_profit(
        &self,
        params: &StrategyParams,
        direction: Direction,
        entry_price: Decimal,
    ) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>) {
        let tp_percent = param_decimal(params, "takeProfitPercent", "5");
        let sl_percent = param_decimal(params, "stopLossPercent", "5");
        let tp = percent_modify(entry_price, tp_percent, direction, PercentDirection::Profit);
        let sl = percent_modify(entry_price, sl_percent, direction, PercentDirection::Loss);
        (Some(sl), Some(tp), Some(tp_percent))
    }

    fn update_position(
        &self,
        params: &StrategyParams,
        _view: &MarketView,
        position: &Position,
        tick_size: Decimal,
    ) -> PositionAction {
        if !param_bool(params, "breakevenLockEnabled", false) {
            return PositionAction::Hold;
        }
        if position.is_breakeven_lock_executed(tick_size) {
            return PositionAction::Hold;
        }
        let entry = position.average_entry_price;
        let tp = match position.take_profit_price {
            Some(tp) => tp,
            None => return PositionAction::Hold,
        };
        let trigger_percent = param_decimal(params, "breakevenLockTriggerPercent", "50");
        let close_percent = param_decimal(params, "breakevenLockClosePercent", "50");
        let trigger_price = entry + (tp - entry) * trigger_percent / Decimal::from(100);
        PositionAction::BreakevenLock {
            trigger_price,
            close_percent,
        }
    }
}

/// DCA grid strategy: enters on a plain RSI oversold/overbought condition
/// and averages into the position via a grid built at entry time (spec
/// §4.3 DCA, §4.5).
#[derive(Debug, Default)]
pub struct RsiDcaGridStrategy;

impl RsiDcaGridStrategy {
    fn rsi_latest(&self, params: &StrategyParams, view: &MarketView) -> Option<f64> {
        let period = param_usize(params, "rsiPeriod", 14);
        let closes = view.closes();
        indicators::rsi(&closes, period)?.last().copied()
    }

    fn entry_spec(&self, params: &StrategyParams) -> crate::domain::backtest::volume::EntryVolumeSpec {
        let raw = param_str(params, "initialEntryVolume", "100");
        volume::parse_entry_volume(raw).unwrap_or(crate::domain::backtest::volume::EntryVolumeSpec {
            value: Decimal::from(100),
            mode: VolumeMode::AbsoluteQuote,
        })
    }
}

impl Strategy for RsiDcaGridStrategy {
    fn name(&self) -> &'static str {
        "rsi_dca_grid"
    }

    fn display_name(&self) -> String {
        "RSI DCA Grid".to_string()
    }

    fn parameters(&self) -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::new("rsiPeriod", "RSI Period", ParameterType::Int, "indicators", "14"),
            ParameterDescriptor::new("rsiOversold", "RSI Oversold", ParameterType::Float, "indicators", "30"),
            ParameterDescriptor::new("rsiOverbought", "RSI Overbought", ParameterType::Float, "indicators", "70"),
            ParameterDescriptor::new(
                "numberOfLevels",
                "Number of Levels",
                ParameterType::Int,
                "grid",
                "3",
            ),
            ParameterDescriptor::new(
                "initialEntryVolume",
                "Initial Entry Volume",
                ParameterType::String,
                "grid",
                "100",
            ),
            ParameterDescriptor::new(
                "volumeMultiplier",
                "Volume Multiplier",
                ParameterType::Float,
                "grid",
                "2",
            ),
            ParameterDescriptor::new(
                "priceDeviation",
                "Price Deviation %",
                ParameterType::Float,
                "grid",
                "10",
            ),
            ParameterDescriptor::new(
                "deviationMultiplier",
                "Deviation Multiplier",
                ParameterType::Float,
                "grid",
                "1",
            ),
            ParameterDescriptor::new(
                "offsetMode",
                "Offset Mode",
                ParameterType::Select,
                "grid",
                "from_previous",
            )
            .with_options(vec!["from_entry".to_string(), "from_previous".to_string()]),
            ParameterDescriptor::new(
                "expectedProfitPercent",
                "Expected Profit %",
                ParameterType::Float,
                "exit",
                "5",
            ),
        ]
    }

    fn validate(
        &self,
        _params: &StrategyParams,
        settings: &ExchangeSettings,
    ) -> Result<Vec<ValidationWarning>, ValidationError> {
        // DCA grids carry no hard stop-loss in this model; only the
        // leverage-verifiability warning from the shared helper applies.
        validate_risk_parameters(Decimal::ZERO, None, settings)
    }

    fn use_indicators(&self) -> Vec<&'static str> {
        vec!["rsi"]
    }

    fn indicator_snapshot(&self, params: &StrategyParams, view: &MarketView) -> Vec<(&'static str, f64)> {
        self.rsi_latest(params, view).map(|v| vec![("rsi", v)]).unwrap_or_default()
    }

    fn should_long(&self, params: &StrategyParams, view: &MarketView) -> bool {
        let oversold = param_decimal(params, "rsiOversold", "30").to_f64().unwrap_or(30.0);
        self.rsi_latest(params, view).is_some_and(|v| v <= oversold)
    }

    fn should_short(&self, params: &StrategyParams, view: &MarketView) -> bool {
        let overbought = param_decimal(params, "rsiOverbought", "70").to_f64().unwrap_or(70.0);
        self.rsi_latest(params, view).is_some_and(|v| v >= overbought)
    }

    fn entry_volume(
        &self,
        params: &StrategyParams,
        _view: &MarketView,
        _direction: Direction,
        context: TradingContext,
    ) -> Decimal {
        volume::resolve(self.entry_spec(params), context)
    }

    fn initial_stop_loss_and_take_profit(
        &self,
        params: &StrategyParams,
        direction: Direction,
        entry_price: Decimal,
    ) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>) {
        let expected_profit_percent = param_decimal(params, "expectedProfitPercent", "5");
        let tp = percent_modify(entry_price, expected_profit_percent, direction, PercentDirection::Profit);
        (None, Some(tp), Some(expected_profit_percent))
    }

    fn update_position(
        &self,
        _params: &StrategyParams,
        _view: &MarketView,
        _position: &Position,
        _tick_size: Decimal,
    ) -> PositionAction {
        // DCA fills and TP resync are driven entirely by the simulator's
        // grid-runtime and `Position::update_take_profit`; this strategy has
        // nothing extra to decide per candle.
        PositionAction::Hold
    }

    fn dca_grid(&self, params: &StrategyParams) -> Option<DcaGrid> {
        let n = param_usize(params, "numberOfLevels", 3).max(1);
        let spec = self.entry_spec(params);
        let volume_multiplier = param_decimal(params, "volumeMultiplier", "2");
        let price_deviation = param_decimal(params, "priceDeviation", "10");
        let deviation_multiplier = param_decimal(params, "deviationMultiplier", "1");
        let offset_mode = match param_str(params, "offsetMode", "from_previous") {
            "from_entry" => OffsetMode::FromEntry,
            _ => OffsetMode::FromPrevious,
        };
        Some(DcaGrid::from_parameters(
            n,
            spec.value,
            volume_multiplier,
            price_deviation,
            deviation_multiplier,
            offset_mode,
            spec.mode,
        ))
    }
}

/// Resolves a strategy name (spec §6 `--strategy`) to a concrete instance.
pub fn build_strategy(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "rsi_single_entry" => Some(Box::new(RsiSingleEntryStrategy)),
        "rsi_dca_grid" => Some(Box::new(RsiDcaGridStrategy)),
        _ => None,
    }
}
