use rust_decimal::Decimal;

use crate::domain::backtest::candle::MarketView;
use crate::domain::backtest::dca::DcaGrid;
use crate::domain::backtest::errors::{ValidationError, ValidationWarning};
use crate::domain::backtest::parameters::{ParameterDescriptor, ParameterValue};
use crate::domain::backtest::pair::StrategyParams;
use crate::domain::backtest::position::{Direction, Position};
use crate::domain::backtest::volume::TradingContext;

/// The exchange facts a strategy needs at construction time to validate its
/// own parameters against (spec §4.3 validation rules): how far price can
/// move before liquidation, and at what leverage.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeSettings {
    pub leverage: Decimal,
    pub liquidation_threshold_percent: Decimal,
    pub taker_fee_percent: Decimal,
    pub maker_fee_percent: Decimal,
}

/// What a strategy wants to do with an open position on a given candle.
///
/// `BreakevenLock`/`PartialClose` carry the exact analytic trigger price
/// (spec §4.2 `updatePosition`: "progress ... closes ... at the exact
/// trigger price, not the overshoot price") rather than a bare percent —
/// the simulator is the one that knows whether the current candle's
/// `[low, high]` actually brackets that price, so it alone decides whether
/// the action fires this candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAction {
    Hold,
    Close,
    BreakevenLock { trigger_price: Decimal, close_percent: Decimal },
    PartialClose { trigger_price: Decimal, close_percent: Decimal },
}

/// Shared contract for both entry-model families: single-entry (with SL/TP/
/// BL/partial-close) and DCA grid. Mirrors the shape of the teacher's
/// `TradingStrategy` trait (`useIndicators`/`analyze`/`getParameters` style
/// seen across `application::strategies::advanced.rs`), generalized to the
/// synchronous, candle-driven contract spec §4.3 requires.
pub trait Strategy {
    /// Stable identifier used in `--strategy` and result records.
    fn name(&self) -> &'static str;

    /// Human-readable label for reports, independent of `name()`.
    fn display_name(&self) -> String {
        self.name().to_string()
    }

    /// Static parameter metadata this strategy exposes.
    fn parameters(&self) -> Vec<ParameterDescriptor>;

    /// Names of the indicators this strategy consumes (spec §4.3
    /// `useIndicators()`), e.g. `["rsi"]`. Purely descriptive — used to
    /// label the `ind` snapshot the simulator attaches to each `candle`
    /// event via `indicator_snapshot`.
    fn use_indicators(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// The current value of each name in `use_indicators()`, given the
    /// strategy's own parameters and the candle window seen so far. Empty
    /// during warmup. Used only for the event stream's `ind` snapshot; it
    /// must not be the only place an indicator is computed (`should_long`/
    /// `should_short` compute independently so a missing snapshot entry
    /// never changes trading behavior).
    fn indicator_snapshot(&self, _params: &StrategyParams, _view: &MarketView) -> Vec<(&'static str, f64)> {
        Vec::new()
    }

    /// Additional timeframes (beyond the run's primary one) this strategy's
    /// indicators require, e.g. a higher timeframe trend filter.
    fn required_timeframes(&self) -> Vec<crate::domain::market::timeframe::Timeframe> {
        Vec::new()
    }

    /// Validates `params` against `settings`, per spec §4.3:
    /// - stop-loss beyond the liquidation threshold is a hard error
    /// - stop-loss within 80% of the liquidation threshold is a warning
    /// - a breakeven-lock trigger outside `[10, 90]` is a hard error
    fn validate(
        &self,
        params: &StrategyParams,
        settings: &ExchangeSettings,
    ) -> Result<Vec<ValidationWarning>, ValidationError>;

    fn should_long(&self, params: &StrategyParams, view: &MarketView) -> bool;
    fn should_short(&self, params: &StrategyParams, view: &MarketView) -> bool;

    /// Called once a `should_long`/`should_short` signal fires, to size the
    /// entry. Returns the quote volume to commit, resolving whatever
    /// volume-mode the strategy's parameters specify (spec §4.4) against
    /// `context`.
    fn entry_volume(
        &self,
        params: &StrategyParams,
        view: &MarketView,
        direction: Direction,
        context: TradingContext,
    ) -> Decimal;

    /// The SL/TP/expected-profit-percent a strategy wants set the instant an
    /// entry fills (spec §4.3 single-entry: "immediately set SL ... and
    /// TP ..."; DCA: TP only, from the expected-averaging profit target).
    fn initial_stop_loss_and_take_profit(
        &self,
        params: &StrategyParams,
        direction: Direction,
        entry_price: Decimal,
    ) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>);

    /// Per-candle maintenance on an already-open position: deciding on
    /// breakeven-lock or partial close. TP resync on averaging shift and
    /// outright TP/SL closes are handled generically by the simulator via
    /// `Position::update_take_profit`/the stored TP-SL prices, so most
    /// strategies only need this for breakeven-lock/partial-close logic and
    /// otherwise return `Hold`.
    fn update_position(
        &self,
        params: &StrategyParams,
        view: &MarketView,
        position: &Position,
        tick_size: Decimal,
    ) -> PositionAction;

    /// `None` for single-entry strategies; `Some(grid)` for DCA strategies,
    /// built once at entry time from `params`.
    fn dca_grid(&self, _params: &StrategyParams) -> Option<DcaGrid> {
        None
    }

    /// Whether `params` asks for isolated margin (spec §4.3 single-entry
    /// validation: "enforce isolated margin if requested"). `false` by
    /// default; only strategies that expose an `isolatedMargin` parameter
    /// override this. Enforced by the caller at construction time via
    /// `Exchange::switch_margin_mode`, not by `validate` itself, since
    /// `validate` only sees `ExchangeSettings`, not the exchange.
    fn requests_isolated_margin(&self, _params: &StrategyParams) -> bool {
        false
    }
}

/// Formats a parameter's raw value for display, e.g. appending `%` to
/// percent-flavoured parameters. Kept as a free function (not a method on
/// `ParameterValue`) because the formatting rule depends on the
/// descriptor, not the value alone.
pub fn format_parameter_value(descriptor: &ParameterDescriptor, value: &ParameterValue) -> String {
    if descriptor.name.ends_with("Percent") {
        format!("{}%", value.as_str())
    } else {
        value.as_str().to_string()
    }
}

pub fn format_parameter_name(descriptor: &ParameterDescriptor) -> String {
    descriptor.label.clone()
}

/// Validates the common SL/liquidation/BL-trigger rules shared by every
/// concrete strategy, so each strategy's `validate` can defer to this
/// instead of re-deriving the threshold arithmetic.
pub fn validate_risk_parameters(
    stop_loss_percent: Decimal,
    breakeven_lock_trigger_percent: Option<Decimal>,
    settings: &ExchangeSettings,
) -> Result<Vec<ValidationWarning>, ValidationError> {
    let mut warnings = Vec::new();

    if settings.leverage > Decimal::ZERO {
        let liquidation_threshold = settings.liquidation_threshold_percent;
        if stop_loss_percent >= liquidation_threshold {
            return Err(ValidationError::StopBeyondLiquidation {
                stop_loss_percent,
                liquidation_threshold_percent: liquidation_threshold,
                leverage: settings.leverage,
            });
        }
        if stop_loss_percent >= liquidation_threshold * Decimal::new(8, 1) {
            warnings.push(ValidationWarning::NearLiquidation {
                stop_loss_percent,
                liquidation_threshold_percent: liquidation_threshold,
            });
        }
    } else {
        warnings.push(ValidationWarning::UnverifiableLeverage);
    }

    if let Some(trigger) = breakeven_lock_trigger_percent {
        if trigger < Decimal::TEN || trigger > Decimal::from(90) {
            return Err(ValidationError::BreakevenLockTriggerOutOfRange {
                trigger_percent: trigger,
            });
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(leverage: Decimal, liq_threshold: Decimal) -> ExchangeSettings {
        ExchangeSettings {
            leverage,
            liquidation_threshold_percent: liq_threshold,
            taker_fee_percent: Decimal::new(6, 2),
            maker_fee_percent: Decimal::new(2, 2),
        }
    }

    #[test]
    fn rejects_stop_loss_beyond_liquidation() {
        let s = settings(Decimal::from(10), Decimal::from(9));
        let result = validate_risk_parameters(Decimal::from(9), None, &s);
        assert!(matches!(result, Err(ValidationError::StopBeyondLiquidation { .. })));
    }

    #[test]
    fn warns_when_near_liquidation_threshold() {
        let s = settings(Decimal::from(10), Decimal::from(10));
        let warnings = validate_risk_parameters(Decimal::from(9), None, &s).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::NearLiquidation { .. })));
    }

    #[test]
    fn accepts_conservative_stop_loss_with_no_warnings() {
        let s = settings(Decimal::from(10), Decimal::from(10));
        let warnings = validate_risk_parameters(Decimal::from(5), None, &s).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn rejects_breakeven_trigger_out_of_range() {
        let s = settings(Decimal::from(10), Decimal::from(50));
        let low = validate_risk_parameters(Decimal::from(5), Some(Decimal::from(5)), &s);
        assert!(matches!(low, Err(ValidationError::BreakevenLockTriggerOutOfRange { .. })));
        let high = validate_risk_parameters(Decimal::from(5), Some(Decimal::from(95)), &s);
        assert!(matches!(high, Err(ValidationError::BreakevenLockTriggerOutOfRange { .. })));
    }

    #[test]
    fn accepts_breakeven_trigger_within_range() {
        let s = settings(Decimal::from(10), Decimal::from(50));
        let warnings = validate_risk_parameters(Decimal::from(5), Some(Decimal::from(50)), &s).unwrap();
        assert!(warnings.is_empty());
    }
}
