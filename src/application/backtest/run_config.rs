//! Aggregates everything a single run needs into one value, the in-process
//! equivalent of the CLI flags in spec §6 (constructed either from parsed
//! CLI args, as `src/bin/backtest.rs` does, or directly by another caller
//! such as a future parameter optimizer).

use rust_decimal::Decimal;

use crate::application::backtest::simulator::{FeeSchedule, Simulator, SimulatorConfig};
use crate::application::backtest::strategies::build_strategy;
use crate::domain::backtest::errors::{BacktestError, ConfigError, ValidationWarning};
use crate::domain::backtest::exchange::{Exchange, MarginMode, SimulatedExchange};
use crate::domain::backtest::pair::PairDescriptor;
use crate::domain::backtest::strategy::ExchangeSettings;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pair: PairDescriptor,
    pub initial_balance: Decimal,
    pub tick_size: Decimal,
    pub qty_step: Decimal,
    pub leverage: Decimal,
    pub fees: FeeSchedule,
    pub simulator: SimulatorConfig,
}

impl RunConfig {
    /// Resolves the named strategy, validates it against the exchange
    /// settings this config implies, and assembles a ready-to-run
    /// `Simulator`. Validation warnings are returned alongside rather than
    /// logged and dropped, so the caller can fold them into
    /// `ResultRecord.warnings`.
    pub fn build(&self) -> Result<(Simulator, Vec<ValidationWarning>), BacktestError> {
        let strategy = build_strategy(&self.pair.strategy_name).ok_or_else(|| {
            BacktestError::Config(ConfigError::UnknownStrategy {
                name: self.pair.strategy_name.clone(),
            })
        })?;

        let liquidation_threshold_percent = if self.leverage > Decimal::ZERO {
            Decimal::from(100) / self.leverage
        } else {
            Decimal::ZERO
        };
        let settings = ExchangeSettings {
            leverage: self.leverage,
            liquidation_threshold_percent,
            taker_fee_percent: self.fees.taker_percent,
            maker_fee_percent: self.fees.maker_percent,
        };

        let warnings = strategy.validate(&self.pair.strategy_params, &settings)?;

        let mut exchange = SimulatedExchange::new(
            self.pair.market_type,
            self.tick_size,
            self.qty_step,
            self.leverage,
            self.fees.taker_percent,
            self.fees.maker_percent,
        );

        // spec §4.3 single-entry validation: "enforce isolated margin if
        // requested". `validate` above only checks parameter shape; actually
        // switching the exchange's margin mode needs the exchange instance,
        // which only exists from here on.
        if strategy.requests_isolated_margin(&self.pair.strategy_params) {
            exchange.switch_margin_mode(MarginMode::Isolated)?;
        }

        let simulator = Simulator::new(
            self.simulator.clone(),
            exchange,
            strategy,
            self.pair.strategy_params.clone(),
            self.pair.clone(),
            self.initial_balance,
            self.fees,
        );

        Ok((simulator, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::pair::{MarketType, StrategyParams};
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn base_pair(strategy_name: &str, params: StrategyParams) -> PairDescriptor {
        PairDescriptor::new(
            "binance",
            "BTCUSDT",
            MarketType::Futures,
            Timeframe::OneHour,
            "BTC",
            "USDT",
            strategy_name,
            params,
        )
    }

    #[test]
    fn unknown_strategy_is_rejected_at_build_time() {
        let config = RunConfig {
            pair: base_pair("not_a_real_strategy", StrategyParams::new()),
            initial_balance: dec!(1000),
            tick_size: dec!(0.01),
            qty_step: dec!(0.001),
            leverage: dec!(10),
            fees: FeeSchedule::default_for(MarketType::Futures),
            simulator: SimulatorConfig::default(),
        };
        assert!(matches!(config.build(), Err(BacktestError::Config(ConfigError::UnknownStrategy { .. }))));
    }

    #[test]
    fn stop_loss_beyond_liquidation_threshold_is_rejected() {
        let mut params = StrategyParams::new();
        params.insert("stopLossPercent".into(), "15".into());
        let config = RunConfig {
            pair: base_pair("rsi_single_entry", params),
            initial_balance: dec!(1000),
            tick_size: dec!(0.01),
            qty_step: dec!(0.001),
            leverage: dec!(10),
            fees: FeeSchedule::default_for(MarketType::Futures),
            simulator: SimulatorConfig::default(),
        };
        // 100/10 = 10 <= 15 -> rejected (spec §8 scenario 5).
        assert!(config.build().is_err());
    }

    #[test]
    fn isolated_margin_request_is_enforced_at_build_time() {
        let mut params = StrategyParams::new();
        params.insert("isolatedMargin".into(), "true".into());
        let config = RunConfig {
            pair: base_pair("rsi_single_entry", params),
            initial_balance: dec!(1000),
            tick_size: dec!(0.01),
            qty_step: dec!(0.001),
            leverage: dec!(10),
            fees: FeeSchedule::default_for(MarketType::Futures),
            simulator: SimulatorConfig::default(),
        };
        let (simulator, _) = config.build().unwrap();
        assert_eq!(
            simulator.margin_mode(),
            crate::domain::backtest::exchange::MarginMode::Isolated
        );
    }

    #[test]
    fn margin_mode_defaults_to_cross_when_not_requested() {
        let config = RunConfig {
            pair: base_pair("rsi_single_entry", StrategyParams::new()),
            initial_balance: dec!(1000),
            tick_size: dec!(0.01),
            qty_step: dec!(0.001),
            leverage: dec!(10),
            fees: FeeSchedule::default_for(MarketType::Futures),
            simulator: SimulatorConfig::default(),
        };
        let (simulator, _) = config.build().unwrap();
        assert_eq!(
            simulator.margin_mode(),
            crate::domain::backtest::exchange::MarginMode::Cross
        );
    }

    #[test]
    fn valid_config_builds_a_runnable_simulator() {
        let config = RunConfig {
            pair: base_pair("rsi_single_entry", StrategyParams::new()),
            initial_balance: dec!(1000),
            tick_size: dec!(0.01),
            qty_step: dec!(0.001),
            leverage: dec!(10),
            fees: FeeSchedule::default_for(MarketType::Futures),
            simulator: SimulatorConfig::default(),
        };
        let (mut simulator, warnings) = config.build().unwrap();
        assert!(warnings.is_empty());
        let mut sink = crate::domain::backtest::event::MemorySink::new();
        assert!(simulator.run(&[], &mut sink).is_ok());
    }
}
