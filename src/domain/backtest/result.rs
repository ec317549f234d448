use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::pair::{MarketType, StrategyParams};
use crate::domain::backtest::position::Direction;
use crate::domain::backtest::statistics::{FinancialStats, RiskStats, TradeStats};

/// One periodic balance sample (spec §4.6: `balanceHistory` sampled every
/// `balance_sample_interval_seconds`), independent of the `balance` events
/// the event stream emits only when the balance actually changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BalanceSample {
    pub time: i64,
    pub balance: Decimal,
}

/// One still-open position as of `run_ended_at`, carried in the result
/// record so a consumer doesn't need the full event stream just to know
/// what's left hanging at the end of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenPositionSummary {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub volume: Decimal,
    pub created_at: i64,
    pub unrealized_pnl: Decimal,
    pub time_hanging_seconds: i64,
}

/// The final, flat summary of a completed run (spec §6). Nested stat
/// structs are flattened into top-level fields with `#[serde(flatten)]` so
/// the `--result` JSON file reads as one object, matching the single
/// `ResultRecord` table the spec's reporting layer expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub exchange_name: String,
    pub ticker: String,
    pub market_type: MarketType,
    pub timeframe: String,
    pub strategy_name: String,
    pub strategy_display_name: String,
    pub strategy_params: StrategyParams,

    pub run_started_at: i64,
    pub run_ended_at: i64,
    /// Wall-clock time the record was produced. The simulator itself never
    /// reads the clock (determinism property 1 covers the event stream, not
    /// this field) — left at `0` by `Simulator::run` and stamped by the
    /// caller after the run completes.
    pub created_at: i64,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub liquidated: bool,

    #[serde(flatten)]
    pub financial: FinancialStats,
    #[serde(flatten)]
    pub trades: TradeStats,
    #[serde(flatten)]
    pub risk: RiskStats,

    pub open_positions: Vec<OpenPositionSummary>,

    /// Periodic equity-curve samples taken at
    /// `SimulatorConfig::balance_sample_interval_seconds`, independent of
    /// whatever change-triggered `balance` events landed in the stream.
    pub balance_history: Vec<BalanceSample>,

    /// Non-fatal validation issues surfaced at construction time, carried
    /// through to the report rather than only logged (supplements spec's
    /// validation-rules section, which specifies the checks but not where
    /// their warnings end up).
    pub warnings: Vec<String>,
}
