//! Application-layer glue for the backtest engine: concrete strategies,
//! the candle-driven simulator, and the `RunConfig` that ties a strategy,
//! an exchange profile, and a candle series into a runnable backtest.

pub mod run_config;
pub mod simulator;
pub mod strategies;

pub use run_config::RunConfig;
pub use simulator::{FeeSchedule, FillPriority, Simulator, SimulatorConfig};
pub use strategies::build_strategy;
