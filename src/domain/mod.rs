// Candle-driven backtesting engine
pub mod backtest;

// Market timeframe enum, reused by the backtest engine's pair descriptor
pub mod market;
