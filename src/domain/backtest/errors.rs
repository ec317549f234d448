use thiserror::Error;

/// Errors raised while constructing a run (unknown strategy, invalid
/// parameter value, invalid volume spec). These fail before the simulator
/// ever starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid entry volume spec: '{raw}'")]
    InvalidVolumeSpec { raw: String },
}

/// Errors raised while validating a strategy's configuration against the
/// exchange's constraints (spec §4.3 validation rules). These also fail at
/// construction time, but are about the trading logic rather than parsing.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "stop-loss {stop_loss_percent}% is beyond the liquidation threshold \
         of {liquidation_threshold_percent}% at {leverage}x leverage"
    )]
    StopBeyondLiquidation {
        stop_loss_percent: rust_decimal::Decimal,
        liquidation_threshold_percent: rust_decimal::Decimal,
        leverage: rust_decimal::Decimal,
    },

    #[error("breakeven-lock trigger {trigger_percent}% is outside [10, 90]")]
    BreakevenLockTriggerOutOfRange {
        trigger_percent: rust_decimal::Decimal,
    },
}

/// Non-fatal validation issues: the run proceeds but the issue is recorded
/// in the result record's `warnings`.
#[derive(Debug, Error, Clone)]
pub enum ValidationWarning {
    #[error(
        "stop-loss {stop_loss_percent}% is within 80% of the liquidation \
         threshold of {liquidation_threshold_percent}%"
    )]
    NearLiquidation {
        stop_loss_percent: rust_decimal::Decimal,
        liquidation_threshold_percent: rust_decimal::Decimal,
    },

    #[error("cannot verify leverage for this market")]
    UnverifiableLeverage,
}

/// Errors about the candle series itself.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid candle: {reason}")]
    InvalidCandle { reason: String },

    #[error("non-monotonic timestamps: {previous} followed by {next}")]
    NonMonotonicTimestamps { previous: i64, next: i64 },
}

/// I/O failures on the event or result sink. The simulator must surface
/// these rather than swallow them (spec §7).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write event: {0}")]
    Write(String),

    #[error("failed to flush sink: {0}")]
    Flush(String),
}

/// Top-level error returned by run construction and the simulator's
/// outer boundary.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
