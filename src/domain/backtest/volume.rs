use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::errors::ConfigError;

/// How a configured entry-volume amount is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeMode {
    AbsoluteQuote,
    AbsoluteBase,
    PercentBalance,
    PercentMargin,
}

/// A parsed, unresolved entry-volume specification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryVolumeSpec {
    pub value: Decimal,
    pub mode: VolumeMode,
}

/// The minimal trading state needed to resolve a `VolumeMode` into a
/// concrete quote-currency amount (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct TradingContext {
    pub balance: Decimal,
    pub margin: Decimal,
    pub current_price: Decimal,
}

/// Parses a raw volume string into its spec and mode.
///
/// Recognised forms: `"140"` / `"140 USDT"` -> AbsoluteQuote, `"5%"` ->
/// PercentBalance, `"5%M"` / `"5% margin"` -> PercentMargin, `"<n> <CCY>"`
/// with CCY != USDT -> AbsoluteBase.
pub fn parse_entry_volume(raw: &str) -> Result<EntryVolumeSpec, ConfigError> {
    let trimmed = raw.trim();
    let invalid = || ConfigError::InvalidVolumeSpec {
        raw: raw.to_string(),
    };

    if let Some(percent_part) = trimmed.strip_suffix('%') {
        // "5%" -> PercentBalance
        let value: Decimal = percent_part.trim().parse().map_err(|_| invalid())?;
        return Ok(EntryVolumeSpec {
            value,
            mode: VolumeMode::PercentBalance,
        });
    }

    let upper = trimmed.to_uppercase();
    if let Some(margin_part) = upper.strip_suffix("%M") {
        let value: Decimal = margin_part.trim().parse().map_err(|_| invalid())?;
        return Ok(EntryVolumeSpec {
            value,
            mode: VolumeMode::PercentMargin,
        });
    }
    if let Some(margin_part) = upper
        .strip_suffix("% MARGIN")
        .or_else(|| upper.strip_suffix("%MARGIN"))
    {
        let value: Decimal = margin_part.trim().parse().map_err(|_| invalid())?;
        return Ok(EntryVolumeSpec {
            value,
            mode: VolumeMode::PercentMargin,
        });
    }

    // "<n>" or "<n> <CCY>"
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let number_part = parts.next().unwrap_or("");
    let ccy_part = parts.next().map(|s| s.trim().to_uppercase());

    let value: Decimal = number_part.trim().parse().map_err(|_| invalid())?;

    match ccy_part.as_deref() {
        None | Some("USDT") | Some("USD") | Some("USDC") => Ok(EntryVolumeSpec {
            value,
            mode: VolumeMode::AbsoluteQuote,
        }),
        Some(_) => Ok(EntryVolumeSpec {
            value,
            mode: VolumeMode::AbsoluteBase,
        }),
    }
}

/// Resolves a parsed spec against a trading context into a quote-currency
/// notional.
pub fn resolve(spec: EntryVolumeSpec, context: TradingContext) -> Decimal {
    match spec.mode {
        VolumeMode::AbsoluteQuote => spec.value,
        VolumeMode::PercentBalance => context.balance * spec.value / Decimal::from(100),
        VolumeMode::PercentMargin => context.margin * spec.value / Decimal::from(100),
        VolumeMode::AbsoluteBase => spec.value * context.current_price,
    }
}

/// Re-formats a resolved spec back into its canonical string form, the
/// inverse of `parse_entry_volume` for the round-trip law in spec §8.
pub fn format_spec(spec: EntryVolumeSpec) -> String {
    match spec.mode {
        VolumeMode::AbsoluteQuote => format!("{} USDT", spec.value),
        VolumeMode::AbsoluteBase => format!("{} BASE", spec.value),
        VolumeMode::PercentBalance => format!("{}%", spec.value),
        VolumeMode::PercentMargin => format!("{}%M", spec.value),
    }
}
