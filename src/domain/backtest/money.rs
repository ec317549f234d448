use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::backtest::position::Direction;

/// A short currency identifier, e.g. "USDT", "BTC".
pub type Currency = String;

/// An amount paired with the currency it is denominated in.
///
/// Amounts are non-negative for volumes and may be signed for PnL; callers
/// are responsible for choosing the right convention, `Money` itself only
/// enforces that arithmetic never silently mixes currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<Currency>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Adds `other` to `self`. Panics if the currencies differ: the
    /// invariant is that callers never mix currencies, matching the
    /// teacher's `Portfolio`/`Trade` types which track a single quote
    /// currency per symbol.
    pub fn add(&self, other: &Money) -> Money {
        assert_eq!(self.currency, other.currency, "currency mismatch");
        Money::new(self.amount + other.amount, self.currency.clone())
    }

    pub fn sub(&self, other: &Money) -> Money {
        assert_eq!(self.currency, other.currency, "currency mismatch");
        Money::new(self.amount - other.amount, self.currency.clone())
    }

    /// Snaps `amount` down to a multiple of `step` (floor rounding), the
    /// order-formatting rule for `tickSize`/`qtyStep`.
    pub fn format_for_order(&self, step: Decimal) -> Money {
        Money::new(round_to_step(self.amount, step), self.currency.clone())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Direction in which a percent-modify moves a price: towards profit or
/// towards loss, relative to the position's `Direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentDirection {
    Profit,
    Loss,
}

/// Applies `percent` to `base` in the direction implied by `position_direction`
/// and `percent_direction`.
///
/// LONG + Profit (or SHORT + Loss) moves the price up by `percent`%.
/// LONG + Loss (or SHORT + Profit) moves the price down by `percent`%.
pub fn percent_modify(
    base: Decimal,
    percent: Decimal,
    position_direction: Direction,
    percent_direction: PercentDirection,
) -> Decimal {
    let moves_up = match (position_direction, percent_direction) {
        (Direction::Long, PercentDirection::Profit) => true,
        (Direction::Long, PercentDirection::Loss) => false,
        (Direction::Short, PercentDirection::Profit) => false,
        (Direction::Short, PercentDirection::Loss) => true,
    };

    let factor = percent / Decimal::from(100);
    if moves_up {
        base * (Decimal::ONE + factor)
    } else {
        base * (Decimal::ONE - factor)
    }
}

/// Snaps `value` down to the nearest multiple of `step` (floor rounding),
/// as required when formatting a price against `tickSize` or a quantity
/// against `qtyStep`.
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let units = (value / step).floor();
    units * step
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
