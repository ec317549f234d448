use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::position::Direction;
use crate::domain::backtest::volume::{self, EntryVolumeSpec, TradingContext, VolumeMode};

/// How successive DCA level offsets compose. Modeled as a tagged variant
/// rather than a boolean flag, because the source foresees a third mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetMode {
    FromEntry,
    FromPrevious,
}

/// One configured level of a DCA grid, before resolution against a trading
/// context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DcaLevel {
    pub volume: EntryVolumeSpec,
    /// The level's own deviation step: for `FromEntry` this is used
    /// directly as the offset from entry; for `FromPrevious` it feeds the
    /// multiplicative ratio chain in `build_order_map`.
    pub deviation_percent: Decimal,
}

/// A resolved grid entry ready to place as an order: absolute quote
/// volume and the signed percent offset from entry (negative below entry
/// for LONG, positive above entry for SHORT).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderMapEntry {
    pub volume_quote: Decimal,
    pub offset_percent: Decimal,
}

/// An ordered sequence of DCA levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaGrid {
    pub levels: Vec<DcaLevel>,
    pub offset_mode: OffsetMode,
}

impl DcaGrid {
    /// Builds a grid per spec §4.5:
    /// - level 0: offset 0, volume = entry_volume
    /// - level 1: offset = price_deviation
    /// - levels 2..n-1: deviation_i = deviation_{i-1} * deviation_multiplier,
    ///   volume_i = volume_{i-1} * volume_multiplier
    pub fn from_parameters(
        n: usize,
        entry_volume: Decimal,
        volume_multiplier: Decimal,
        price_deviation: Decimal,
        deviation_multiplier: Decimal,
        offset_mode: OffsetMode,
        volume_mode: VolumeMode,
    ) -> Self {
        let mut levels = Vec::with_capacity(n);
        let mut volume = entry_volume;
        let mut deviation = Decimal::ZERO;

        for i in 0..n {
            if i == 1 {
                deviation = price_deviation;
            } else if i >= 2 {
                deviation *= deviation_multiplier;
            }
            if i >= 1 {
                volume *= volume_multiplier;
            }

            levels.push(DcaLevel {
                volume: EntryVolumeSpec {
                    value: if i == 0 { entry_volume } else { volume },
                    mode: volume_mode,
                },
                deviation_percent: deviation,
            });
        }

        Self {
            levels,
            offset_mode,
        }
    }

    /// Converts the level list into absolute order-map entries, resolving
    /// volumes against `context` and offsets per the configured mode.
    pub fn build_order_map(&self, direction: Direction, context: TradingContext) -> Vec<OrderMapEntry> {
        let sign = match direction {
            Direction::Long => Decimal::from(-1),
            Direction::Short => Decimal::from(1),
        };

        let mut entries = Vec::with_capacity(self.levels.len());
        let mut ratio = Decimal::ONE;

        for (i, level) in self.levels.iter().enumerate() {
            let volume_quote = volume::resolve(level.volume, context);

            let abs_offset = if i == 0 {
                Decimal::ZERO
            } else {
                match self.offset_mode {
                    OffsetMode::FromEntry => level.deviation_percent,
                    OffsetMode::FromPrevious => {
                        let step = level.deviation_percent / Decimal::from(100);
                        ratio = match direction {
                            Direction::Long => ratio * (Decimal::ONE - step),
                            Direction::Short => ratio * (Decimal::ONE + step),
                        };
                        match direction {
                            Direction::Long => (Decimal::ONE - ratio) * Decimal::from(100),
                            Direction::Short => (ratio - Decimal::ONE) * Decimal::from(100),
                        }
                    }
                }
            };

            entries.push(OrderMapEntry {
                volume_quote,
                offset_percent: sign * abs_offset,
            });
        }

        entries
    }
}
