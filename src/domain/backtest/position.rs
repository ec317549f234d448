use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Why a position ended. Carried *inside* the terminal `PositionStatus`
/// variant (with the closing timestamp) rather than as separate nullable
/// fields on `Position`, so a position that hasn't closed can't have a
/// dangling `close_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    BreakevenLock,
    Liquidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Limit entry placed but not yet filled.
    Pending,
    /// At least one fill has occurred.
    Open,
    /// Terminal. `closed_at` and `reason` are invariants of this variant.
    Closed { reason: CloseReason, closed_at: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub time: i64,
    pub price: Decimal,
    pub added_volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub average_entry_price: Decimal,
    pub current_price: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub expected_profit_percent: Option<Decimal>,
    pub expected_stop_loss_percent: Option<Decimal>,
    pub created_at: i64,
    pub status: PositionStatus,
    pub fills: Vec<Fill>,
    pub realized_pnl: Decimal,
    /// The `average_entry_price` as of the last `update_take_profit` call;
    /// used to detect the shift that should trigger a TP resync.
    last_tp_sync_avg_price: Option<Decimal>,
}

impl Position {
    pub fn new_pending(id: impl Into<String>, direction: Direction, created_at: i64) -> Self {
        Self {
            id: id.into(),
            direction,
            volume: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            expected_profit_percent: None,
            expected_stop_loss_percent: None,
            created_at,
            status: PositionStatus::Pending,
            fills: Vec::new(),
            realized_pnl: Decimal::ZERO,
            last_tp_sync_avg_price: None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, PositionStatus::Closed { .. })
    }

    /// Averages a fill of `added_volume` base units at `price` into the
    /// position. The first fill transitions `Pending -> Open`; subsequent
    /// fills stay `Open -> Open` and recompute `average_entry_price`.
    pub fn apply_fill(&mut self, time: i64, price: Decimal, added_volume: Decimal) {
        let previous_volume = self.volume;
        let new_volume = previous_volume + added_volume;

        self.average_entry_price = if new_volume.is_zero() {
            price
        } else {
            (self.average_entry_price * previous_volume + price * added_volume) / new_volume
        };

        if matches!(self.status, PositionStatus::Pending) {
            self.entry_price = price;
            self.status = PositionStatus::Open;
        }

        self.volume = new_volume;
        self.current_price = price;
        self.fills.push(Fill {
            time,
            price,
            added_volume,
        });
    }

    /// Closes a `fraction` (0,1] of the current volume at `price`,
    /// realizing its PnL; the position stays `Open` (used for partial
    /// close and breakeven-lock partial close).
    pub fn partial_close(&mut self, price: Decimal, fraction: Decimal) -> Decimal {
        let closed_volume = self.volume * fraction;
        let pnl = self.pnl_for_volume(price, closed_volume);
        self.volume -= closed_volume;
        self.realized_pnl += pnl;
        self.current_price = price;
        pnl
    }

    /// Fully closes the position at `price`, realizing the remaining
    /// volume's PnL and transitioning to the terminal status.
    pub fn close(&mut self, time: i64, price: Decimal, reason: CloseReason) -> Decimal {
        let pnl = self.pnl_for_volume(price, self.volume);
        self.realized_pnl += pnl;
        self.current_price = price;
        self.status = PositionStatus::Closed {
            reason,
            closed_at: time,
        };
        pnl
    }

    pub fn pnl_for_volume(&self, price: Decimal, volume: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => (price - self.average_entry_price) * volume,
            Direction::Short => (self.average_entry_price - price) * volume,
        }
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.pnl_for_volume(price, self.volume)
    }

    /// `true` once `stop_loss_price` lies within two tick-sizes of
    /// `average_entry_price`. This is the sole marker of breakeven-lock
    /// having executed — there is deliberately no separate boolean flag,
    /// so the state survives persistence without extra fields.
    pub fn is_breakeven_lock_executed(&self, tick_size: Decimal) -> bool {
        match self.stop_loss_price {
            Some(sl) => (sl - self.average_entry_price).abs() <= tick_size * Decimal::from(2),
            None => false,
        }
    }

    /// Sets `stop_loss_price`, enforcing that it stays on the losing side
    /// of entry (LONG: SL <= entry; SHORT: SL >= entry). When `target`
    /// would land exactly on `average_entry_price` (the breakeven-lock
    /// case), it is nudged by one tick onto the losing side so the
    /// invariant holds even at breakeven.
    pub fn set_stop_loss_price(&mut self, target: Decimal, tick_size: Decimal) {
        let entry = self.average_entry_price;
        let nudged = match self.direction {
            Direction::Long => {
                if target >= entry {
                    entry - tick_size
                } else {
                    target
                }
            }
            Direction::Short => {
                if target <= entry {
                    entry + tick_size
                } else {
                    target
                }
            }
        };
        self.stop_loss_price = Some(nudged);
    }

    /// Recomputes `take_profit_price` from `average_entry_price` if it has
    /// shifted since the last sync (spec §4.2 `updateTakeProfit`).
    pub fn update_take_profit(&mut self, expected_profit_percent: Decimal) {
        let shifted = self.last_tp_sync_avg_price != Some(self.average_entry_price);
        if !shifted {
            return;
        }
        let factor = expected_profit_percent / Decimal::from(100);
        self.take_profit_price = Some(match self.direction {
            Direction::Long => self.average_entry_price * (Decimal::ONE + factor),
            Direction::Short => self.average_entry_price * (Decimal::ONE - factor),
        });
        self.expected_profit_percent = Some(expected_profit_percent);
        self.last_tp_sync_avg_price = Some(self.average_entry_price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_fill_transitions_pending_to_open() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        assert!(pos.is_open());
        assert_eq!(pos.entry_price, dec!(100));
        assert_eq!(pos.average_entry_price, dec!(100));
    }

    #[test]
    fn averaging_weights_by_volume() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        pos.apply_fill(60, dec!(90), dec!(2));
        // (100*1 + 90*2) / 3 = 93.333...
        let expected = (dec!(100) * dec!(1) + dec!(90) * dec!(2)) / dec!(3);
        assert_eq!(pos.average_entry_price, expected);
        assert_eq!(pos.volume, dec!(3));
    }

    #[test]
    fn breakeven_lock_detection_is_stable() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        assert!(!pos.is_breakeven_lock_executed(dec!(0.01)));
        pos.set_stop_loss_price(dec!(100), dec!(0.01));
        assert!(pos.is_breakeven_lock_executed(dec!(0.01)));
        assert!(pos.stop_loss_price.unwrap() <= pos.average_entry_price);
    }

    #[test]
    fn stop_loss_stays_on_losing_side_long() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        pos.set_stop_loss_price(dec!(95), dec!(0.01));
        assert_eq!(pos.stop_loss_price, Some(dec!(95)));
    }

    #[test]
    fn stop_loss_stays_on_losing_side_short() {
        let mut pos = Position::new_pending("p1", Direction::Short, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        pos.set_stop_loss_price(dec!(105), dec!(0.01));
        assert_eq!(pos.stop_loss_price, Some(dec!(105)));
        // attempting to set SL on the wrong side nudges it
        pos.set_stop_loss_price(dec!(90), dec!(0.01));
        assert_eq!(pos.stop_loss_price, Some(dec!(100.01)));
    }

    #[test]
    fn partial_close_reduces_volume_and_realizes_pnl() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        let pnl = pos.partial_close(dec!(110), dec!(0.5));
        assert_eq!(pnl, dec!(5)); // (110-100)*0.5
        assert_eq!(pos.volume, dec!(0.5));
        assert!(pos.is_open());
    }

    #[test]
    fn close_sets_terminal_status() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        let pnl = pos.close(60, dec!(105), CloseReason::TakeProfit);
        assert_eq!(pnl, dec!(5));
        assert!(pos.is_closed());
        match pos.status {
            PositionStatus::Closed { reason, closed_at } => {
                assert_eq!(reason, CloseReason::TakeProfit);
                assert_eq!(closed_at, 60);
            }
            _ => panic!("expected closed"),
        }
    }

    #[test]
    fn update_take_profit_only_resyncs_on_shift() {
        let mut pos = Position::new_pending("p1", Direction::Long, 0);
        pos.apply_fill(0, dec!(100), dec!(1));
        pos.update_take_profit(dec!(5));
        assert_eq!(pos.take_profit_price, Some(dec!(105)));
        // no shift: second call is a no-op even with a different percent
        pos.update_take_profit(dec!(10));
        assert_eq!(pos.take_profit_price, Some(dec!(105)));
        // shift via a DCA fill recomputes
        pos.apply_fill(60, dec!(90), dec!(1));
        pos.update_take_profit(dec!(10));
        assert_eq!(pos.take_profit_price, Some(pos.average_entry_price * dec!(1.10)));
    }
}
