use rust_decimal::Decimal;

use crate::domain::backtest::errors::BacktestError;
use crate::domain::backtest::pair::MarketType;

/// Margin mode for futures markets; irrelevant (and unused) on spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// A limit order resting on the book, tracked so the simulator can check
/// it for a fill against each incoming candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitOrder {
    pub id: u64,
    pub price: Decimal,
    pub volume: Decimal,
}

/// The exchange-facing surface a strategy and the simulator operate
/// through, generalized from the teacher's async execution ports
/// (`domain::ports::ExecutionService`) into the synchronous, single-
/// threaded contract spec §5 requires: every call here resolves
/// immediately against the simulator's own state, with no await points
/// and therefore no possibility of interleaving.
pub trait Exchange {
    fn market_type(&self) -> MarketType;

    fn current_price(&self) -> Decimal;

    /// Smallest price increment this market quotes in.
    fn tick_size(&self) -> Decimal;

    /// Smallest quantity increment this market trades in.
    fn qty_step(&self) -> Decimal;

    fn leverage(&self) -> Decimal;

    fn margin_mode(&self) -> MarginMode;

    fn switch_margin_mode(&mut self, mode: MarginMode) -> Result<(), BacktestError>;

    fn taker_fee_percent(&self) -> Decimal;

    fn maker_fee_percent(&self) -> Decimal;

    /// Places a market entry for `volume` base units, filled at the
    /// current price. Returns the fill price actually used (after any
    /// tick-size rounding).
    fn open_position(&mut self, volume: Decimal) -> Decimal;

    /// Places a resting limit order (used by DCA grids and partial-close
    /// targets). Returns an id the caller can later cancel.
    fn place_limit_order(&mut self, price: Decimal, volume: Decimal) -> u64;

    /// Places a limit order meant to close (part of) a position.
    fn place_limit_close(&mut self, price: Decimal, volume: Decimal) -> u64;

    /// Immediately closes `volume` base units at the current price.
    fn partial_close(&mut self, volume: Decimal) -> Decimal;

    fn set_take_profit(&mut self, price: Decimal);

    fn set_stop_loss(&mut self, price: Decimal);

    fn remove_limit_orders(&mut self);
}

/// A deterministic in-memory exchange stub: fills are resolved purely from
/// the quoted `current_price`/resting-order state, with no randomness or
/// I/O, so a simulator driven by it produces byte-identical output for the
/// same candle series and parameters (spec §5, §8 property 1).
#[derive(Debug, Clone)]
pub struct SimulatedExchange {
    market_type: MarketType,
    current_price: Decimal,
    tick_size: Decimal,
    qty_step: Decimal,
    leverage: Decimal,
    margin_mode: MarginMode,
    taker_fee_percent: Decimal,
    maker_fee_percent: Decimal,
    resting_orders: Vec<LimitOrder>,
    next_order_id: u64,
}

impl SimulatedExchange {
    pub fn new(
        market_type: MarketType,
        tick_size: Decimal,
        qty_step: Decimal,
        leverage: Decimal,
        taker_fee_percent: Decimal,
        maker_fee_percent: Decimal,
    ) -> Self {
        Self {
            market_type,
            current_price: Decimal::ZERO,
            tick_size,
            qty_step,
            leverage,
            margin_mode: MarginMode::Cross,
            taker_fee_percent,
            maker_fee_percent,
            resting_orders: Vec::new(),
            next_order_id: 1,
        }
    }

    /// Advances the quoted price; called by the simulator once per candle.
    pub fn mark_price(&mut self, price: Decimal) {
        self.current_price = price;
    }

    pub fn resting_orders(&self) -> &[LimitOrder] {
        &self.resting_orders
    }

    pub fn cancel_order(&mut self, id: u64) {
        self.resting_orders.retain(|o| o.id != id);
    }
}

impl Exchange for SimulatedExchange {
    fn market_type(&self) -> MarketType {
        self.market_type
    }

    fn current_price(&self) -> Decimal {
        self.current_price
    }

    fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    fn qty_step(&self) -> Decimal {
        self.qty_step
    }

    fn leverage(&self) -> Decimal {
        self.leverage
    }

    fn margin_mode(&self) -> MarginMode {
        self.margin_mode
    }

    fn switch_margin_mode(&mut self, mode: MarginMode) -> Result<(), BacktestError> {
        self.margin_mode = mode;
        Ok(())
    }

    fn taker_fee_percent(&self) -> Decimal {
        self.taker_fee_percent
    }

    fn maker_fee_percent(&self) -> Decimal {
        self.maker_fee_percent
    }

    fn open_position(&mut self, _volume: Decimal) -> Decimal {
        crate::domain::backtest::money::round_to_step(self.current_price, self.tick_size)
    }

    fn place_limit_order(&mut self, price: Decimal, volume: Decimal) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        self.resting_orders.push(LimitOrder { id, price, volume });
        id
    }

    fn place_limit_close(&mut self, price: Decimal, volume: Decimal) -> u64 {
        self.place_limit_order(price, volume)
    }

    fn partial_close(&mut self, _volume: Decimal) -> Decimal {
        crate::domain::backtest::money::round_to_step(self.current_price, self.tick_size)
    }

    fn set_take_profit(&mut self, _price: Decimal) {}

    fn set_stop_loss(&mut self, _price: Decimal) {}

    fn remove_limit_orders(&mut self) {
        self.resting_orders.clear();
    }
}
