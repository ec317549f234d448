//! The candle-driven, single-threaded, deterministic event loop (spec
//! §4.6). Advances a [`SimulatedExchange`] and a `Box<dyn Strategy>` one
//! candle at a time, applying fills in the fixed intra-candle priority spec
//! §4.6 defines, and folds the finished run into a [`ResultRecord`] via
//! `domain::backtest::statistics`.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::backtest::candle::{Candle, MarketView, validate_series};
use crate::domain::backtest::dca::OrderMapEntry;
use crate::domain::backtest::errors::BacktestError;
use crate::domain::backtest::event::{Event, Sink};
use crate::domain::backtest::exchange::{Exchange, SimulatedExchange};
use crate::domain::backtest::money::round_to_step;
use crate::domain::backtest::pair::{MarketType, PairDescriptor, StrategyParams};
use crate::domain::backtest::position::{CloseReason, Direction, Position};
use crate::domain::backtest::result::{BalanceSample, OpenPositionSummary, ResultRecord};
use crate::domain::backtest::statistics::{financial_stats, risk_stats, trade_stats};
use crate::domain::backtest::strategy::{PositionAction, Strategy};
use crate::domain::backtest::volume::TradingContext;

/// Fee rate charged per fill, by how the fill was triggered. Promoted to a
/// run input (spec §9: "fee schedules ... the spec promotes them to an
/// input") rather than hard-coded per exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub taker_percent: Decimal,
    pub maker_percent: Decimal,
}

impl FeeSchedule {
    /// Spec §4.6 defaults: spot 0.1%/0.1%, futures taker 0.055% / maker 0.02%.
    pub fn default_for(market_type: MarketType) -> Self {
        match market_type {
            MarketType::Spot => Self {
                taker_percent: Decimal::new(1, 1),
                maker_percent: Decimal::new(1, 1),
            },
            MarketType::Futures => Self {
                taker_percent: Decimal::new(55, 3),
                maker_percent: Decimal::new(2, 2),
            },
        }
    }

    fn amount(&self, rate_percent: Decimal, notional: Decimal) -> Decimal {
        notional * rate_percent / Decimal::from(100)
    }
}

/// The intra-candle priority between TP and SL when a single candle
/// brackets both (spec §4.6(d), §9 Open Question). Fixed to `SlBeforeTp` as
/// the conservative default, but kept as a run-time policy rather than a
/// hard-coded constant so a caller can flip it to match historical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPriority {
    SlBeforeTp,
    TpBeforeSl,
}

impl Default for FillPriority {
    fn default() -> Self {
        FillPriority::SlBeforeTp
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub fill_priority: FillPriority,
    /// Whether a long and a short position may be open simultaneously.
    pub two_way: bool,
    /// Minimum seconds (by candle `open_time`) between a position closing
    /// and a new entry of the same strategy being allowed.
    pub cooldown_seconds: i64,
    pub balance_sample_interval_seconds: i64,
    pub progress_emit_interval_candles: u64,
    pub market_view_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fill_priority: FillPriority::SlBeforeTp,
            two_way: false,
            cooldown_seconds: 0,
            balance_sample_interval_seconds: 3600,
            progress_emit_interval_candles: 100,
            market_view_capacity: 500,
        }
    }
}

/// Per-position DCA bookkeeping the simulator owns (spec §4.5/§4.6):
/// the price the grid's offsets are measured from, and the levels (beyond
/// the already-filled entry level) still waiting to trigger, sorted by
/// descending offset magnitude so "the deepest level whose offset has been
/// crossed" can be found with a single scan.
#[derive(Debug, Clone)]
struct DcaRuntime {
    anchor_entry_price: Decimal,
    remaining: Vec<OrderMapEntry>,
}

pub struct Simulator {
    config: SimulatorConfig,
    exchange: SimulatedExchange,
    strategy: Box<dyn Strategy>,
    params: StrategyParams,
    pair: PairDescriptor,
    initial_balance: Decimal,
    fees: FeeSchedule,
}

impl Simulator {
    pub fn new(
        config: SimulatorConfig,
        exchange: SimulatedExchange,
        strategy: Box<dyn Strategy>,
        params: StrategyParams,
        pair: PairDescriptor,
        initial_balance: Decimal,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            config,
            exchange,
            strategy,
            params,
            pair,
            initial_balance,
            fees,
        }
    }

    /// The margin mode the underlying exchange was left in at construction
    /// time (spec §4.3: "enforce isolated margin if requested"), exposed for
    /// callers/tests that want to confirm the request actually took effect.
    pub fn margin_mode(&self) -> crate::domain::backtest::exchange::MarginMode {
        self.exchange.margin_mode()
    }

    /// Runs the full candle series to completion, emitting one event per
    /// side-effect to `sink`, and returns the folded `ResultRecord`. Never
    /// panics on bad market data (spec §7): the only error returns are
    /// construction-adjacent (non-monotonic candles) or I/O failures on the
    /// sink, which are surfaced rather than swallowed.
    pub fn run(&mut self, candles: &[Candle], sink: &mut dyn Sink) -> Result<ResultRecord, BacktestError> {
        validate_series(candles)?;

        info!(
            pair = %self.pair.ticker,
            strategy = self.strategy.name(),
            candles = candles.len(),
            "starting backtest run"
        );

        sink.append(&Event::Init {
            pair: self.pair.ticker.clone(),
            strategy: self.strategy.name().to_string(),
            initial_balance: self.initial_balance,
        })?;

        let tick_size = self.exchange.tick_size();
        let qty_step = self.exchange.qty_step();

        let mut balance = self.initial_balance;
        let mut last_emitted_balance = balance;
        let mut open: Vec<Position> = Vec::new();
        let mut finished: Vec<Position> = Vec::new();
        let mut dca_runtimes: HashMap<String, DcaRuntime> = HashMap::new();
        let mut liquidated = false;
        let mut next_id: u64 = 0;
        let mut last_close_time: Option<i64> = None;
        let mut last_balance_sample: Option<i64> = None;
        let mut max_unrealized_drawdown = Decimal::ZERO;
        let mut balance_history: Vec<BalanceSample> = Vec::new();
        let mut view = MarketView::new(self.config.market_view_capacity);

        let sim_start = candles.first().map(|c| c.open_time).unwrap_or(0);
        let sim_end = candles
            .last()
            .map(|c| c.open_time + self.pair.timeframe.to_seconds())
            .unwrap_or(0);

        'candles: for (index, candle) in candles.iter().enumerate() {
            view.push(*candle);

            let indicator_snapshot: Vec<(String, f64)> = self
                .strategy
                .indicator_snapshot(&self.params, &view)
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();

            sink.append(&Event::Candle {
                time: candle.open_time,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
                indicators: indicator_snapshot,
            })?;

            self.exchange.mark_price(candle.close);
            for position in open.iter_mut() {
                position.current_price = candle.close;
            }

            // (a) liquidation check: worst-case mark-to-market within this
            // candle's range drives balance negative.
            let worst_case_equity = balance
                + open
                    .iter()
                    .map(|p| {
                        let worst_price = match p.direction {
                            Direction::Long => candle.low,
                            Direction::Short => candle.high,
                        };
                        p.pnl_for_volume(worst_price, p.volume)
                    })
                    .sum::<Decimal>();

            if worst_case_equity < Decimal::ZERO && !open.is_empty() {
                warn!(time = candle.open_time, "liquidation triggered");
                for mut position in open.drain(..) {
                    let worst_price = match position.direction {
                        Direction::Long => candle.low,
                        Direction::Short => candle.high,
                    };
                    let pnl = position.close(candle.open_time, worst_price, CloseReason::Liquidation);
                    let fee = self.fees.amount(self.fees.taker_percent, worst_price * position.volume);
                    balance += pnl - fee;
                    sink.append(&Event::PositionClose {
                        time: candle.open_time,
                        position_id: position.id.clone(),
                        price: worst_price,
                        reason: CloseReason::Liquidation,
                        realized_pnl: pnl - fee,
                    })?;
                    finished.push(position);
                }
                liquidated = true;
                break 'candles;
            }

            // (b) limit DCA fills: deepest crossed level per position.
            for position in open.iter_mut().filter(|p| p.is_open()) {
                let Some(runtime) = dca_runtimes.get_mut(&position.id) else {
                    continue;
                };
                let crossed = runtime
                    .remaining
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| {
                        let trigger = runtime.anchor_entry_price
                            * (Decimal::ONE + entry.offset_percent / Decimal::from(100));
                        candle.contains_price(trigger)
                    })
                    .max_by_key(|(_, entry)| entry.offset_percent.abs());

                if let Some((idx, entry)) = crossed {
                    let trigger_price = round_to_step(
                        runtime.anchor_entry_price * (Decimal::ONE + entry.offset_percent / Decimal::from(100)),
                        tick_size,
                    );
                    let added_volume = round_to_step(entry.volume_quote / trigger_price, qty_step);
                    runtime.remaining.remove(idx);

                    position.apply_fill(candle.open_time, trigger_price, added_volume);
                    let expected_profit_percent = position.expected_profit_percent.unwrap_or_default();
                    position.update_take_profit(expected_profit_percent);

                    let fee = self.fees.amount(self.fees.maker_percent, trigger_price * added_volume);
                    balance -= fee;

                    sink.append(&Event::DcaFill {
                        time: candle.open_time,
                        position_id: position.id.clone(),
                        price: trigger_price,
                        added_volume,
                    })?;
                }
            }

            // (c) partial-close / breakeven-lock: the strategy names the
            // exact trigger price; the simulator alone decides whether this
            // candle's range actually brackets it.
            for position in open.iter_mut().filter(|p| p.is_open()) {
                let action = self.strategy.update_position(&self.params, &view, position, tick_size);
                match action {
                    PositionAction::BreakevenLock {
                        trigger_price,
                        close_percent,
                    } => {
                        if candle.contains_price(trigger_price) {
                            let fraction = close_percent / Decimal::from(100);
                            let closed_volume = position.volume * fraction;
                            let pnl = position.partial_close(trigger_price, fraction);
                            let fee = self
                                .fees
                                .amount(self.fees.maker_percent, trigger_price * closed_volume);
                            balance += pnl - fee;
                            position.set_stop_loss_price(position.average_entry_price, tick_size);
                            sink.append(&Event::BreakevenLock {
                                time: candle.open_time,
                                position_id: position.id.clone(),
                                stop_loss_price: position.stop_loss_price.unwrap_or_default(),
                            })?;
                            sink.append(&Event::PartialClose {
                                time: candle.open_time,
                                position_id: position.id.clone(),
                                price: trigger_price,
                                closed_volume,
                                realized_pnl: pnl - fee,
                            })?;
                        }
                    }
                    PositionAction::PartialClose {
                        trigger_price,
                        close_percent,
                    } => {
                        if candle.contains_price(trigger_price) {
                            let fraction = close_percent / Decimal::from(100);
                            let closed_volume = position.volume * fraction;
                            let pnl = position.partial_close(trigger_price, fraction);
                            let fee = self
                                .fees
                                .amount(self.fees.maker_percent, trigger_price * closed_volume);
                            balance += pnl - fee;
                            sink.append(&Event::PartialClose {
                                time: candle.open_time,
                                position_id: position.id.clone(),
                                price: trigger_price,
                                closed_volume,
                                realized_pnl: pnl - fee,
                            })?;
                        }
                    }
                    PositionAction::Close | PositionAction::Hold => {}
                }
            }

            // (d)-(f) TP/SL closes, SL-before-TP by default (spec §4.6(d)).
            let mut closed_ids = Vec::new();
            for position in open.iter_mut().filter(|p| p.is_open()) {
                let sl_hit = position
                    .stop_loss_price
                    .is_some_and(|sl| candle.contains_price(sl));
                let tp_hit = position
                    .take_profit_price
                    .is_some_and(|tp| candle.contains_price(tp));

                let close_sl_first = matches!(self.config.fill_priority, FillPriority::SlBeforeTp);
                let do_sl = sl_hit && (close_sl_first || !tp_hit);
                let do_tp = tp_hit && !do_sl;

                if do_sl {
                    let price = position.stop_loss_price.unwrap();
                    let is_bl = position.is_breakeven_lock_executed(tick_size);
                    let reason = if is_bl {
                        CloseReason::BreakevenLock
                    } else {
                        CloseReason::StopLoss
                    };
                    let pnl = position.close(candle.open_time, price, reason);
                    let fee = self.fees.amount(self.fees.taker_percent, price * position.volume);
                    balance += pnl - fee;
                    sink.append(&Event::PositionClose {
                        time: candle.open_time,
                        position_id: position.id.clone(),
                        price,
                        reason,
                        realized_pnl: pnl - fee,
                    })?;
                    closed_ids.push(position.id.clone());
                } else if do_tp {
                    let price = position.take_profit_price.unwrap();
                    let pnl = position.close(candle.open_time, price, CloseReason::TakeProfit);
                    let fee = self.fees.amount(self.fees.maker_percent, price * position.volume);
                    balance += pnl - fee;
                    sink.append(&Event::PositionClose {
                        time: candle.open_time,
                        position_id: position.id.clone(),
                        price,
                        reason: CloseReason::TakeProfit,
                        realized_pnl: pnl - fee,
                    })?;
                    closed_ids.push(position.id.clone());
                }
            }

            if !closed_ids.is_empty() {
                last_close_time = Some(candle.open_time);
                let (closed, still_open): (Vec<_>, Vec<_>) =
                    open.into_iter().partition(|p| closed_ids.contains(&p.id));
                for id in &closed_ids {
                    dca_runtimes.remove(id);
                }
                finished.extend(closed);
                open = still_open;
            }

            // 5. entry step: query the strategy when no position of that
            // direction is open (or two-way mode allows a second), subject
            // to cooldown.
            let cooldown_elapsed = last_close_time
                .map(|t| candle.open_time - t >= self.config.cooldown_seconds)
                .unwrap_or(true);

            if cooldown_elapsed && view.candles().len() >= 1 {
                let has_long = open.iter().any(|p| p.direction == Direction::Long);
                let has_short = open.iter().any(|p| p.direction == Direction::Short);

                let can_long = !has_long && (self.config.two_way || !has_short);
                let can_short = !has_short && (self.config.two_way || !has_long);

                if can_long && self.strategy.should_long(&self.params, &view) {
                    self.open_new_position(
                        Direction::Long,
                        candle,
                        &view,
                        &mut balance,
                        &mut open,
                        &mut dca_runtimes,
                        &mut next_id,
                        sink,
                    )?;
                } else if can_short && self.strategy.should_short(&self.params, &view) {
                    self.open_new_position(
                        Direction::Short,
                        candle,
                        &view,
                        &mut balance,
                        &mut open,
                        &mut dca_runtimes,
                        &mut next_id,
                        sink,
                    )?;
                }
            }

            // 6. bookkeeping. Drawdown tracks the worst intra-candle mark
            // per open position (low for LONG, high for SHORT), matching
            // the liquidation check above rather than only the close.
            let unrealized_worst: Decimal = open
                .iter()
                .map(|p| {
                    let worst_price = match p.direction {
                        Direction::Long => candle.low,
                        Direction::Short => candle.high,
                    };
                    p.unrealized_pnl(worst_price)
                })
                .sum();
            if unrealized_worst < max_unrealized_drawdown {
                max_unrealized_drawdown = unrealized_worst;
            }

            if balance != last_emitted_balance {
                sink.append(&Event::Balance {
                    time: candle.open_time,
                    balance,
                })?;
                last_emitted_balance = balance;
            }

            let should_sample = last_balance_sample
                .map(|t| candle.open_time - t >= self.config.balance_sample_interval_seconds)
                .unwrap_or(true);
            if should_sample {
                last_balance_sample = Some(candle.open_time);
                balance_history.push(BalanceSample {
                    time: candle.open_time,
                    balance,
                });
            }

            if self.config.progress_emit_interval_candles > 0
                && index as u64 % self.config.progress_emit_interval_candles == 0
            {
                sink.append(&Event::Progress {
                    time: candle.open_time,
                    candles_processed: index as u64 + 1,
                    candles_total: candles.len() as u64,
                })?;
            }

            debug!(time = candle.open_time, balance = %balance, open = open.len(), "candle processed");
        }

        let coin_price_start = candles.first().map(|c| c.close).unwrap_or_default();
        let coin_price_end = candles.last().map(|c| c.close).unwrap_or_default();

        let financial = financial_stats(
            self.initial_balance,
            balance,
            max_unrealized_drawdown,
            coin_price_start,
            coin_price_end,
        );

        let mut all_positions = finished.clone();
        all_positions.extend(open.iter().cloned());
        let trades = trade_stats(&all_positions, sim_start, sim_end);
        let risk = risk_stats(&finished, self.initial_balance, sim_start, sim_end);

        let open_positions: Vec<OpenPositionSummary> = open
            .iter()
            .map(|p| OpenPositionSummary {
                direction: p.direction,
                entry_price: p.average_entry_price,
                volume: p.volume,
                created_at: p.created_at,
                unrealized_pnl: p.unrealized_pnl(coin_price_end),
                time_hanging_seconds: sim_end - p.created_at,
            })
            .collect();
        debug!(open_positions = open_positions.len(), "run complete");

        let record = ResultRecord {
            exchange_name: self.pair.exchange_name.clone(),
            ticker: self.pair.ticker.clone(),
            market_type: self.pair.market_type,
            timeframe: self.pair.timeframe.to_string(),
            strategy_name: self.strategy.name().to_string(),
            strategy_display_name: self.strategy.display_name(),
            strategy_params: self.pair.strategy_params.clone(),
            run_started_at: sim_start,
            run_ended_at: sim_end,
            created_at: 0,
            initial_balance: self.initial_balance,
            final_balance: balance,
            liquidated,
            financial,
            trades,
            risk,
            open_positions,
            balance_history,
            warnings: Vec::new(),
        };

        sink.append(&Event::Result {
            record: Box::new(record.clone()),
        })?;
        sink.append(&Event::Done)?;
        sink.flush()?;

        info!(
            final_balance = %balance,
            liquidated,
            trades_finished = record.trades.finished,
            "backtest run finished"
        );

        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_new_position(
        &mut self,
        direction: Direction,
        candle: &Candle,
        view: &MarketView,
        balance: &mut Decimal,
        open: &mut Vec<Position>,
        dca_runtimes: &mut HashMap<String, DcaRuntime>,
        next_id: &mut u64,
        sink: &mut dyn Sink,
    ) -> Result<(), BacktestError> {
        let tick_size = self.exchange.tick_size();
        let qty_step = self.exchange.qty_step();

        let context = TradingContext {
            balance: *balance,
            margin: *balance / self.exchange.leverage().max(Decimal::ONE),
            current_price: candle.close,
        };

        let volume_quote = self.strategy.entry_volume(&self.params, view, direction, context);
        if volume_quote <= Decimal::ZERO {
            return Ok(());
        }

        let fill_price = self.exchange.open_position(Decimal::ZERO);
        let volume_base = round_to_step(volume_quote / fill_price, qty_step);
        if volume_base <= Decimal::ZERO {
            return Ok(());
        }

        *next_id += 1;
        let id = format!("{}-{}", self.pair.ticker, next_id);
        let mut position = Position::new_pending(id.clone(), direction, candle.open_time);
        position.apply_fill(candle.open_time, fill_price, volume_base);

        let fee = self.fees.amount(self.fees.taker_percent, fill_price * volume_base);
        *balance -= fee;

        let (sl, tp, expected_profit_percent) = self
            .strategy
            .initial_stop_loss_and_take_profit(&self.params, direction, fill_price);
        if let Some(sl) = sl {
            position.set_stop_loss_price(sl, tick_size);
        }
        position.take_profit_price = tp;
        position.expected_profit_percent = expected_profit_percent;

        sink.append(&Event::PositionOpen {
            time: candle.open_time,
            position_id: id.clone(),
            direction,
            price: fill_price,
            volume: volume_base,
        })?;

        if let Some(grid) = self.strategy.dca_grid(&self.params) {
            let order_map = grid.build_order_map(direction, context);
            let mut remaining: Vec<OrderMapEntry> = order_map.into_iter().skip(1).collect();
            remaining.sort_by(|a, b| b.offset_percent.abs().cmp(&a.offset_percent.abs()));
            dca_runtimes.insert(
                id.clone(),
                DcaRuntime {
                    anchor_entry_price: fill_price,
                    remaining,
                },
            );
        }

        open.push(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backtest::strategies::{RsiDcaGridStrategy, RsiSingleEntryStrategy};
    use crate::domain::backtest::event::MemorySink;
    use crate::domain::backtest::exchange::SimulatedExchange;
    use crate::domain::backtest::pair::{MarketType, PairDescriptor};
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn candle(t: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(
            t,
            Decimal::try_from(o).unwrap(),
            Decimal::try_from(h).unwrap(),
            Decimal::try_from(l).unwrap(),
            Decimal::try_from(c).unwrap(),
            dec!(1),
        )
        .unwrap()
    }

    fn pair() -> PairDescriptor {
        PairDescriptor::new(
            "binance",
            "BTCUSDT",
            MarketType::Futures,
            Timeframe::OneMin,
            "BTC",
            "USDT",
            "test",
            StrategyParams::new(),
        )
    }

    fn zero_fee_exchange() -> SimulatedExchange {
        SimulatedExchange::new(MarketType::Futures, dec!(0.01), dec!(0.001), dec!(10), dec!(0), dec!(0))
    }

    /// A strategy that always enters long on the very first candle it sees,
    /// with a fixed TP/SL, and never again — used to exercise the
    /// simulator's fill mechanics deterministically without depending on an
    /// indicator warming up (spec §8 end-to-end scenarios 1-3).
    struct AlwaysLongOnce {
        take_profit_percent: Decimal,
        stop_loss_percent: Decimal,
        breakeven_lock: bool,
    }

    impl Strategy for AlwaysLongOnce {
        fn name(&self) -> &'static str {
            "always_long_once"
        }
        fn parameters(&self) -> Vec<crate::domain::backtest::parameters::ParameterDescriptor> {
            Vec::new()
        }
        fn validate(
            &self,
            _params: &StrategyParams,
            _settings: &crate::domain::backtest::strategy::ExchangeSettings,
        ) -> Result<Vec<crate::domain::backtest::errors::ValidationWarning>, crate::domain::backtest::errors::ValidationError>
        {
            Ok(Vec::new())
        }
        fn should_long(&self, _params: &StrategyParams, view: &MarketView) -> bool {
            view.candles().len() == 1
        }
        fn should_short(&self, _params: &StrategyParams, _view: &MarketView) -> bool {
            false
        }
        fn entry_volume(
            &self,
            _params: &StrategyParams,
            _view: &MarketView,
            _direction: Direction,
            _context: TradingContext,
        ) -> Decimal {
            dec!(100)
        }
        fn initial_stop_loss_and_take_profit(
            &self,
            _params: &StrategyParams,
            direction: Direction,
            entry_price: Decimal,
        ) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>) {
            use crate::domain::backtest::money::{PercentDirection, percent_modify};
            let tp = percent_modify(entry_price, self.take_profit_percent, direction, PercentDirection::Profit);
            let sl = percent_modify(entry_price, self.stop_loss_percent, direction, PercentDirection::Loss);
            (Some(sl), Some(tp), Some(self.take_profit_percent))
        }
        fn update_position(
            &self,
            _params: &StrategyParams,
            _view: &MarketView,
            position: &Position,
            tick_size: Decimal,
        ) -> PositionAction {
            if !self.breakeven_lock || position.is_breakeven_lock_executed(tick_size) {
                return PositionAction::Hold;
            }
            let entry = position.average_entry_price;
            let tp = match position.take_profit_price {
                Some(tp) => tp,
                None => return PositionAction::Hold,
            };
            PositionAction::BreakevenLock {
                trigger_price: entry + (tp - entry) * dec!(0.5),
                close_percent: dec!(50),
            }
        }
    }

    #[test]
    fn tp_hit_single_entry_matches_spec_scenario_1() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 110.0, 99.0, 108.0),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(5),
            stop_loss_percent: dec!(5),
            breakeven_lock: false,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();

        assert_eq!(record.final_balance, dec!(1005));
        assert_eq!(record.financial.pnl, dec!(5));
        assert_eq!(record.trades.wins, 1);
        assert_eq!(record.trades.finished, 1);
    }

    #[test]
    fn sl_hit_single_entry_matches_spec_scenario_2() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 101.0, 90.0, 92.0),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(5),
            stop_loss_percent: dec!(5),
            breakeven_lock: false,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();

        assert_eq!(record.final_balance, dec!(995));
        assert_eq!(record.financial.pnl, dec!(-5));
        assert_eq!(record.trades.losses, 1);
    }

    #[test]
    fn sl_before_tp_when_candle_brackets_both() {
        // LONG entered at 100, TP 108, SL 92; a later candle's [low,high]
        // brackets both. SL-first policy closes at 92 with reason sl
        // (spec §8 boundary behaviour).
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 110.0, 90.0, 95.0),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(8),
            stop_loss_percent: dec!(8),
            breakeven_lock: false,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        assert_eq!(record.trades.losses, 1);
        assert_eq!(record.trades.wins, 0);
    }

    #[test]
    fn breakeven_lock_executes_then_stops_out_at_entry() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 103.0, 99.0, 102.0),
            candle(120, 101.0, 102.0, 98.0, 99.5),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(5),
            stop_loss_percent: dec!(5),
            breakeven_lock: true,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();

        assert_eq!(record.trades.breakeven_locks, 1);
        assert!(record.financial.pnl > Decimal::ZERO);
    }

    #[test]
    fn empty_candle_stream_yields_zero_trade_result() {
        let strategy = RsiSingleEntryStrategy;
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule::default_for(MarketType::Futures),
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&[], &mut sink).unwrap();

        assert_eq!(record.trades.finished, 0);
        assert_eq!(record.final_balance, dec!(1000));
        assert!(record.risk.sharpe.is_none());
        assert!(matches!(sink.events.last(), Some(Event::Done)));
    }

    #[test]
    fn rejects_non_monotonic_candles() {
        let candles = vec![candle(60, 100.0, 101.0, 99.0, 100.0), candle(0, 100.0, 101.0, 99.0, 100.0)];
        let strategy = RsiSingleEntryStrategy;
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule::default_for(MarketType::Futures),
        );
        let mut sink = MemorySink::new();
        assert!(sim.run(&candles, &mut sink).is_err());
    }

    #[test]
    fn liquidation_closes_all_positions_and_stops_the_run() {
        // 50 balance, one unit long at ~100; a crash to 1 drives equity
        // negative before the stop-loss check ever runs.
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 101.0, 1.0, 50.0),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(500),
            stop_loss_percent: dec!(99),
            breakeven_lock: false,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(50),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        assert!(matches!(sink.events.last(), Some(Event::Done)));
        assert!(record.final_balance < Decimal::ZERO);
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, Event::PositionClose { reason: CloseReason::Liquidation, .. })));
    }

    #[test]
    fn dca_strategy_builds_and_runs_without_panicking() {
        let mut params = StrategyParams::new();
        params.insert("numberOfLevels".into(), "3".into());
        params.insert("initialEntryVolume".into(), "100".into());
        params.insert("volumeMultiplier".into(), "2".into());
        params.insert("priceDeviation".into(), "10".into());
        params.insert("deviationMultiplier".into(), "1".into());
        params.insert("offsetMode".into(), "from_previous".into());
        params.insert("rsiOversold".into(), "99".into()); // force should_long true immediately once RSI computable

        let mut candles = Vec::new();
        // Walk price down from 100 to 81 then back up, RSI period default 14
        // needs >=15 candles before it can fire; keep price flat then drop.
        let mut t = 0i64;
        for _ in 0..20 {
            candles.push(candle(t, 100.0, 100.5, 99.5, 100.0));
            t += 60;
        }
        for i in 0..15 {
            let p = 100.0 - i as f64 * 1.5;
            candles.push(candle(t, p, p + 0.5, p - 0.5, p));
            t += 60;
        }
        for i in 0..10 {
            let p = 79.0 + i as f64 * 2.0;
            candles.push(candle(t, p, p + 0.5, p - 0.5, p));
            t += 60;
        }

        let strategy = RsiDcaGridStrategy;
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            params,
            pair(),
            dec!(10000),
            FeeSchedule::default_for(MarketType::Futures),
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        assert!(matches!(sink.events.last(), Some(Event::Done)));
        assert!(record.trades.finished + record.trades.open + record.trades.pending >= 0);
    }

    #[test]
    fn idle_time_matches_spec_scenario_6() {
        // Exercises the same trade_stats/idle_time_seconds path the
        // simulator folds its run into, with two positions a 300s window
        // and a 180s idle gap between and after them.
        let mut p1 = Position::new_pending("p1", Direction::Long, 0);
        p1.apply_fill(0, dec!(100), dec!(1));
        p1.close(60, dec!(101), CloseReason::TakeProfit);
        let mut p2 = Position::new_pending("p2", Direction::Long, 120);
        p2.apply_fill(120, dec!(100), dec!(1));
        p2.close(180, dec!(101), CloseReason::TakeProfit);
        let stats = trade_stats(&[p1, p2], 0, 300);
        assert_eq!(stats.idle_seconds, 180);
    }

    #[test]
    fn zero_progress_cadence_never_panics_and_never_emits_progress() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 101.0, 99.0, 100.0),
            candle(120, 100.0, 101.0, 99.0, 100.0),
        ];
        let strategy = RsiSingleEntryStrategy;
        let mut config = SimulatorConfig::default();
        config.progress_emit_interval_candles = 0;
        let mut sim = Simulator::new(
            config,
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule::default_for(MarketType::Futures),
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        assert_eq!(record.trades.finished, 0);
        assert!(!sink.events.iter().any(|e| matches!(e, Event::Progress { .. })));
    }

    #[test]
    fn balance_history_is_sampled_and_surfaced_on_the_result_record() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 101.0, 99.0, 100.0),
            candle(120, 100.0, 101.0, 99.0, 100.0),
        ];
        let strategy = RsiSingleEntryStrategy;
        let mut config = SimulatorConfig::default();
        config.balance_sample_interval_seconds = 60;
        let mut sim = Simulator::new(
            config,
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule::default_for(MarketType::Futures),
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        assert_eq!(record.balance_history.len(), 3);
        assert_eq!(record.balance_history[0].time, 0);
        assert_eq!(record.balance_history[1].time, 60);
        assert_eq!(record.balance_history[2].time, 120);
    }

    #[test]
    fn drawdown_uses_intra_candle_worst_price_not_just_close() {
        // LONG entered at 100; the next candle closes flat at 100 but dips
        // to 80 intra-candle. max_drawdown must reflect the 80 low, not the
        // unchanged close (spec §4.7: "most negative unrealized excursion
        // observed during the run").
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(60, 100.0, 101.0, 80.0, 100.0),
        ];
        let strategy = AlwaysLongOnce {
            take_profit_percent: dec!(500),
            stop_loss_percent: dec!(99),
            breakeven_lock: false,
        };
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            zero_fee_exchange(),
            Box::new(strategy),
            StrategyParams::new(),
            pair(),
            dec!(1000),
            FeeSchedule {
                taker_percent: Decimal::ZERO,
                maker_percent: Decimal::ZERO,
            },
        );
        let mut sink = MemorySink::new();
        let record = sim.run(&candles, &mut sink).unwrap();
        // 1 base unit long from 100, marked at the candle's 80 low: -20.
        assert_eq!(record.financial.max_drawdown, dec!(-20));
    }
}
