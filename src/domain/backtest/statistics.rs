use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::backtest::position::{CloseReason, Direction, Position, PositionStatus};

/// Trades must clear this threshold before risk ratios are computed at all
/// (spec §4.7, §8 property 8).
pub const MIN_TRADES_FOR_RISK_RATIOS: usize = 5;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FinancialStats {
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
    pub max_drawdown: Decimal,
    pub coin_price_start: Decimal,
    pub coin_price_end: Decimal,
}

pub fn financial_stats(
    initial_balance: Decimal,
    final_balance: Decimal,
    max_unrealized_drawdown: Decimal,
    coin_price_start: Decimal,
    coin_price_end: Decimal,
) -> FinancialStats {
    let pnl = final_balance - initial_balance;
    let pnl_percent = if initial_balance.is_zero() {
        Decimal::ZERO
    } else {
        pnl / initial_balance * Decimal::from(100)
    };
    FinancialStats {
        pnl,
        pnl_percent,
        max_drawdown: max_unrealized_drawdown,
        coin_price_start,
        coin_price_end,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DurationStats {
    pub shortest_seconds: i64,
    pub longest_seconds: i64,
    pub average_seconds: i64,
}

fn position_duration(position: &Position) -> Option<i64> {
    match position.status {
        PositionStatus::Closed { closed_at, .. } => Some(closed_at - position.created_at),
        _ => None,
    }
}

pub fn duration_stats(finished: &[Position]) -> DurationStats {
    let durations: Vec<i64> = finished.iter().filter_map(position_duration).collect();
    if durations.is_empty() {
        return DurationStats::default();
    }
    let shortest = *durations.iter().min().unwrap();
    let longest = *durations.iter().max().unwrap();
    let average = durations.iter().sum::<i64>() / durations.len() as i64;
    DurationStats {
        shortest_seconds: shortest,
        longest_seconds: longest,
        average_seconds: average,
    }
}

/// Total simulation span minus the union of position intervals, clipped to
/// `[sim_start, sim_end]` (spec §4.7 / §8 property 3).
pub fn idle_time_seconds(
    intervals: &[(i64, i64)],
    sim_start: i64,
    sim_end: i64,
) -> i64 {
    if sim_end <= sim_start {
        return 0;
    }

    let mut clipped: Vec<(i64, i64)> = intervals
        .iter()
        .filter_map(|&(start, end)| {
            let clipped_start = start.max(sim_start);
            let clipped_end = end.min(sim_end);
            if clipped_end > clipped_start {
                Some((clipped_start, clipped_end))
            } else {
                None
            }
        })
        .collect();

    clipped.sort_by_key(|&(start, _)| start);

    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(clipped.len());
    for (start, end) in clipped.drain(..) {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    let covered: i64 = merged.iter().map(|(start, end)| end - start).sum();
    (sim_end - sim_start) - covered
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DirectionStats {
    pub finished: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven_locks: usize,
    pub duration: DurationStats,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub finished: usize,
    pub open: usize,
    pub pending: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven_locks: usize,
    pub duration: DurationStats,
    pub idle_seconds: i64,
    pub long: DirectionStats,
    pub short: DirectionStats,
}

pub fn trade_stats(
    all_positions: &[Position],
    sim_start: i64,
    sim_end: i64,
) -> TradeStats {
    let finished: Vec<Position> = all_positions
        .iter()
        .filter(|p| p.is_closed())
        .cloned()
        .collect();
    let open = all_positions.iter().filter(|p| p.is_open()).count();
    let pending = all_positions
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Pending))
        .count();

    let wins = finished
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::TakeProfit, .. }))
        .count();
    let losses = finished
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::StopLoss, .. }))
        .count();
    let breakeven_locks = finished
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::BreakevenLock, .. }))
        .count();

    let intervals: Vec<(i64, i64)> = all_positions
        .iter()
        .filter_map(|p| match p.status {
            PositionStatus::Closed { closed_at, .. } => Some((p.created_at, closed_at)),
            PositionStatus::Open => Some((p.created_at, sim_end)),
            PositionStatus::Pending => None,
        })
        .collect();
    let idle_seconds = idle_time_seconds(&intervals, sim_start, sim_end);

    let long: Vec<Position> = finished
        .iter()
        .filter(|p| p.direction == Direction::Long)
        .cloned()
        .collect();
    let short: Vec<Position> = finished
        .iter()
        .filter(|p| p.direction == Direction::Short)
        .cloned()
        .collect();

    TradeStats {
        finished: finished.len(),
        open,
        pending,
        wins,
        losses,
        breakeven_locks,
        duration: duration_stats(&finished),
        idle_seconds,
        long: direction_stats(&long),
        short: direction_stats(&short),
    }
}

fn direction_stats(positions: &[Position]) -> DirectionStats {
    let wins = positions
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::TakeProfit, .. }))
        .count();
    let losses = positions
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::StopLoss, .. }))
        .count();
    let breakeven_locks = positions
        .iter()
        .filter(|p| matches!(p.status, PositionStatus::Closed { reason: CloseReason::BreakevenLock, .. }))
        .count();
    DirectionStats {
        finished: positions.len(),
        wins,
        losses,
        breakeven_locks,
        duration: duration_stats(positions),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskStats {
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub avg_return: Option<f64>,
    pub std_deviation: Option<f64>,
}

/// Sharpe/Sortino over finished-position returns, spec §4.7. Returns all
/// `None` below `MIN_TRADES_FOR_RISK_RATIOS` trades or when
/// `initial_balance <= 0`; non-finite intermediate results are replaced
/// with `None` rather than surfaced.
pub fn risk_stats(
    finished: &[Position],
    initial_balance: Decimal,
    sim_start: i64,
    sim_end: i64,
) -> RiskStats {
    if finished.len() < MIN_TRADES_FOR_RISK_RATIOS || initial_balance <= Decimal::ZERO {
        return RiskStats::default();
    }

    let returns: Vec<f64> = finished
        .iter()
        .map(|p| crate::domain::backtest::money::decimal_to_f64(p.realized_pnl / initial_balance))
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let downside_variance = returns
        .iter()
        .map(|r| (r - mean).min(0.0).powi(2))
        .sum::<f64>()
        / n;
    let downside_std = downside_variance.sqrt();

    let duration_days = ((sim_end - sim_start).max(0) as f64) / 86_400.0;
    let total_trades = finished.len() as f64;
    let trades_per_year = if duration_days > 0.0 {
        total_trades / duration_days * 365.0
    } else {
        total_trades
    };
    let annualisation = trades_per_year.sqrt();

    let sharpe = if std_dev > 0.0 {
        finite_or_none(mean / std_dev * annualisation)
    } else {
        None
    };
    let sortino = if downside_std > 0.0 {
        finite_or_none(mean / downside_std * annualisation)
    } else {
        None
    };

    RiskStats {
        sharpe,
        sortino,
        avg_return: finite_or_none(mean),
        std_deviation: finite_or_none(std_dev),
    }
}

fn finite_or_none(value: f64) -> Option<f64> {
    if value.is_finite() { Some(value) } else { None }
}
