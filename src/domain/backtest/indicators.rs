//! Pure, stateless indicator functions over close-price series.
//!
//! Every function aligns its output so that index `i` corresponds to the
//! `i + (period - 1)`-th input price; warmup bars emit nothing rather than
//! a misaligned placeholder.

/// RSI classification against configurable thresholds (defaults 30/70).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiSignal {
    Oversold,
    Neutral,
    Overbought,
}

#[derive(Debug, Clone, Copy)]
pub struct RsiThresholds {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiThresholds {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

/// Wilder's RSI over `period`. Returns `None` if `prices.len() < period + 1`.
pub fn rsi(prices: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let gains: f64 = deltas[..period].iter().map(|d| d.max(0.0)).sum();
    let losses: f64 = deltas[..period].iter().map(|d| (-d).max(0.0)).sum();
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    out.push(rsi_from_averages(avg_gain, avg_loss));

    for &d in &deltas[period..] {
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }

    Some(out)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Classifies each RSI value against `thresholds`.
pub fn rsi_signals(values: &[f64], thresholds: RsiThresholds) -> Vec<RsiSignal> {
    values
        .iter()
        .map(|&v| {
            if v <= thresholds.oversold {
                RsiSignal::Oversold
            } else if v >= thresholds.overbought {
                RsiSignal::Overbought
            } else {
                RsiSignal::Neutral
            }
        })
        .collect()
}

/// EMA seeded at the SMA of the first `period` values, `alpha = 2/(period+1)`
/// afterwards. Returns `None` if `prices.len() < period`.
pub fn ema(prices: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;
    let alpha = 2.0 / (period as f64 + 1.0);

    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &p in &prices[period..] {
        let next = alpha * p + (1.0 - alpha) * prev;
        out.push(next);
        prev = next;
    }

    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands: `middle` is the SMA of the window, `upper`/`lower` are
/// `middle +/- k * population_stddev`. Returns `None` if
/// `prices.len() < period`.
pub fn bollinger_bands(prices: &[f64], period: usize, k: f64) -> Option<Vec<BollingerBand>> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let mut out = Vec::with_capacity(prices.len() - period + 1);
    for window in prices.windows(period) {
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        out.push(BollingerBand {
            upper: mean + k * std_dev,
            middle: mean,
            lower: mean - k * std_dev,
        });
    }
    Some(out)
}

/// ATR: mean of true range over the last `period` bars. Returns 0.0 if
/// inputs are shorter than `period + 1` (spec §4.1 edge case: too-short
/// inputs return zero rather than `None`, since ATR is consumed as a
/// magnitude, not an optional series, by the strategies that use it).
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    if period == 0 || highs.len() < period + 1 || lows.len() != highs.len() || closes.len() != highs.len() {
        return 0.0;
    }

    let n = highs.len();
    let mut true_ranges = Vec::with_capacity(n - 1);
    for i in 1..n {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        true_ranges.push(hl.max(hc).max(lc));
    }

    let window = &true_ranges[true_ranges.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_none_when_too_short() {
        assert!(rsi(&[1.0, 2.0, 3.0], 5).is_none());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let values = rsi(&prices, 14).unwrap();
        assert!((values[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_domain_bounded() {
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        let values = rsi(&prices, 14).unwrap();
        for v in values {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_signal_classification() {
        let signals = rsi_signals(&[10.0, 50.0, 90.0], RsiThresholds::default());
        assert_eq!(signals[0], RsiSignal::Oversold);
        assert_eq!(signals[1], RsiSignal::Neutral);
        assert_eq!(signals[2], RsiSignal::Overbought);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let values = ema(&prices, 3).unwrap();
        assert!((values[0] - 2.0).abs() < 1e-9); // SMA(1,2,3) = 2
    }

    #[test]
    fn ema_none_when_too_short() {
        assert!(ema(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn bollinger_bands_wraps_middle() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let bands = bollinger_bands(&prices, 5, 2.0).unwrap();
        assert_eq!(bands.len(), 1);
        assert!((bands[0].middle - 3.0).abs() < 1e-9);
        assert!(bands[0].upper > bands[0].middle);
        assert!(bands[0].lower < bands[0].middle);
    }

    #[test]
    fn bollinger_bands_none_when_too_short() {
        assert!(bollinger_bands(&[1.0, 2.0], 5, 2.0).is_none());
    }

    #[test]
    fn atr_zero_when_too_short() {
        assert_eq!(atr(&[1.0], &[0.5], &[0.8], 14), 0.0);
    }

    #[test]
    fn atr_computes_mean_true_range() {
        let highs = vec![10.0, 11.0, 10.5, 12.0];
        let lows = vec![9.0, 9.5, 9.8, 10.0];
        let closes = vec![9.5, 10.5, 10.0, 11.5];
        let value = atr(&highs, &lows, &closes, 3);
        assert!(value > 0.0);
    }
}
