//! Bounded forward price-change heuristic.
//!
//! This is a moving-average trend extrapolation with hard clipping, not a
//! statistical forecast: there are no confidence intervals and the output should
//! be presented as a rough directional hint only.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_OBSERVATIONS: usize = 20;
pub const HORIZON: usize = 30;

const SHORT_WINDOW: usize = 5;
const LONG_WINDOW: usize = 20;
const RETURN_WINDOW: usize = 30;
const TREND_SIGNAL_WEIGHT: f64 = 0.3;
const MAX_DAILY_RETURN: f64 = 0.015;
const DECAY_FACTOR: f64 = 0.7;
const MAX_HORIZON_RETURN: f64 = 0.25;
const MIN_PRICE_RATIO: f64 = 0.5;
const MAX_PRICE_RATIO: f64 = 2.0;

pub const RSI_PERIOD: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEstimate {
    /// Projected change over [`HORIZON`] periods, in percent, within ±25.
    pub percent_change: f64,
    pub last_price: f64,
    pub predicted_price: f64,
    pub trend_signal: f64,
    pub daily_expected_return: f64,
    pub average_daily_return: f64,
    pub daily_volatility: f64,
    /// Linear path from the last price to the predicted price, for charting.
    pub path: Vec<f64>,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendError {
    InsufficientHistory { observations: usize },
}

impl fmt::Display for TrendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { observations } => write!(
                f,
                "insufficient price history: {observations} observations (need at least {MIN_OBSERVATIONS})"
            ),
        }
    }
}

impl std::error::Error for TrendError {}

/// Estimate the forward price change from chronologically ordered closing prices.
pub fn estimate_trend(prices: &[f64]) -> Result<TrendEstimate, TrendError> {
    let n = prices.len();
    if n < MIN_OBSERVATIONS {
        return Err(TrendError::InsufficientHistory { observations: n });
    }

    let last_price = prices[n - 1];
    let short_ma = mean(&prices[n - SHORT_WINDOW..]);
    let long_ma = mean(&prices[n - LONG_WINDOW..]);

    let trend_signal = if long_ma > 0.0 {
        finite_or_zero((short_ma - long_ma) / long_ma)
    } else {
        0.0
    };

    // Up to the last 30 observations; shorter histories use all but the first.
    let window = if n >= RETURN_WINDOW {
        &prices[n - RETURN_WINDOW..]
    } else {
        &prices[1..]
    };
    let returns = daily_returns(window);
    let average_daily_return = finite_or_zero(mean(&returns));
    let daily_volatility = finite_or_zero(sample_std(&returns));

    let daily_expected_return = (average_daily_return + TREND_SIGNAL_WEIGHT * trend_signal)
        .clamp(-MAX_DAILY_RETURN, MAX_DAILY_RETURN);
    let horizon_return = (daily_expected_return * HORIZON as f64 * DECAY_FACTOR)
        .clamp(-MAX_HORIZON_RETURN, MAX_HORIZON_RETURN);

    let (predicted_price, percent_change) = if last_price.is_finite() && last_price > 0.0 {
        let predicted = (last_price * (1.0 + horizon_return))
            .clamp(last_price * MIN_PRICE_RATIO, last_price * MAX_PRICE_RATIO);
        (predicted, (predicted - last_price) / last_price * 100.0)
    } else {
        (last_price, horizon_return * 100.0)
    };
    let percent_change = finite_or_zero(percent_change)
        .clamp(-MAX_HORIZON_RETURN * 100.0, MAX_HORIZON_RETURN * 100.0);

    Ok(TrendEstimate {
        percent_change,
        last_price,
        predicted_price,
        trend_signal,
        daily_expected_return,
        average_daily_return,
        daily_volatility,
        path: linear_path(last_price, predicted_price, HORIZON),
        rsi: relative_strength_index(prices, RSI_PERIOD),
    })
}

/// Discrete score for a projected change. Non-positive projections get a
/// strong penalty that excludes the instrument from selection.
pub fn trend_score_band(percent_change: f64) -> f64 {
    if percent_change > 15.0 {
        5.0
    } else if percent_change > 10.0 {
        4.0
    } else if percent_change > 5.0 {
        3.0
    } else if percent_change > 2.0 {
        2.0
    } else if percent_change > 0.0 {
        1.0
    } else {
        -10.0
    }
}

/// Simple-average RSI over the last `period` price changes.
pub fn relative_strength_index(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let tail = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in tail.windows(2) {
        let change = pair[1] - pair[0];
        if !change.is_finite() {
            continue;
        }
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|pair| pair[0].is_finite() && pair[0] > 0.0 && pair[1].is_finite())
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect()
}

fn linear_path(from: f64, to: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![to],
        _ => {
            let step = (to - from) / (points - 1) as f64;
            (0..points)
                .map(|i| if i == points - 1 { to } else { from + step * i as f64 })
                .collect()
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_short_history() {
        let prices = vec![100.0; 19];
        assert_eq!(
            estimate_trend(&prices),
            Err(TrendError::InsufficientHistory { observations: 19 })
        );
    }

    #[test]
    fn flat_series_has_no_trend() {
        let prices = vec![50_000.0; 60];
        let est = estimate_trend(&prices).unwrap();
        assert_eq!(est.percent_change, 0.0);
        assert_eq!(est.predicted_price, 50_000.0);
        assert_eq!(est.daily_volatility, 0.0);
        assert_eq!(est.path.len(), HORIZON);
        assert!(est.path.iter().all(|p| *p == 50_000.0));
        assert_eq!(est.rsi, Some(50.0));
    }

    #[test]
    fn steady_uptrend_is_capped() {
        // +2% a day: daily expectation clips at 1.5%, horizon = 1.5% * 30 * 0.7 = 31.5% → 25%.
        let prices: Vec<f64> = (0..40).map(|i| 100.0 * 1.02f64.powi(i)).collect();
        let est = estimate_trend(&prices).unwrap();
        assert!((est.daily_expected_return - 0.015).abs() < 1e-12);
        assert!((est.percent_change - 25.0).abs() < 1e-9);
        assert_eq!(est.rsi, Some(100.0));
        let last = *prices.last().unwrap();
        assert!((est.path[0] - last).abs() < 1e-9);
        assert!((est.path[HORIZON - 1] - est.predicted_price).abs() < 1e-9);
    }

    #[test]
    fn gentle_downtrend_is_negative() {
        let prices: Vec<f64> = (0..25).map(|i| 1_000.0 - i as f64).collect();
        let est = estimate_trend(&prices).unwrap();
        assert!(est.percent_change < 0.0);
        assert!(est.percent_change >= -25.0);
        assert!(est.trend_signal < 0.0);
    }

    #[test]
    fn zero_prices_do_not_produce_nan() {
        let mut prices = vec![0.0; 25];
        prices[24] = 10.0;
        let est = estimate_trend(&prices).unwrap();
        assert!(est.percent_change.is_finite());
        assert!(est.percent_change.abs() <= 25.0);
    }

    #[test]
    fn score_bands() {
        assert_eq!(trend_score_band(20.0), 5.0);
        assert_eq!(trend_score_band(12.0), 4.0);
        assert_eq!(trend_score_band(7.0), 3.0);
        assert_eq!(trend_score_band(3.0), 2.0);
        assert_eq!(trend_score_band(0.5), 1.0);
        assert_eq!(trend_score_band(0.0), -10.0);
        assert_eq!(trend_score_band(-4.0), -10.0);
    }

    #[test]
    fn rsi_needs_period_plus_one_prices() {
        assert_eq!(relative_strength_index(&[1.0; 14], 14), None);
        let mut prices = vec![10.0; 15];
        prices[14] = 9.0;
        assert_eq!(relative_strength_index(&prices, 14), Some(0.0));
    }

    proptest! {
        #[test]
        fn estimate_is_always_bounded(prices in prop::collection::vec(0.0f64..1_000_000.0, 20..120)) {
            let est = estimate_trend(&prices).unwrap();
            prop_assert!(est.percent_change.is_finite());
            prop_assert!(est.percent_change >= -25.0 && est.percent_change <= 25.0);
            prop_assert_eq!(est.path.len(), HORIZON);
        }

        #[test]
        fn positive_series_predictions_stay_within_price_bounds(
            prices in prop::collection::vec(1.0f64..1_000_000.0, 20..120)
        ) {
            let est = estimate_trend(&prices).unwrap();
            let last = *prices.last().unwrap();
            prop_assert!(est.predicted_price >= last * 0.5 - 1e-9);
            prop_assert!(est.predicted_price <= last * 2.0 + 1e-9);
        }
    }
}
