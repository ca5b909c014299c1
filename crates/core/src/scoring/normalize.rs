//! Raw metric → sub-score mapping.
//!
//! Every function here returns a value in `[0, 5]`. Ordinal categories go through
//! fixed lookup tables (unrecognized → 0), valuation and RSI through step tables,
//! and continuous metrics through a batch-wide min/max rescale.

use crate::domain::instrument::{LiquidityLevel, MarketCapSize, VolatilityLevel};

/// Score given to every member of a batch whose values show no spread.
pub const NEUTRAL_SCORE: f64 = 3.0;

pub const MAX_SUB_SCORE: f64 = 5.0;

pub fn volatility_score(level: VolatilityLevel) -> f64 {
    match level {
        VolatilityLevel::Low => 5.0,
        VolatilityLevel::Medium => 3.0,
        VolatilityLevel::High => 2.0,
        VolatilityLevel::VeryHigh => 1.0,
        VolatilityLevel::Unrecognized => 0.0,
    }
}

pub fn market_cap_score(size: MarketCapSize) -> f64 {
    match size {
        MarketCapSize::Large => 5.0,
        MarketCapSize::Mid => 3.0,
        MarketCapSize::Small => 1.0,
        MarketCapSize::Unrecognized => 0.0,
    }
}

pub fn liquidity_score(level: LiquidityLevel) -> f64 {
    match level {
        LiquidityLevel::VeryHigh => 5.0,
        LiquidityLevel::High => 4.0,
        LiquidityLevel::Medium => 3.0,
        LiquidityLevel::Low => 2.0,
        LiquidityLevel::VeryLow => 1.0,
        LiquidityLevel::Unrecognized => 0.0,
    }
}

/// Larger, calmer instruments score higher.
pub fn stability_score(volatility: VolatilityLevel, market_cap: MarketCapSize) -> f64 {
    volatility_score(volatility) * 0.6 + market_cap_score(market_cap) * 0.4
}

/// Lower P/E scores higher.
pub fn valuation_score(pe_ratio: f64) -> f64 {
    if pe_ratio <= 10.0 {
        5.0
    } else if pe_ratio <= 15.0 {
        4.5
    } else if pe_ratio <= 20.0 {
        4.0
    } else if pe_ratio <= 25.0 {
        3.0
    } else if pe_ratio <= 35.0 {
        2.0
    } else {
        1.0
    }
}

/// Neutral RSI (40-60) is best; overbought/oversold bands score progressively lower.
pub fn technical_score(rsi: f64) -> f64 {
    if (40.0..=60.0).contains(&rsi) {
        5.0
    } else if (30.0..40.0).contains(&rsi) || (rsi > 60.0 && rsi <= 70.0) {
        4.0
    } else if (20.0..30.0).contains(&rsi) || (rsi > 70.0 && rsi <= 80.0) {
        3.0
    } else {
        2.0
    }
}

/// News sentiment is already on a 1-5 scale; only clamp it.
pub fn sentiment_score(sentiment: f64) -> f64 {
    if sentiment.is_finite() {
        sentiment.clamp(0.0, MAX_SUB_SCORE)
    } else {
        0.0
    }
}

/// Rescale a batch into `[1, 5]` using its own min and max.
///
/// A batch with no spread gets [`NEUTRAL_SCORE`] everywhere.
pub fn rescale_batch(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });

    let spread = max - min;
    if values.is_empty() || !spread.is_finite() || spread <= 0.0 {
        return vec![NEUTRAL_SCORE; values.len()];
    }

    values
        .iter()
        .map(|v| (1.0 + (v - min) / spread * 4.0).clamp(0.0, MAX_SUB_SCORE))
        .collect()
}
