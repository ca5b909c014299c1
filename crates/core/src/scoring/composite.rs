use crate::domain::instrument::Instrument;
use crate::scoring::normalize;
use crate::scoring::weights::WeightVector;
use serde::{Deserialize, Serialize};

/// Sub-scores for one instrument, each in `[0, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub stability: f64,
    pub valuation: f64,
    pub liquidity: f64,
    pub technical: f64,
    pub recent_return: f64,
    pub dividend: f64,
    pub growth: f64,
    pub sentiment: f64,
}

impl SubScores {
    pub fn weighted(&self, w: &WeightVector) -> f64 {
        w.stability * self.stability
            + w.recent_return * self.recent_return
            + w.growth * self.growth
            + w.valuation * self.valuation
            + w.dividend * self.dividend
            + w.sentiment * self.sentiment
            + w.liquidity * self.liquidity
            + w.technical * self.technical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredInstrument {
    pub instrument: Instrument,
    pub sub_scores: SubScores,
    pub composite_score: f64,
}

/// Score a whole batch for one risk profile.
///
/// Return, dividend and growth are rescaled against this batch, so the same
/// instrument can score differently in a different batch. Output is sorted by
/// composite score descending, ticker ascending on ties.
pub fn score_candidates(
    instruments: &[Instrument],
    risk_tolerance: f64,
) -> (WeightVector, Vec<ScoredInstrument>) {
    let weights = WeightVector::for_risk_tolerance(risk_tolerance);

    let column = |f: fn(&Instrument) -> f64| -> Vec<f64> { instruments.iter().map(f).collect() };
    let returns = normalize::rescale_batch(&column(|i| i.metrics.recent_return_pct));
    let dividends = normalize::rescale_batch(&column(|i| i.metrics.dividend_yield_pct));
    let growths = normalize::rescale_batch(&column(|i| i.metrics.growth_rate_pct));

    let mut out = Vec::with_capacity(instruments.len());
    for (idx, instrument) in instruments.iter().enumerate() {
        warn_unrecognized(instrument);

        let m = &instrument.metrics;
        let sub_scores = SubScores {
            stability: normalize::stability_score(m.volatility, m.market_cap),
            valuation: normalize::valuation_score(m.pe_ratio),
            liquidity: normalize::liquidity_score(m.liquidity),
            technical: normalize::technical_score(m.rsi),
            recent_return: returns[idx],
            dividend: dividends[idx],
            growth: growths[idx],
            sentiment: normalize::sentiment_score(m.news_sentiment),
        };

        out.push(ScoredInstrument {
            instrument: instrument.clone(),
            composite_score: sub_scores.weighted(&weights),
            sub_scores,
        });
    }

    out.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.instrument.ticker.cmp(&b.instrument.ticker))
    });

    (weights, out)
}

fn warn_unrecognized(instrument: &Instrument) {
    let m = &instrument.metrics;
    if !m.volatility.is_recognized() {
        tracing::warn!(ticker = %instrument.ticker, "unrecognized volatility category; scoring as 0");
    }
    if !m.market_cap.is_recognized() {
        tracing::warn!(ticker = %instrument.ticker, "unrecognized market cap category; scoring as 0");
    }
    if !m.liquidity.is_recognized() {
        tracing::warn!(ticker = %instrument.ticker, "unrecognized liquidity category; scoring as 0");
    }
}
