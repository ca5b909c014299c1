use crate::domain::instrument::Instrument;
use crate::scoring::composite::{ScoredInstrument, SubScores};
use crate::scoring::trend::trend_score_band;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const COMPOSITE_SHARE: f64 = 0.25;
const PROFITABILITY_SHARE: f64 = 0.50;
const STABILITY_SHARE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendSignal {
    Estimated { percent_change: f64 },
    Unavailable,
}

impl TrendSignal {
    pub fn percent_change(&self) -> Option<f64> {
        match self {
            Self::Estimated { percent_change } => Some(*percent_change),
            Self::Unavailable => None,
        }
    }

    /// Percentage used for ordering; unavailable sorts as neutral.
    pub fn sort_key(&self) -> f64 {
        self.percent_change().unwrap_or(0.0)
    }
}

/// A scored instrument with its trend folded into a final ranking score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub instrument: Instrument,
    pub sub_scores: SubScores,
    pub composite_score: f64,
    pub trend: TrendSignal,
    pub trend_score: f64,
    /// Non-negative part of the trend score.
    pub profitability_score: f64,
    pub final_score: f64,
}

impl RankedCandidate {
    pub fn from_scored(scored: ScoredInstrument, trend: TrendSignal) -> Self {
        let ScoredInstrument {
            instrument,
            sub_scores,
            composite_score,
        } = scored;

        match trend {
            TrendSignal::Estimated { percent_change } => {
                let trend_score = trend_score_band(percent_change);
                let profitability_score = trend_score.max(0.0);
                let final_score = COMPOSITE_SHARE * composite_score
                    + PROFITABILITY_SHARE * profitability_score
                    + STABILITY_SHARE * sub_scores.stability;
                Self {
                    instrument,
                    sub_scores,
                    composite_score,
                    trend,
                    trend_score,
                    profitability_score,
                    final_score,
                }
            }
            TrendSignal::Unavailable => Self::neutral(instrument, sub_scores, composite_score),
        }
    }

    fn neutral(instrument: Instrument, sub_scores: SubScores, composite_score: f64) -> Self {
        Self {
            instrument,
            sub_scores,
            composite_score,
            trend: TrendSignal::Unavailable,
            trend_score: 0.0,
            profitability_score: 0.0,
            final_score: composite_score,
        }
    }

    /// Negative trend or profitability scores exclude a candidate outright.
    pub fn is_eligible(&self) -> bool {
        if self.trend_score.is_nan() || self.trend_score < 0.0 {
            return false;
        }
        if self.profitability_score.is_nan() || self.profitability_score < 0.0 {
            return false;
        }
        match self.trend {
            TrendSignal::Estimated { percent_change } => percent_change > 0.0,
            TrendSignal::Unavailable => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePool {
    pub candidates: Vec<RankedCandidate>,
    /// Set when every candidate failed the trend filter and the pool was rebuilt
    /// from all candidates with their trend ignored.
    pub trend_filter_fallback: bool,
}

/// Attach trends (by ticker) to scored instruments. Missing tickers are `Unavailable`.
pub fn rank_candidates(
    scored: Vec<ScoredInstrument>,
    trends: &BTreeMap<String, TrendSignal>,
) -> Vec<RankedCandidate> {
    scored
        .into_iter()
        .map(|s| {
            let trend = trends
                .get(&s.instrument.ticker)
                .copied()
                .unwrap_or(TrendSignal::Unavailable);
            RankedCandidate::from_scored(s, trend)
        })
        .collect()
}

/// Keep instruments that can buy at least one whole share with the full budget.
pub fn affordable(scored: Vec<ScoredInstrument>, budget: f64) -> Vec<ScoredInstrument> {
    scored
        .into_iter()
        .filter(|s| whole_shares(budget, s.instrument.price) >= 1)
        .collect()
}

pub fn build_candidate_pool(ranked: Vec<RankedCandidate>) -> CandidatePool {
    let (mut eligible, rejected): (Vec<_>, Vec<_>) =
        ranked.into_iter().partition(RankedCandidate::is_eligible);

    let trend_filter_fallback = eligible.is_empty() && !rejected.is_empty();
    if trend_filter_fallback {
        tracing::warn!(
            rejected = rejected.len(),
            "no candidate passed the trend filter; falling back to trend-neutral ranking"
        );
        eligible = rejected
            .into_iter()
            .map(|c| RankedCandidate::neutral(c.instrument, c.sub_scores, c.composite_score))
            .collect();
    }

    sort_by_rank(&mut eligible);
    CandidatePool {
        candidates: eligible,
        trend_filter_fallback,
    }
}

/// Final score desc, then trend desc, then ticker asc.
pub fn sort_by_rank(candidates: &mut [RankedCandidate]) {
    candidates.sort_by(rank_order);
}

pub(crate) fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    cmp_desc(a.final_score, b.final_score)
        .then_with(|| cmp_desc(a.trend.sort_key(), b.trend.sort_key()))
        .then_with(|| a.instrument.ticker.cmp(&b.instrument.ticker))
}

pub(crate) fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

pub(crate) fn whole_shares(amount: f64, price: f64) -> u64 {
    if price.is_nan() || amount.is_nan() || price <= 0.0 || amount <= 0.0 {
        return 0;
    }
    let shares = (amount / price).floor();
    if !shares.is_finite() {
        return 0;
    }
    let mut shares = shares as u64;
    // Float division can round up to the next whole share.
    while shares > 0 && shares as f64 * price > amount {
        shares -= 1;
    }
    shares
}
