use crate::budget::{AssetAllocation, RiskProfile};
use crate::domain::analysis::InstrumentAnalysis;
use crate::domain::contract::{validate_batch, InstrumentRecord};
use crate::news::{news_links, ArticleLink};
use crate::scoring::composite::score_candidates;
use crate::scoring::trend::{estimate_trend, TrendEstimate};
use crate::scoring::weights::WeightVector;
use crate::selection::candidates::{affordable, build_candidate_pool, rank_candidates, TrendSignal};
use crate::selection::selector::{select_portfolio, PortfolioEntry, DEFAULT_TARGET_COUNT};
use crate::selection::summary::PortfolioSummary;
use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SelectionOptions {
    pub target_count: usize,

    /// How many top-scored instruments get a price history fetched for trend estimation.
    pub trend_lookahead: usize,

    pub history_period_days: u32,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
            trend_lookahead: 30,
            history_period_days: 90,
        }
    }
}

impl SelectionOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("PORTFOLIO_TARGET_COUNT") {
            if let Ok(n) = s.parse::<usize>() {
                out.target_count = n.max(1);
            }
        }

        if let Ok(s) = std::env::var("TREND_LOOKAHEAD") {
            if let Ok(n) = s.parse::<usize>() {
                out.trend_lookahead = n;
            }
        }

        if let Ok(s) = std::env::var("HISTORY_PERIOD_DAYS") {
            if let Ok(n) = s.parse::<u32>() {
                out.history_period_days = n;
            }
        }

        out
    }
}

/// Where the investable budget comes from: an explicit amount, or a monthly
/// income/expense pair run through [`AssetAllocation::plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BudgetSource {
    Amount { budget: f64 },
    Income { salary: f64, expense: f64 },
}

impl BudgetSource {
    /// Investable amount, plus the savings/investment split when it came from income.
    pub fn resolve(&self, risk_tolerance: f64) -> anyhow::Result<(f64, Option<AssetAllocation>)> {
        match *self {
            Self::Amount { budget } => {
                ensure!(
                    budget.is_finite() && budget > 0.0,
                    "budget must be positive (got {budget})"
                );
                Ok((budget, None))
            }
            Self::Income { salary, expense } => {
                let allocation = AssetAllocation::plan(salary, expense, risk_tolerance)?;
                Ok((allocation.investment_amount, Some(allocation)))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub instruments: Vec<InstrumentRecord>,
    pub risk_tolerance: f64,
    #[serde(flatten)]
    pub budget: BudgetSource,
    #[serde(default)]
    pub target_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationEntry {
    #[serde(flatten)]
    pub entry: PortfolioEntry,
    pub trend_estimate: Option<TrendEstimate>,
    pub analysis: Option<InstrumentAnalysis>,
    #[serde(default)]
    pub articles: Vec<ArticleLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationMetadata {
    pub candidates_scored: usize,
    pub candidates_affordable: usize,
    pub candidates_eligible: usize,
    pub trend_estimates: usize,
    /// Every candidate failed the trend filter; selection used trend-neutral scores.
    pub trend_filter_fallback: bool,
    pub no_affordable_instruments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub generated_at: DateTime<Utc>,
    pub risk_tolerance: f64,
    pub risk_profile: RiskProfile,
    pub budget: f64,
    pub weights: WeightVector,
    pub allocation: Option<AssetAllocation>,
    pub entries: Vec<RecommendationEntry>,
    pub summary: PortfolioSummary,
    pub metadata: RecommendationMetadata,
}

/// Run one full recommendation pass over a candidate batch.
///
/// `histories` maps ticker to chronologically ordered closing prices. Tickers
/// without a usable history are ranked on their composite score alone.
pub fn recommend(
    request: RecommendationRequest,
    histories: &BTreeMap<String, Vec<f64>>,
) -> anyhow::Result<Recommendation> {
    let RecommendationRequest {
        instruments,
        risk_tolerance,
        budget,
        target_count,
    } = request;

    ensure!(
        risk_tolerance.is_finite() && (0.0..=100.0).contains(&risk_tolerance),
        "risk_tolerance must be between 0 and 100 (got {risk_tolerance})"
    );
    let target_count = target_count.unwrap_or(DEFAULT_TARGET_COUNT);
    ensure!(target_count >= 1, "target_count must be at least 1");

    let (budget, allocation) = budget.resolve(risk_tolerance)?;
    let instruments = validate_batch(instruments)?;

    let (weights, scored) = score_candidates(&instruments, risk_tolerance);
    let candidates_scored = scored.len();

    let scored = affordable(scored, budget);
    let candidates_affordable = scored.len();

    let mut estimates = BTreeMap::<String, TrendEstimate>::new();
    for s in &scored {
        let ticker = &s.instrument.ticker;
        let Some(prices) = histories.get(ticker) else {
            continue;
        };
        match estimate_trend(prices) {
            Ok(estimate) => {
                estimates.insert(ticker.clone(), estimate);
            }
            Err(err) => {
                tracing::debug!(%ticker, error = %err, "skipping trend estimate");
            }
        }
    }

    let signals: BTreeMap<String, TrendSignal> = estimates
        .iter()
        .map(|(ticker, e)| {
            (
                ticker.clone(),
                TrendSignal::Estimated {
                    percent_change: e.percent_change,
                },
            )
        })
        .collect();

    let pool = build_candidate_pool(rank_candidates(scored, &signals));
    let selected = select_portfolio(&pool.candidates, budget, target_count);

    let metadata = RecommendationMetadata {
        candidates_scored,
        candidates_affordable,
        candidates_eligible: pool.candidates.len(),
        trend_estimates: estimates.len(),
        trend_filter_fallback: pool.trend_filter_fallback,
        no_affordable_instruments: selected.is_empty(),
    };

    if metadata.no_affordable_instruments {
        tracing::info!(budget, candidates_scored, "no affordable instruments for this budget");
    } else {
        tracing::info!(
            budget,
            candidates_scored,
            candidates_eligible = metadata.candidates_eligible,
            selected = selected.len(),
            "portfolio selected"
        );
    }

    let summary = PortfolioSummary::from_entries(&selected);
    let entries = selected
        .into_iter()
        .map(|entry| {
            let trend_estimate = estimates.get(&entry.instrument.ticker).cloned();
            let articles = news_links(&entry.instrument)?;
            Ok(RecommendationEntry {
                entry,
                trend_estimate,
                analysis: None,
                articles,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Recommendation {
        generated_at: Utc::now(),
        risk_tolerance,
        risk_profile: RiskProfile::from_tolerance(risk_tolerance),
        budget,
        weights,
        allocation,
        entries,
        summary,
        metadata,
    })
}
