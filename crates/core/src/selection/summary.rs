use crate::selection::selector::PortfolioEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryWeight {
    pub ticker: String,
    /// Share of the total invested amount, in percent, rounded to 2 decimals.
    pub weight_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub entry_count: usize,
    pub total_invested: f64,
    pub weights: Vec<EntryWeight>,
    pub invested_by_country: BTreeMap<String, f64>,
    pub invested_by_sector: BTreeMap<String, f64>,
    pub average_ranking_score: f64,
    pub average_recent_return_pct: f64,
    pub average_pe_ratio: f64,
    pub average_dividend_yield_pct: f64,
    pub average_growth_rate_pct: f64,
    pub rising_count: usize,
    pub neutral_count: usize,
}

impl PortfolioSummary {
    pub fn from_entries(entries: &[PortfolioEntry]) -> Self {
        if entries.is_empty() {
            return Self::default();
        }

        let total_invested: f64 = entries.iter().map(|e| e.invested_amount).sum();

        let weights = entries
            .iter()
            .map(|e| EntryWeight {
                ticker: e.instrument.ticker.clone(),
                weight_pct: if total_invested > 0.0 {
                    round2(e.invested_amount / total_invested * 100.0)
                } else {
                    0.0
                },
            })
            .collect();

        let mut invested_by_country = BTreeMap::<String, f64>::new();
        let mut invested_by_sector = BTreeMap::<String, f64>::new();
        for e in entries {
            *invested_by_country
                .entry(e.instrument.country.clone())
                .or_default() += e.invested_amount;
            *invested_by_sector
                .entry(e.instrument.sector.clone())
                .or_default() += e.invested_amount;
        }

        let average = |f: fn(&PortfolioEntry) -> f64| -> f64 {
            entries.iter().map(f).sum::<f64>() / entries.len() as f64
        };

        let rising_count = entries
            .iter()
            .filter(|e| e.trend.percent_change().is_some_and(|p| p > 0.0))
            .count();

        Self {
            entry_count: entries.len(),
            total_invested,
            weights,
            invested_by_country,
            invested_by_sector,
            average_ranking_score: average(|e| e.ranking_score),
            average_recent_return_pct: average(|e| e.instrument.metrics.recent_return_pct),
            average_pe_ratio: average(|e| e.instrument.metrics.pe_ratio),
            average_dividend_yield_pct: average(|e| e.instrument.metrics.dividend_yield_pct),
            average_growth_rate_pct: average(|e| e.instrument.metrics.growth_rate_pct),
            rising_count,
            neutral_count: entries.len() - rising_count,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
