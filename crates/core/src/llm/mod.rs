pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::analysis::InstrumentAnalysis;
use crate::domain::instrument::VolatilityLevel;
use crate::pipeline::RecommendationEntry;
use serde::Serialize;

/// What the model is told about one selected instrument.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInput {
    pub ticker: String,
    pub name: String,
    pub country: String,
    pub sector: String,
    pub pe_ratio: f64,
    pub dividend_yield_pct: f64,
    pub growth_rate_pct: f64,
    pub volatility: VolatilityLevel,
    pub news_sentiment: f64,
    pub trend_percent_change: Option<f64>,
}

impl AnalysisInput {
    pub fn from_entry(entry: &RecommendationEntry) -> Self {
        let instrument = &entry.entry.instrument;
        let m = &instrument.metrics;
        Self {
            ticker: instrument.ticker.clone(),
            name: instrument.name.clone(),
            country: instrument.country.clone(),
            sector: instrument.sector.clone(),
            pe_ratio: m.pe_ratio,
            dividend_yield_pct: m.dividend_yield_pct,
            growth_rate_pct: m.growth_rate_pct,
            volatility: m.volatility,
            news_sentiment: m.news_sentiment,
            trend_percent_change: entry.entry.trend.percent_change(),
        }
    }

    pub fn instrument_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_analysis(&self, input: AnalysisInput) -> anyhow::Result<InstrumentAnalysis>;
}

/// Fill in `analysis` for each entry, one request at a time.
///
/// A failed narrative leaves that entry without analysis; the errors are
/// returned so the caller can report them.
pub async fn annotate_entries(
    client: &dyn LlmClient,
    entries: &mut [RecommendationEntry],
) -> Vec<anyhow::Error> {
    let mut failures = Vec::new();
    for entry in entries.iter_mut() {
        let input = AnalysisInput::from_entry(entry);
        let ticker = input.ticker.clone();
        match client.generate_analysis(input).await {
            Ok(analysis) => entry.analysis = Some(analysis),
            Err(err) => {
                tracing::warn!(
                    provider = ?client.provider(),
                    %ticker,
                    error = %err,
                    "instrument analysis failed; reporting entry without it"
                );
                failures.push(err.context(format!("analysis for {ticker}")));
            }
        }
    }
    failures
}
