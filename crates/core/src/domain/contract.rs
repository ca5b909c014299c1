use crate::domain::analysis::InstrumentAnalysis;
use crate::domain::instrument::{
    Instrument, InstrumentMetrics, LiquidityLevel, MarketCapSize, VolatilityLevel,
};
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const REPORTING_CURRENCY: &str = "KRW";

/// One instrument as delivered by the market-data collaborator (or a batch file),
/// before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub ticker: String,
    pub name: String,
    pub country: String,
    pub sector: String,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub recent_return_pct: f64,
    pub volatility: VolatilityLevel,
    pub pe_ratio: f64,
    pub dividend_yield_pct: f64,
    pub market_cap: MarketCapSize,
    pub liquidity: LiquidityLevel,
    pub growth_rate_pct: f64,
    pub rsi: f64,
    pub news_sentiment: f64,
}

fn default_currency() -> String {
    REPORTING_CURRENCY.to_string()
}

impl InstrumentRecord {
    pub fn validate_and_into_instrument(self) -> anyhow::Result<Instrument> {
        let ticker = self.ticker.trim().to_string();
        ensure!(!ticker.is_empty(), "ticker must be non-empty");

        let name = self.name.trim().to_string();
        ensure!(!name.is_empty(), "name must be non-empty ({ticker})");

        let country = self.country.trim().to_string();
        ensure!(!country.is_empty(), "country must be non-empty ({ticker})");

        let sector = self.sector.trim().to_string();
        ensure!(!sector.is_empty(), "sector must be non-empty ({ticker})");

        ensure!(
            self.currency.trim().eq_ignore_ascii_case(REPORTING_CURRENCY),
            "price for {ticker} must be converted to {REPORTING_CURRENCY} (got {})",
            self.currency
        );
        ensure!(
            self.price.is_finite() && self.price > 0.0,
            "price must be positive ({ticker}: {})",
            self.price
        );
        ensure!(
            self.rsi.is_finite() && (0.0..=100.0).contains(&self.rsi),
            "rsi must be between 0 and 100 ({ticker}: {})",
            self.rsi
        );

        for (field, value) in [
            ("recent_return_pct", self.recent_return_pct),
            ("pe_ratio", self.pe_ratio),
            ("dividend_yield_pct", self.dividend_yield_pct),
            ("growth_rate_pct", self.growth_rate_pct),
            ("news_sentiment", self.news_sentiment),
        ] {
            ensure!(value.is_finite(), "{field} must be finite ({ticker}: {value})");
        }

        Ok(Instrument {
            ticker,
            name,
            country,
            sector,
            price: self.price,
            metrics: InstrumentMetrics {
                recent_return_pct: self.recent_return_pct,
                volatility: self.volatility,
                pe_ratio: self.pe_ratio,
                dividend_yield_pct: self.dividend_yield_pct,
                market_cap: self.market_cap,
                liquidity: self.liquidity,
                growth_rate_pct: self.growth_rate_pct,
                rsi: self.rsi,
                news_sentiment: self.news_sentiment,
            },
        })
    }
}

impl From<Instrument> for InstrumentRecord {
    /// Back to the raw form, e.g. to re-validate an instrument a client echoed back.
    fn from(instrument: Instrument) -> Self {
        let Instrument {
            ticker,
            name,
            country,
            sector,
            price,
            metrics,
        } = instrument;
        Self {
            ticker,
            name,
            country,
            sector,
            price,
            currency: default_currency(),
            recent_return_pct: metrics.recent_return_pct,
            volatility: metrics.volatility,
            pe_ratio: metrics.pe_ratio,
            dividend_yield_pct: metrics.dividend_yield_pct,
            market_cap: metrics.market_cap,
            liquidity: metrics.liquidity,
            growth_rate_pct: metrics.growth_rate_pct,
            rsi: metrics.rsi,
            news_sentiment: metrics.news_sentiment,
        }
    }
}

/// Validate a whole batch. Tickers must be unique within the batch.
pub fn validate_batch(records: Vec<InstrumentRecord>) -> anyhow::Result<Vec<Instrument>> {
    let mut seen = BTreeSet::<String>::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let instrument = record.validate_and_into_instrument()?;
        ensure!(
            seen.insert(instrument.ticker.clone()),
            "duplicate ticker in batch: {}",
            instrument.ticker
        );
        out.push(instrument);
    }
    Ok(out)
}

/// Raw analysis as emitted by the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInstrumentAnalysis {
    pub ticker: String,
    pub recommendation_reason: String,
    pub caution_points: String,
}

impl LlmInstrumentAnalysis {
    pub fn validate_and_into_analysis(
        self,
        expected_ticker: &str,
    ) -> anyhow::Result<InstrumentAnalysis> {
        let ticker = self.ticker.trim().to_string();
        ensure!(
            ticker == expected_ticker,
            "LLM output ticker mismatch: expected {expected_ticker}, got {ticker}"
        );

        let recommendation_reason = self.recommendation_reason.trim().to_string();
        ensure!(
            !recommendation_reason.is_empty(),
            "recommendation_reason must be non-empty"
        );

        let caution_points = self.caution_points.trim().to_string();
        ensure!(!caution_points.is_empty(), "caution_points must be non-empty");

        Ok(InstrumentAnalysis {
            ticker,
            recommendation_reason,
            caution_points,
        })
    }
}
