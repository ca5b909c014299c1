use anyhow::Context;
use basket_core::domain::contract::{validate_batch, InstrumentRecord};
use basket_core::ingest::provider::{
    convert_to_reporting_currency, usd_krw_or_fallback, MarketDataClient,
};
use basket_core::scoring::composite::score_candidates;
use basket_core::selection::candidates::affordable;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A batch file is either a bare array of records or a provider-style `{ "items": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Records(Vec<InstrumentRecord>),
    Wrapped { items: Vec<InstrumentRecord> },
}

/// An instrument whose price history should be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTarget {
    pub ticker: String,
    pub country: String,
}

pub fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn parse_batch(text: &str) -> anyhow::Result<Vec<InstrumentRecord>> {
    let parsed = serde_json::from_str::<BatchFile>(text)
        .context("batch file must be an array of instruments or an object with an items array")?;
    Ok(match parsed {
        BatchFile::Records(records) | BatchFile::Wrapped { items: records } => records,
    })
}

/// `{ "TICKER": [closing prices, oldest first], ... }`
pub fn parse_histories(text: &str) -> anyhow::Result<BTreeMap<String, Vec<f64>>> {
    serde_json::from_str(text).context("histories file must map tickers to price arrays")
}

/// Candidates from the provider, restated in the reporting currency.
pub async fn fetch_universe(
    client: &dyn MarketDataClient,
    as_of_date: NaiveDate,
) -> anyhow::Result<Vec<InstrumentRecord>> {
    let records = client
        .fetch_candidates(as_of_date)
        .await
        .with_context(|| format!("fetch candidates from {}", client.provider_name()))?;

    let needs_fx = records
        .iter()
        .any(|r| r.currency.trim().eq_ignore_ascii_case("USD"));
    if !needs_fx {
        return Ok(records);
    }

    let usd_krw = usd_krw_or_fallback(client).await;
    tracing::info!(%as_of_date, usd_krw, candidates_len = records.len(), "converting USD quotes");
    Ok(convert_to_reporting_currency(records, usd_krw))
}

/// The `limit` best affordable instruments by composite score. Histories are
/// only worth fetching for these.
pub fn history_targets(
    records: &[InstrumentRecord],
    risk_tolerance: f64,
    budget: f64,
    limit: usize,
) -> anyhow::Result<Vec<HistoryTarget>> {
    let instruments = validate_batch(records.to_vec())?;
    let (_, scored) = score_candidates(&instruments, risk_tolerance);

    Ok(affordable(scored, budget)
        .into_iter()
        .take(limit)
        .map(|s| HistoryTarget {
            ticker: s.instrument.ticker,
            country: s.instrument.country,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(ticker: &str, price: f64, pe_ratio: f64) -> serde_json::Value {
        json!({
            "ticker": ticker,
            "name": format!("Name {ticker}"),
            "country": "한국",
            "sector": "반도체",
            "price": price,
            "recent_return_pct": 2.0,
            "volatility": "중간",
            "pe_ratio": pe_ratio,
            "dividend_yield_pct": 1.0,
            "market_cap": "중형",
            "liquidity": "중간",
            "growth_rate_pct": 5.0,
            "rsi": 50,
            "news_sentiment": 3.0,
        })
    }

    #[test]
    fn parses_both_batch_shapes() {
        let bare = json!([record("A", 10_000.0, 10.0)]).to_string();
        assert_eq!(parse_batch(&bare).unwrap().len(), 1);

        let wrapped = json!({"items": [record("A", 10_000.0, 10.0), record("B", 10_000.0, 10.0)]})
            .to_string();
        assert_eq!(parse_batch(&wrapped).unwrap().len(), 2);

        assert!(parse_batch("{\"rows\": []}").is_err());
    }

    #[test]
    fn parses_histories() {
        let h = parse_histories("{\"A\": [1.0, 2.0, 3.5]}").unwrap();
        assert_eq!(h["A"], vec![1.0, 2.0, 3.5]);
        assert!(parse_histories("[1, 2]").is_err());
    }

    #[test]
    fn history_targets_skip_unaffordable_and_respect_limit() {
        let text = json!([
            record("CHEAP_GOOD", 10_000.0, 8.0),
            record("CHEAP_OK", 10_000.0, 22.0),
            record("DEAR_GOOD", 900_000.0, 8.0),
            record("CHEAP_POOR", 10_000.0, 50.0),
        ])
        .to_string();
        let records = parse_batch(&text).unwrap();

        let targets = history_targets(&records, 50.0, 500_000.0, 2).unwrap();
        let tickers: Vec<_> = targets.iter().map(|t| t.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["CHEAP_GOOD", "CHEAP_OK"]);
        assert_eq!(targets[0].country, "한국");
    }
}
