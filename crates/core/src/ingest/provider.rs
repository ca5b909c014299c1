use crate::config::Settings;
use crate::domain::contract::{InstrumentRecord, REPORTING_CURRENCY};
use crate::ingest::types::{CandidateBatchResponse, ExchangeRateResponse, PriceHistoryResponse};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_CANDIDATES_PATH: &str = "/v1/candidates";
const DEFAULT_HISTORY_PATH: &str = "/v1/price_history";
const DEFAULT_FX_PATH: &str = "/v1/exchange_rate";

/// Used when the exchange-rate lookup fails.
pub const FALLBACK_USD_KRW: f64 = 1300.0;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_candidates(&self, as_of_date: NaiveDate) -> Result<Vec<InstrumentRecord>>;

    /// Closing prices over the last `period_days`, oldest first.
    async fn fetch_price_history(
        &self,
        ticker: &str,
        country: &str,
        period_days: u32,
    ) -> Result<Vec<f64>>;

    async fn fetch_exchange_rate(&self, base: &str, quote: &str) -> Result<f64>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonDataProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    candidates_path: String,
    history_path: String,
    fx_path: String,
    retries: u32,
}

impl HttpJsonDataProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            candidates_path: path_from_env("DATA_PROVIDER_CANDIDATES_PATH", DEFAULT_CANDIDATES_PATH),
            history_path: path_from_env("DATA_PROVIDER_HISTORY_PATH", DEFAULT_HISTORY_PATH),
            fx_path: path_from_env("DATA_PROVIDER_FX_PATH", DEFAULT_FX_PATH),
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .context("data provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("data provider HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<T>(raw_json)
            .with_context(|| format!("failed to parse provider response from {path}"))
    }

    /// Exponential backoff: 1s, 2s, 4s ... between attempts.
    async fn get_with_retries<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once::<T>(path, query).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt >= self.retries.max(1) {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(6));
                    tracing::warn!(attempt, path, ?backoff, error = %err, "data provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpJsonDataProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_candidates(&self, as_of_date: NaiveDate) -> Result<Vec<InstrumentRecord>> {
        let resp: CandidateBatchResponse = self
            .get_with_retries(
                &self.candidates_path,
                &[("as_of_date", as_of_date.to_string())],
            )
            .await?;
        validate_candidates(&resp, as_of_date)?;
        Ok(resp.items)
    }

    async fn fetch_price_history(
        &self,
        ticker: &str,
        country: &str,
        period_days: u32,
    ) -> Result<Vec<f64>> {
        let resp: PriceHistoryResponse = self
            .get_with_retries(
                &self.history_path,
                &[
                    ("ticker", ticker.to_string()),
                    ("country", country.to_string()),
                    ("period_days", period_days.to_string()),
                ],
            )
            .await
            .with_context(|| format!("price history for {ticker}"))?;
        anyhow::ensure!(
            resp.ticker.trim() == ticker,
            "provider ticker mismatch: expected {ticker}, got {}",
            resp.ticker
        );
        Ok(resp.closes())
    }

    async fn fetch_exchange_rate(&self, base: &str, quote: &str) -> Result<f64> {
        let resp: ExchangeRateResponse = self
            .get_with_retries(
                &self.fx_path,
                &[("base", base.to_string()), ("quote", quote.to_string())],
            )
            .await?;
        anyhow::ensure!(
            resp.base.eq_ignore_ascii_case(base) && resp.quote.eq_ignore_ascii_case(quote),
            "provider returned {}/{} for {base}/{quote}",
            resp.base,
            resp.quote
        );
        anyhow::ensure!(
            resp.rate.is_finite() && resp.rate > 0.0,
            "exchange rate must be positive (got {})",
            resp.rate
        );
        Ok(resp.rate)
    }
}

fn path_from_env(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn validate_candidates(resp: &CandidateBatchResponse, expected: NaiveDate) -> Result<()> {
    anyhow::ensure!(
        resp.as_of_date == expected,
        "provider as_of_date mismatch: expected {expected}, got {}",
        resp.as_of_date
    );
    for item in &resp.items {
        anyhow::ensure!(!item.ticker.trim().is_empty(), "ticker must be non-empty");
    }
    Ok(())
}

/// USD/KRW from the provider, or [`FALLBACK_USD_KRW`] when the lookup fails.
pub async fn usd_krw_or_fallback(client: &dyn MarketDataClient) -> f64 {
    match client.fetch_exchange_rate("USD", REPORTING_CURRENCY).await {
        Ok(rate) => rate,
        Err(err) => {
            tracing::warn!(
                provider = client.provider_name(),
                error = %err,
                fallback = FALLBACK_USD_KRW,
                "exchange rate lookup failed; using fallback rate"
            );
            FALLBACK_USD_KRW
        }
    }
}

/// Restate USD-quoted records in the reporting currency. Other currencies are
/// left as-is and rejected later by record validation.
pub fn convert_to_reporting_currency(
    records: Vec<InstrumentRecord>,
    usd_krw: f64,
) -> Vec<InstrumentRecord> {
    records
        .into_iter()
        .map(|mut r| {
            if r.currency.trim().eq_ignore_ascii_case("USD") {
                r.price *= usd_krw;
                r.currency = REPORTING_CURRENCY.to_string();
            }
            r
        })
        .collect()
}
