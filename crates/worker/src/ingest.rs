use crate::universe::HistoryTarget;
use basket_core::ingest::provider::MarketDataClient;
use std::collections::BTreeMap;

/// Fetch closing-price histories one instrument at a time.
///
/// A failed lookup is logged and left out; the pipeline ranks that instrument
/// without a trend.
pub async fn fetch_histories(
    client: &dyn MarketDataClient,
    targets: &[HistoryTarget],
    period_days: u32,
) -> BTreeMap<String, Vec<f64>> {
    let mut out = BTreeMap::new();
    for target in targets {
        match client
            .fetch_price_history(&target.ticker, &target.country, period_days)
            .await
        {
            Ok(prices) => {
                tracing::debug!(ticker = %target.ticker, observations = prices.len(), "fetched price history");
                out.insert(target.ticker.clone(), prices);
            }
            Err(err) => {
                tracing::warn!(
                    provider = client.provider_name(),
                    ticker = %target.ticker,
                    error = %err,
                    "price history unavailable; ranking without trend"
                );
            }
        }
    }

    tracing::info!(
        requested = targets.len(),
        fetched = out.len(),
        period_days,
        "price histories fetched"
    );
    out
}
