use crate::domain::contract::InstrumentRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateBatchResponse {
    pub as_of_date: NaiveDate,
    pub items: Vec<InstrumentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryResponse {
    pub ticker: String,
    pub prices: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PriceHistoryResponse {
    /// Closing prices in chronological order, whatever order the provider sent.
    pub fn closes(mut self) -> Vec<f64> {
        self.prices.sort_by_key(|p| p.date);
        self.prices.into_iter().map(|p| p.close).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateResponse {
    pub base: String,
    pub quote: String,
    pub rate: f64,
}
