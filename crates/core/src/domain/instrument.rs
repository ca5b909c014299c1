use serde::{Deserialize, Serialize};

/// A validated tradable instrument. Prices are in the reporting currency (KRW).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub country: String,
    pub sector: String,
    pub price: f64,
    pub metrics: InstrumentMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentMetrics {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityLevel {
    #[serde(rename = "low", alias = "낮음")]
    Low,
    #[serde(rename = "medium", alias = "중간")]
    Medium,
    #[serde(rename = "high", alias = "높음")]
    High,
    #[serde(rename = "very_high", alias = "매우높음")]
    VeryHigh,
    #[serde(rename = "unrecognized", other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCapSize {
    #[serde(rename = "large", alias = "대형")]
    Large,
    #[serde(rename = "mid", alias = "중형")]
    Mid,
    #[serde(rename = "small", alias = "소형")]
    Small,
    #[serde(rename = "unrecognized", other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityLevel {
    #[serde(rename = "very_high", alias = "매우높음")]
    VeryHigh,
    #[serde(rename = "high", alias = "높음")]
    High,
    #[serde(rename = "medium", alias = "중간")]
    Medium,
    #[serde(rename = "low", alias = "낮음")]
    Low,
    #[serde(rename = "very_low", alias = "매우낮음")]
    VeryLow,
    #[serde(rename = "unrecognized", other)]
    Unrecognized,
}

impl VolatilityLevel {
    pub fn is_recognized(self) -> bool {
        self != Self::Unrecognized
    }
}

impl MarketCapSize {
    pub fn is_recognized(self) -> bool {
        self != Self::Unrecognized
    }
}

impl LiquidityLevel {
    pub fn is_recognized(self) -> bool {
        self != Self::Unrecognized
    }
}
