use serde::{Deserialize, Serialize};

/// Per-dimension weights for the composite score. Always normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub stability: f64,
    pub recent_return: f64,
    pub growth: f64,
    pub valuation: f64,
    pub dividend: f64,
    pub sentiment: f64,
    pub liquidity: f64,
    pub technical: f64,
}

impl WeightVector {
    /// Weights for a risk tolerance in `[0, 100]` (values outside are clamped).
    ///
    /// Conservative profiles lean on stability, valuation and dividends; aggressive
    /// ones on return, growth and technicals. Sentiment and liquidity are fixed.
    pub fn for_risk_tolerance(risk_tolerance: f64) -> Self {
        let rho = if risk_tolerance.is_finite() {
            risk_tolerance.clamp(0.0, 100.0) / 100.0
        } else {
            0.5
        };

        Self {
            stability: (0.4 - 0.3 * rho).max(0.2),
            recent_return: 0.15 + 0.15 * rho,
            growth: 0.10 + 0.15 * rho,
            valuation: (0.2 - 0.1 * rho).max(0.1),
            dividend: (0.15 - 0.1 * rho).max(0.05),
            sentiment: 0.15,
            liquidity: 0.10,
            technical: 0.05 + 0.10 * rho,
        }
        .normalized()
    }

    pub fn total(&self) -> f64 {
        self.stability
            + self.recent_return
            + self.growth
            + self.valuation
            + self.dividend
            + self.sentiment
            + self.liquidity
            + self.technical
    }

    fn normalized(self) -> Self {
        let total = self.total();
        Self {
            stability: self.stability / total,
            recent_return: self.recent_return / total,
            growth: self.growth / total,
            valuation: self.valuation / total,
            dividend: self.dividend / total,
            sentiment: self.sentiment / total,
            liquidity: self.liquidity / total,
            technical: self.technical / total,
        }
    }
}
