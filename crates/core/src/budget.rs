use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Low,
    Medium,
    High,
}

impl RiskProfile {
    pub fn from_tolerance(risk_tolerance: f64) -> Self {
        if risk_tolerance <= 30.0 {
            Self::Low
        } else if risk_tolerance <= 70.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Monthly surplus split between savings and investment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub balance: f64,
    pub savings_ratio: f64,
    pub investment_ratio: f64,
    pub savings_amount: f64,
    pub investment_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetError {
    NoInvestableBalance { balance: f64 },
}

impl fmt::Display for BudgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInvestableBalance { balance } => {
                write!(f, "no investable balance: salary minus expense is {balance}")
            }
        }
    }
}

impl std::error::Error for BudgetError {}

impl AssetAllocation {
    pub fn plan(salary: f64, expense: f64, risk_tolerance: f64) -> Result<Self, BudgetError> {
        let balance = salary - expense;
        if !balance.is_finite() || balance <= 0.0 {
            return Err(BudgetError::NoInvestableBalance { balance });
        }

        let (savings_ratio, investment_ratio) = if risk_tolerance <= 30.0 {
            (0.6, 0.4)
        } else if risk_tolerance <= 50.0 {
            (0.4, 0.6)
        } else if risk_tolerance <= 70.0 {
            (0.2, 0.8)
        } else {
            (0.1, 0.9)
        };

        Ok(Self {
            balance,
            savings_ratio,
            investment_ratio,
            savings_amount: (balance * savings_ratio).trunc(),
            investment_amount: (balance * investment_ratio).trunc(),
        })
    }
}
