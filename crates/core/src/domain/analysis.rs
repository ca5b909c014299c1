use serde::{Deserialize, Serialize};

/// Narrative produced for one recommended instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentAnalysis {
    pub ticker: String,
    pub recommendation_reason: String,
    pub caution_points: String,
}
