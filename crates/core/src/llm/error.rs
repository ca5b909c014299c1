use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Http,
    ToolInput,
    ParseAfterRepair,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::ToolInput => "tool_input",
            Self::ParseAfterRepair => "parse_after_repair",
        })
    }
}

/// Narrative generation failure with whatever the model sent back.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub ticker: String,
    pub stage: Stage,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    /// Raw model output as JSON when it parses, wrapped as `{"raw_text": ..}` otherwise.
    pub fn raw_output_json(&self) -> Option<Value> {
        let raw = self.raw_output.as_deref()?;
        Some(
            serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::json!({ "raw_text": raw })),
        )
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, ticker={}, stage={}): {}",
            self.provider, self.ticker, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
