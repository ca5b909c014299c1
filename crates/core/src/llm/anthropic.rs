use crate::config::Settings;
use crate::domain::analysis::InstrumentAnalysis;
use crate::domain::contract::LlmInstrumentAnalysis;
use crate::llm::error::{LlmDiagnosticsError, Stage};
use crate::llm::json;
use crate::llm::{AnalysisInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 2;

const TOOL_NAME_EMIT_ANALYSIS: &str = "emit_analysis";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        ticker: &str,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                ticker: ticker.to_string(),
                stage: Stage::Http,
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, max_tokens: u32, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn tools() -> Vec<Tool> {
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["ticker", "recommendation_reason", "caution_points"],
            "properties": {
                "ticker": {"type": "string"},
                "recommendation_reason": {"type": "string", "minLength": 1},
                "caution_points": {"type": "string", "minLength": 1}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
            description: "Emit the investment analysis for one instrument as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
        }
    }

    fn system_prompt() -> String {
        [
            "당신은 전문 증권 애널리스트입니다. 주식 투자 분석을 객관적이고 전문적으로 제공합니다.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "Output schema:",
            "{",
            "  \"ticker\": \"005930\",",
            "  \"recommendation_reason\": \"2-3 paragraphs\",",
            "  \"caution_points\": \"2-3 paragraphs\"",
            "}",
            "Rules:",
            "- Write both sections in Korean, in an objective, professional tone",
            "- recommendation_reason: why the instrument fits, from financial metrics, growth and market position",
            "- caution_points: risk factors, including market conditions, competition and financial risk",
            "- ticker must equal the ticker of the provided instrument",
        ]
        .join("\n")
    }

    fn user_prompt(input: &AnalysisInput) -> String {
        format!(
            "Task: Write the investment analysis for this instrument.\n\nInstrument JSON:\n{}",
            input.instrument_json()
        )
    }

    fn repair_prompt(previous_output: &str, expected_ticker: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON.\n\n\
TASK: Output ONLY a single JSON object with keys ticker, recommendation_reason, caution_points.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Use double quotes for all JSON strings.\n\
- The JSON MUST have ticker=\"{expected_ticker}\".\n\
- recommendation_reason and caution_points MUST be non-empty strings.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_analysis(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmInstrumentAnalysis>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_ANALYSIS {
                    let parsed = serde_json::from_value::<LlmInstrumentAnalysis>(input.clone())
                        .context("failed to decode tool_use.input into LlmInstrumentAnalysis")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        ticker: &str,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<InstrumentAnalysis> {
        let mut last_err = match json::parse_analysis(&initial_text, ticker) {
            Ok(analysis) => return Ok(analysis),
            Err(err) => err,
        };
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let repair_req = self.request(self.max_tokens, Self::repair_prompt(&last_text, ticker));
            let (repair_raw_json, repair_res) = self.create_message(ticker, repair_req).await?;

            let parsed = match Self::response_tool_analysis(&repair_res)? {
                Some(tool) => tool.validate_and_into_analysis(ticker),
                None => json::parse_analysis(&Self::response_text(&repair_res), ticker),
            };
            match parsed {
                Ok(analysis) => return Ok(analysis),
                Err(err) => {
                    last_err = err;
                    last_text = Self::response_text(&repair_res);
                    last_raw_json = repair_raw_json;
                    tracing::warn!(
                        attempt,
                        %ticker,
                        error = %last_err,
                        "LLM output still invalid after repair attempt"
                    );
                }
            }
        }

        Err(LlmDiagnosticsError {
            provider: Provider::Anthropic,
            ticker: ticker.to_string(),
            stage: Stage::ParseAfterRepair,
            detail: format!("final_error={last_err}"),
            raw_output: Some(last_text),
            raw_response_json: Some(last_raw_json),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_analysis(&self, input: AnalysisInput) -> anyhow::Result<InstrumentAnalysis> {
        let ticker = input.ticker.clone();
        let prompt = Self::user_prompt(&input);

        let (mut raw_json, mut res) = self
            .create_message(&ticker, self.request(self.max_tokens, prompt.clone()))
            .await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                %ticker,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self
                .create_message(&ticker, self.request(bumped, prompt))
                .await?;
            raw_json = rj;
            res = r;
        }

        if let Some(tool_analysis) = Self::response_tool_analysis(&res)? {
            return tool_analysis
                .validate_and_into_analysis(&ticker)
                .map_err(|err| {
                    LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        ticker: ticker.clone(),
                        stage: Stage::ToolInput,
                        detail: err.to_string(),
                        raw_output: None,
                        raw_response_json: Some(raw_json),
                    }
                    .into()
                });
        }

        let text = Self::response_text(&res);
        self.try_parse_with_repairs(&ticker, text, raw_json).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_use_analysis_input() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": TOOL_NAME_EMIT_ANALYSIS,
                    "input": {
                        "ticker": "005930",
                        "recommendation_reason": "reason",
                        "caution_points": "caution"
                    }
                }
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();

        let parsed = AnthropicClient::response_tool_analysis(&res).unwrap().unwrap();
        let analysis = parsed.validate_and_into_analysis("005930").unwrap();
        assert_eq!(analysis.recommendation_reason, "reason");
    }

    #[test]
    fn text_blocks_are_joined_and_other_blocks_ignored() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "redacted_thinking", "data": "x"},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();

        assert!(AnthropicClient::response_tool_analysis(&res).unwrap().is_none());
        assert_eq!(AnthropicClient::response_text(&res), "first\nsecond");
        assert_eq!(res.stop_reason, None);
    }

    #[test]
    fn request_forces_the_analysis_tool() {
        let client = AnthropicClient {
            http: reqwest::Client::new(),
            api_key: "test".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        };
        let body = serde_json::to_value(client.request(512, "hi".to_string())).unwrap();
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "emit_analysis"}));
        assert_eq!(body["tools"][0]["name"], "emit_analysis");
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
