use crate::domain::analysis::InstrumentAnalysis;
use crate::domain::contract::LlmInstrumentAnalysis;
use anyhow::Context;

/// Pull a JSON object out of model text: a fenced block if present, otherwise
/// everything from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(fenced) = trimmed.strip_prefix("```") {
        // Drop the info string line (```json).
        let body = fenced.split_once('\n').map_or("", |(_, rest)| rest);
        let body = body.rfind("```").map_or(body, |end| &body[..end]);
        return Some(body.trim().to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_analysis(text: &str, expected_ticker: &str) -> anyhow::Result<InstrumentAnalysis> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmInstrumentAnalysis>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for analysis schema: {json_str}"))?;
    parsed.validate_and_into_analysis(expected_ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis_json(ticker: &str) -> String {
        json!({
            "ticker": ticker,
            "recommendation_reason": "메모리 업황 회복과 안정적인 배당.",
            "caution_points": "환율 변동과 업황 둔화 리스크.",
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here you go: {\"a\":1} hope that helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn parse_analysis_accepts_prose_wrapped_json() {
        let text = format!("분석 결과입니다.\n{}\n", analysis_json("005930"));
        let analysis = parse_analysis(&text, "005930").unwrap();
        assert_eq!(analysis.ticker, "005930");
        assert!(analysis.caution_points.contains("환율"));
    }

    #[test]
    fn parse_analysis_rejects_other_ticker() {
        assert!(parse_analysis(&analysis_json("000660"), "005930").is_err());
    }

    #[test]
    fn parse_analysis_rejects_empty_sections() {
        let text = json!({
            "ticker": "005930",
            "recommendation_reason": "  ",
            "caution_points": "risk",
        })
        .to_string();
        assert!(parse_analysis(&text, "005930").is_err());
    }
}
