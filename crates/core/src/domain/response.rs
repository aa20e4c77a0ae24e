use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Characters of raw output kept when structured formatting fails.
pub const RAW_FALLBACK_CHARS: usize = 1000;

/// Operator-facing answer produced from device output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), structured_data: None, error: None }
    }

    pub fn failure(summary: impl Into<String>, error: impl Into<String>) -> Self {
        Self { summary: summary.into(), structured_data: None, error: Some(error.into()) }
    }

    /// Response used when the formatter reply cannot be parsed.
    pub fn formatting_fallback(reason: impl std::fmt::Display, raw: &str) -> Self {
        let raw: String = raw.chars().take(RAW_FALLBACK_CHARS).collect();
        Self {
            summary: format!("Error generating structured response: {reason}"),
            structured_data: Some(json!({ "raw": raw })),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentResponse, RAW_FALLBACK_CHARS};

    #[test]
    fn fallback_keeps_first_thousand_chars() {
        let raw = "x".repeat(RAW_FALLBACK_CHARS + 50);
        let response = AgentResponse::formatting_fallback("expected value", &raw);

        assert_eq!(response.summary, "Error generating structured response: expected value");
        let kept = response.structured_data.as_ref().and_then(|data| data["raw"].as_str());
        assert_eq!(kept.map(str::len), Some(RAW_FALLBACK_CHARS));
    }

    #[test]
    fn optional_fields_default_when_missing() {
        let response: AgentResponse =
            serde_json::from_str(r#"{"summary":"**R1** is up"}"#).expect("parse");
        assert_eq!(response, AgentResponse::summary("**R1** is up"));
    }
}
