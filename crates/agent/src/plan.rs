//! Extraction of typed plans and responses from LLM replies.

use serde::de::DeserializeOwned;

use netpilot_core::domain::plan::ExecutionPlan;
use netpilot_core::domain::response::AgentResponse;

/// Locates the JSON object in an LLM reply.
///
/// Tries the whole reply, then a fenced ```json block, then the outermost `{...}`.
pub fn extract_json(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        return Some(fenced);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```json").map(|index| index + "```json".len()).or_else(|| {
        text.find("```").map(|index| index + "```".len())
    })?;
    let rest = &text[open..];
    let close = rest.find("```")?;
    let body = rest[..close].trim();
    body.starts_with('{').then_some(body)
}

pub fn parse_json<T: DeserializeOwned>(reply: &str) -> Result<T, serde_json::Error> {
    let candidate = extract_json(reply).unwrap_or(reply);
    serde_json::from_str(candidate)
}

/// Parses a planner reply. Anything that is not a valid plan is treated as a direct answer.
pub fn parse_plan(reply: &str) -> ExecutionPlan {
    match parse_json::<ExecutionPlan>(reply) {
        Ok(mut plan) => {
            if plan.direct_response.as_deref().is_some_and(|text| text.trim().is_empty()) {
                plan.direct_response = None;
            }
            plan
        }
        Err(error) => {
            tracing::debug!(
                event_name = "agent.plan.unparsed",
                error = %error,
                "planner reply was not a plan, using it as a direct response"
            );
            ExecutionPlan::direct(reply.trim())
        }
    }
}

pub fn parse_response(reply: &str) -> AgentResponse {
    parse_json::<AgentResponse>(reply)
        .unwrap_or_else(|error| AgentResponse::formatting_fallback(error, reply))
}
