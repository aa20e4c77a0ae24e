//! Prompt templates rendered with `tera`.

use tera::{Context, Tera};
use thiserror::Error;

use netpilot_core::domain::conversation::Message;
use netpilot_core::inventory::DeviceInventory;

const PLANNER: &str = "planner.tera";
const FORMATTER: &str = "formatter.tera";
const SUMMARY: &str = "summary.tera";

/// Tool output beyond this many characters is cut before formatting.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 25_000;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (PLANNER, include_str!("../../../templates/prompts/planner.tera")),
            (FORMATTER, include_str!("../../../templates/prompts/formatter.tera")),
            (SUMMARY, include_str!("../../../templates/prompts/summary.tera")),
        ])?;
        Ok(Self { tera })
    }

    pub fn planner(&self, inventory: &DeviceInventory) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("device_inventory", &inventory.device_info());
        context.insert("device_names", &inventory.all_device_names());
        Ok(self.tera.render(PLANNER, &context)?)
    }

    pub fn formatter(&self, user_query: &str, tool_output: &str) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("user_query", user_query);
        context.insert("tool_output", &truncate_tool_output(tool_output));
        Ok(self.tera.render(FORMATTER, &context)?)
    }

    pub fn summary(&self, dropped: &[Message]) -> Result<String, PromptError> {
        let transcript = dropped
            .iter()
            .map(|message| format!("{}: {}", message.role.as_str(), message.content))
            .collect::<Vec<_>>()
            .join("\n");
        let mut context = Context::new();
        context.insert("transcript", &transcript);
        Ok(self.tera.render(SUMMARY, &context)?)
    }
}

pub fn truncate_tool_output(output: &str) -> String {
    if output.chars().count() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }
    let kept: String = output.chars().take(MAX_TOOL_OUTPUT_CHARS).collect();
    format!("{kept}\n...[truncated]")
}
