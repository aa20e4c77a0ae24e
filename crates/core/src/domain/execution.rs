use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of running one task against one device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: Some(output.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, output: None, error: Some(error.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionReport {
    Rejected { error: String },
    Hosts(BTreeMap<String, HostResult>),
}

impl ExecutionReport {
    pub fn rejected_unknown(unknown: &[String]) -> Self {
        let quoted: Vec<String> = unknown.iter().map(|name| format!("'{name}'")).collect();
        Self::Rejected { error: format!("Devices not found: [{}]", quoted.join(", ")) }
    }

    pub fn failed_hosts(&self) -> Vec<String> {
        match self {
            Self::Rejected { .. } => Vec::new(),
            Self::Hosts(results) => results
                .iter()
                .filter(|(_, result)| !result.success)
                .map(|(host, _)| host.clone())
                .collect(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|error| {
            format!("{{\"error\": \"could not serialize execution report: {error}\"}}")
        })
    }
}
