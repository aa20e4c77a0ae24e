use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::plan::NetworkAction;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(format!("APR-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Pending request for operator consent before configuration reaches devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub session_id: String,
    pub steps: Vec<NetworkAction>,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> =
            self.steps.iter().flat_map(|step| step.devices.iter().cloned()).collect();
        devices.sort();
        devices.dedup();
        devices
    }

    pub fn commands(&self) -> Vec<String> {
        self.steps.iter().flat_map(|step| step.commands.iter().cloned()).collect()
    }
}

/// Persisted outcome of an [`ApprovalRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub session_id: String,
    pub devices: Vec<String>,
    pub commands: Vec<String>,
    pub risk_level: RiskLevel,
    pub decision: ApprovalDecision,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn from_request(request: &ApprovalRequest, decision: ApprovalDecision) -> Self {
        Self {
            id: request.id.clone(),
            session_id: request.session_id.clone(),
            devices: request.devices(),
            commands: request.commands(),
            risk_level: request.risk_level,
            decision,
            decided_at: Utc::now(),
        }
    }
}
