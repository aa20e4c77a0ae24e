use chrono::Utc;

use netpilot_core::domain::approval::{ApprovalId, ApprovalRequest};
use netpilot_core::domain::plan::ExecutionPlan;
use netpilot_core::errors::DomainError;
use netpilot_core::inventory::DeviceInventory;
use netpilot_core::safety::{assess_risk, validate_plan};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow { warnings: Vec<String> },
    RequireApproval(ApprovalRequest),
    Deny { reason_code: &'static str, user_message: String },
}

/// Gate between a parsed plan and the device transport.
///
/// Every plan is validated against the inventory and the command safety rules.
/// Plans with any configure step are held for operator approval.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy;

impl GuardrailPolicy {
    pub fn evaluate(
        &self,
        session_id: &str,
        plan: &ExecutionPlan,
        inventory: &DeviceInventory,
    ) -> GuardrailDecision {
        let warnings = match validate_plan(plan, inventory) {
            Ok(warnings) => warnings,
            Err(error) => {
                return GuardrailDecision::Deny {
                    reason_code: reason_code(&error),
                    user_message: format!("Validation Error: {error}"),
                }
            }
        };

        if !plan.requires_approval() {
            return GuardrailDecision::Allow { warnings };
        }

        let steps: Vec<_> = plan.configure_steps().cloned().collect();
        GuardrailDecision::RequireApproval(ApprovalRequest {
            id: ApprovalId::generate(),
            session_id: session_id.to_string(),
            risk_level: assess_risk(&steps),
            steps,
            warnings,
            requested_at: Utc::now(),
        })
    }
}

fn reason_code(error: &DomainError) -> &'static str {
    match error {
        DomainError::UnknownDevices { .. } => "unknown_devices",
        DomainError::UnsafeCommand(_) => "unsafe_command",
        DomainError::MissingCredential { .. } => "missing_credential",
        DomainError::InvalidRequest(_) => "invalid_plan",
    }
}
