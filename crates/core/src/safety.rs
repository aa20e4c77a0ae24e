//! Command safety rules applied before anything reaches a device.

use std::collections::BTreeSet;

use crate::domain::approval::RiskLevel;
use crate::domain::plan::{ActionType, ExecutionPlan, NetworkAction};
use crate::errors::DomainError;
use crate::inventory::DeviceInventory;

pub const DANGEROUS_KEYWORDS: &[&str] = &[
    "reload",
    "reboot",
    "restart",
    "write erase",
    "erase",
    "delete",
    "format",
    "rmdir",
    "copy run start",
];

pub const READ_ONLY_PREFIXES: &[&str] = &["show", "display", "get", "list"];

const LOW_RISK_PREFIXES: &[&str] = &["description", "banner", "hostname", "host-name", "alias"];
const HIGH_RISK_MARKERS: &[&str] = &[
    "router ",
    "ip route",
    "ipv6 route",
    "switchport mode trunk",
    "switchport trunk",
    "shutdown",
    "protocols ",
];

/// Returns the first dangerous keyword that appears as a whole-word sequence in `command`.
///
/// Words are split on anything other than letters, digits and `-`, so `delete/force`
/// and `x,reload` still expose the keyword.
pub fn find_dangerous_keyword(command: &str) -> Option<&'static str> {
    let tokens: Vec<String> = command
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '-'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect();

    DANGEROUS_KEYWORDS.iter().copied().find(|keyword| {
        let words: Vec<&str> = keyword.split(' ').collect();
        tokens.windows(words.len()).any(|window| {
            window.iter().zip(&words).all(|(token, word)| token.as_str() == *word)
        })
    })
}

pub fn check_show_command(command: &str) -> Result<(), DomainError> {
    let lowered = command.trim().to_lowercase();
    let first_word = lowered.split_whitespace().next().unwrap_or_default();
    if !READ_ONLY_PREFIXES.contains(&first_word) {
        return Err(DomainError::UnsafeCommand(format!(
            "Show commands must start with: {}",
            READ_ONLY_PREFIXES.join(", ")
        )));
    }

    if let Some(keyword) = find_dangerous_keyword(&lowered) {
        return Err(DomainError::UnsafeCommand(format!(
            "Command contains dangerous keyword: '{keyword}'"
        )));
    }

    Ok(())
}

/// Blocks dangerous config lines and returns warnings for risky-but-allowed ones.
pub fn check_config_commands<S: AsRef<str>>(lines: &[S]) -> Result<Vec<String>, DomainError> {
    let mut warnings = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if let Some(keyword) = find_dangerous_keyword(line) {
            return Err(DomainError::UnsafeCommand(format!(
                "Blocked dangerous command: '{line}' contains '{keyword}'"
            )));
        }

        let lowered = line.to_lowercase();
        if lowered.contains("no ") && (lowered.contains("interface") || lowered.contains("ip")) {
            tracing::warn!(
                event_name = "safety.config.destructive_pattern",
                command = %line,
                "potentially destructive command detected"
            );
            warnings.push(format!("Potentially destructive command: {line}"));
        }
    }
    Ok(warnings)
}

/// Splits multi-line entries, trims each line and drops blanks.
pub fn clean_config_lines<S: AsRef<str>>(configs: &[S]) -> Result<Vec<String>, DomainError> {
    let cleaned: Vec<String> = configs
        .iter()
        .flat_map(|entry| entry.as_ref().lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if cleaned.is_empty() {
        return Err(DomainError::InvalidRequest(
            "No valid configuration commands provided.".to_string(),
        ));
    }
    Ok(cleaned)
}

/// Validates every step against the inventory and the safety rules.
///
/// Returns the warnings collected from configure steps.
pub fn validate_plan(
    plan: &ExecutionPlan,
    inventory: &DeviceInventory,
) -> Result<Vec<String>, DomainError> {
    let mut warnings = Vec::new();

    for (index, step) in plan.steps.iter().enumerate() {
        let number = index + 1;
        if step.devices.is_empty() {
            return Err(DomainError::InvalidRequest(format!(
                "Step {number}: no target devices specified"
            )));
        }

        inventory.require_devices(&step.devices)?;

        if step.commands.iter().all(|command| command.trim().is_empty()) {
            return Err(DomainError::InvalidRequest(format!(
                "Step {number}: no commands specified"
            )));
        }

        match step.action_type {
            ActionType::Read => {
                for command in step.commands.iter().filter(|command| !command.trim().is_empty()) {
                    check_show_command(command)?;
                }
            }
            ActionType::Configure => {
                let lines = clean_config_lines(&step.commands)?;
                warnings.extend(check_config_commands(&lines)?);
            }
        }
    }

    Ok(warnings)
}

fn line_risk(line: &str) -> RiskLevel {
    let lowered = line.trim().to_lowercase();

    if lowered.contains("spanning-tree") || lowered.starts_with("no router") {
        return RiskLevel::Critical;
    }
    let stripped = lowered.strip_prefix("set system ").unwrap_or(&lowered);
    if LOW_RISK_PREFIXES.iter().any(|prefix| stripped.starts_with(prefix)) {
        return RiskLevel::Low;
    }
    if HIGH_RISK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return RiskLevel::High;
    }
    if lowered.starts_with("interface") || lowered.starts_with("exit") {
        return RiskLevel::Low;
    }
    RiskLevel::Medium
}

fn is_routing_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    lowered.starts_with("router ")
        || lowered.starts_with("ip route")
        || lowered.starts_with("ipv6 route")
        || lowered.contains("protocols ")
}

/// Highest risk across all configure steps; read-only plans are `Low`.
pub fn assess_risk(steps: &[NetworkAction]) -> RiskLevel {
    let configure: Vec<&NetworkAction> =
        steps.iter().filter(|step| step.action_type == ActionType::Configure).collect();

    let mut risk = configure
        .iter()
        .flat_map(|step| step.commands.iter())
        .flat_map(|entry| entry.lines())
        .filter(|line| !line.trim().is_empty())
        .map(line_risk)
        .max()
        .unwrap_or(RiskLevel::Low);

    let routing_devices: BTreeSet<&String> = configure
        .iter()
        .filter(|step| step.commands.iter().flat_map(|entry| entry.lines()).any(is_routing_line))
        .flat_map(|step| step.devices.iter())
        .collect();
    if routing_devices.len() > 1 {
        risk = RiskLevel::Critical;
    }

    risk
}
