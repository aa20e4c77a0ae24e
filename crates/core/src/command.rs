//! Parsing of operator input typed at the CLI.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::DomainError;
use crate::inventory::DeviceInventory;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub original: String,
    pub command: String,
    pub devices: Vec<String>,
    pub has_device_context: bool,
}

fn device_clause() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\bon\s+(?:device\s+)?([A-Za-z0-9_-]+(?:\s*,\s*[A-Za-z0-9_-]+)*)\s*$")
                .ok()
        })
        .as_ref()
}

/// Splits a trailing `on [device] a, b` clause off `text`.
///
/// Without such a clause the `default_device`, if any, becomes the target.
pub fn parse_command(text: &str, default_device: Option<&str>) -> ParsedCommand {
    let mut parsed = ParsedCommand {
        original: text.to_string(),
        command: text.trim().to_string(),
        devices: Vec::new(),
        has_device_context: false,
    };

    if let Some(captures) = device_clause().and_then(|pattern| pattern.captures(text)) {
        if let (Some(clause), Some(devices)) = (captures.get(0), captures.get(1)) {
            parsed.devices = devices
                .as_str()
                .split(',')
                .map(str::trim)
                .filter(|device| !device.is_empty())
                .map(str::to_string)
                .collect();
            parsed.has_device_context = !parsed.devices.is_empty();
            parsed.command = text[..clause.start()].trim().to_string();
        }
    }

    if parsed.devices.is_empty() {
        if let Some(device) = default_device.map(str::trim).filter(|device| !device.is_empty()) {
            parsed.devices = vec![device.to_string()];
            parsed.has_device_context = true;
        }
    }

    parsed
}

pub fn validate_command(
    parsed: &ParsedCommand,
    inventory: &DeviceInventory,
) -> Result<(), DomainError> {
    if parsed.command.trim().is_empty() {
        return Err(DomainError::InvalidRequest("Command cannot be empty".to_string()));
    }
    if !parsed.devices.is_empty() {
        inventory.require_devices(&parsed.devices)?;
    }
    Ok(())
}

/// Prefixes the command with its target device(s) for the planner.
pub fn build_prompt(command: &str, device: Option<&str>) -> String {
    match device.map(str::trim).filter(|device| !device.is_empty()) {
        Some(device) => format!("Execute on {device}: {command}"),
        None => command.to_string(),
    }
}

impl ParsedCommand {
    pub fn prompt(&self) -> String {
        if self.devices.is_empty() {
            build_prompt(&self.command, None)
        } else {
            build_prompt(&self.command, Some(&self.devices.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, parse_command, validate_command};
    use crate::domain::device::Device;
    use crate::errors::DomainError;
    use crate::inventory::DeviceInventory;

    fn inventory() -> DeviceInventory {
        DeviceInventory::new(["R1", "SW-1"].into_iter().map(|name| Device {
            name: name.to_string(),
            host: "198.51.100.7".to_string(),
            username: "netops".to_string(),
            password_env_var: "LAB_PASSWORD".to_string(),
            device_type: "cisco_ios".to_string(),
            port: 22,
        }))
    }

    #[test]
    fn trailing_device_clause_is_stripped() {
        let parsed = parse_command("show ip interface brief on R1, SW-1", None);
        assert_eq!(parsed.command, "show ip interface brief");
        assert_eq!(parsed.devices, vec!["R1", "SW-1"]);
        assert!(parsed.has_device_context);
        assert_eq!(parsed.original, "show ip interface brief on R1, SW-1");
    }

    #[test]
    fn clause_accepts_device_keyword_and_any_case() {
        let parsed = parse_command("Show version ON device r1", None);
        assert_eq!(parsed.command, "Show version");
        assert_eq!(parsed.devices, vec!["r1"]);
    }

    #[test]
    fn only_the_trailing_clause_counts() {
        let parsed = parse_command("turn on ospf on R1", None);
        assert_eq!(parsed.command, "turn on ospf");
        assert_eq!(parsed.devices, vec!["R1"]);
    }

    #[test]
    fn default_device_applies_without_clause() {
        let parsed = parse_command("show clock", Some("R1"));
        assert_eq!(parsed.devices, vec!["R1"]);
        assert!(parsed.has_device_context);
        assert_eq!(parsed.prompt(), "Execute on R1: show clock");

        let bare = parse_command("what can you do?", None);
        assert!(bare.devices.is_empty());
        assert!(!bare.has_device_context);
        assert_eq!(bare.prompt(), "what can you do?");
    }

    #[test]
    fn validation_rejects_empty_and_unknown() {
        let inventory = inventory();
        assert_eq!(
            validate_command(&parse_command("  on R1", None), &inventory),
            Err(DomainError::InvalidRequest("Command cannot be empty".to_string()))
        );
        assert!(matches!(
            validate_command(&parse_command("show run on R5", None), &inventory),
            Err(DomainError::UnknownDevices { ref unknown, .. }) if unknown == &vec!["R5".to_string()]
        ));
        assert!(validate_command(&parse_command("show run on R1", None), &inventory).is_ok());
    }

    #[test]
    fn prompt_includes_device_when_given() {
        assert_eq!(build_prompt("show vlan", Some("SW-1")), "Execute on SW-1: show vlan");
        assert_eq!(build_prompt("show vlan", None), "show vlan");
    }
}
