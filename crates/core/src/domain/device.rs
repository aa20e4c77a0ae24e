use std::env;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A managed router or switch as described by the inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub host: String,
    pub username: String,
    /// Name of the environment variable holding the login password.
    pub password_env_var: String,
    pub device_type: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Device {
    pub fn platform(&self) -> Platform {
        Platform::from_device_type(&self.device_type)
    }

    /// Reads the password from the environment variable named by `password_env_var`.
    pub fn resolve_password(&self) -> Result<SecretString, DomainError> {
        let var = self.password_env_var.trim();
        match env::var(var) {
            Ok(value) if !value.is_empty() => Ok(value.into()),
            _ => Err(DomainError::MissingCredential {
                device: self.name.clone(),
                var: var.to_string(),
            }),
        }
    }
}

/// Vendor family that decides how config mode is entered and left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    CiscoIos,
    CiscoNxos,
    AristaEos,
    JuniperJunos,
    Generic,
}

impl Platform {
    pub fn from_device_type(device_type: &str) -> Self {
        match device_type.trim().to_ascii_lowercase().as_str() {
            "cisco_ios" | "cisco_xe" | "cisco_ios_xe" | "ios" => Self::CiscoIos,
            "cisco_nxos" | "nxos" => Self::CiscoNxos,
            "arista_eos" | "eos" => Self::AristaEos,
            "juniper_junos" | "juniper" | "junos" => Self::JuniperJunos,
            _ => Self::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CiscoIos => "cisco_ios",
            Self::CiscoNxos => "cisco_nxos",
            Self::AristaEos => "arista_eos",
            Self::JuniperJunos => "juniper_junos",
            Self::Generic => "generic",
        }
    }

    pub fn disable_paging(&self) -> &'static str {
        match self {
            Self::JuniperJunos => "set cli screen-length 0",
            _ => "terminal length 0",
        }
    }

    pub fn config_enter(&self) -> &'static str {
        match self {
            Self::JuniperJunos => "configure",
            _ => "configure terminal",
        }
    }

    pub fn config_exit(&self) -> &'static str {
        match self {
            Self::JuniperJunos => "commit and-quit",
            _ => "end",
        }
    }

    /// Full interactive session script for applying `lines` in config mode.
    pub fn config_session(&self, lines: &[String]) -> Vec<String> {
        let mut script = Vec::with_capacity(lines.len() + 4);
        script.push(self.disable_paging().to_string());
        script.push(self.config_enter().to_string());
        script.extend(lines.iter().cloned());
        script.push(self.config_exit().to_string());
        script.push("exit".to_string());
        script
    }
}
