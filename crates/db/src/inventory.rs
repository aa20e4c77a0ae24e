//! YAML device inventory and its import into the SQLite `devices` table.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use netpilot_core::domain::device::{Device, DEFAULT_SSH_PORT};
use netpilot_core::inventory::DeviceInventory;

use crate::repositories::{DeviceRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("could not read inventory file `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse inventory file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Default, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    devices: Vec<RawDeviceEntry>,
}

/// A `devices:` entry before required fields are checked.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct RawDeviceEntry {
    pub name: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password_env_var: Option<String>,
    pub device_type: Option<String>,
    pub port: Option<u16>,
}

impl RawDeviceEntry {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("name", &self.name),
            ("host", &self.host),
            ("username", &self.username),
            ("password_env_var", &self.password_env_var),
            ("device_type", &self.device_type),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or_default().is_empty())
            .map(|(field, _)| field)
            .collect()
    }

    pub fn into_device(self) -> Result<Device, Vec<&'static str>> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(Device {
            name: self.name.unwrap_or_default().trim().to_string(),
            host: self.host.unwrap_or_default().trim().to_string(),
            username: self.username.unwrap_or_default(),
            password_env_var: self.password_env_var.unwrap_or_default().trim().to_string(),
            device_type: self.device_type.unwrap_or_default().trim().to_string(),
            port: self.port.unwrap_or(DEFAULT_SSH_PORT),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct YamlInventory {
    pub path: PathBuf,
    pub entries: Vec<RawDeviceEntry>,
}

impl YamlInventory {
    /// Reads `path`. A missing file yields an empty inventory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref().to_path_buf();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    event_name = "inventory.yaml.missing",
                    path = %path.display(),
                    "inventory file not found, continuing with an empty inventory"
                );
                return Ok(Self { path, entries: Vec::new() });
            }
            Err(source) => return Err(InventoryError::Read { path, source }),
        };

        Self::parse(path, &raw)
    }

    pub fn parse(path: PathBuf, raw: &str) -> Result<Self, InventoryError> {
        if raw.trim().is_empty() {
            return Ok(Self { path, entries: Vec::new() });
        }
        let file: Option<InventoryFile> = serde_yaml::from_str(raw)
            .map_err(|source| InventoryError::Parse { path: path.clone(), source })?;
        Ok(Self { path, entries: file.unwrap_or_default().devices })
    }

    /// Valid devices; incomplete entries are logged and skipped.
    pub fn devices(&self) -> Vec<Device> {
        self.entries
            .iter()
            .cloned()
            .filter_map(|entry| {
                let label = entry.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
                match entry.into_device() {
                    Ok(device) => Some(device),
                    Err(missing) => {
                        tracing::warn!(
                            event_name = "inventory.yaml.invalid_entry",
                            device = %label,
                            missing = ?missing,
                            "skipping inventory entry with missing fields"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    pub fn to_inventory(&self) -> DeviceInventory {
        DeviceInventory::new(self.devices())
    }
}

pub async fn load_repository_inventory(
    repo: &dyn DeviceRepository,
) -> Result<DeviceInventory, InventoryError> {
    Ok(DeviceInventory::new(repo.list().await?))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<String>,
    pub skipped_existing: Vec<String>,
    /// `(entry label, reason)` pairs.
    pub skipped_invalid: Vec<(String, String)>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} already present, {} invalid",
            self.added.len(),
            self.skipped_existing.len(),
            self.skipped_invalid.len()
        )
    }
}

pub async fn import_yaml_inventory(
    yaml: &YamlInventory,
    repo: &dyn DeviceRepository,
) -> Result<ImportReport, InventoryError> {
    let mut report = ImportReport::default();

    for (index, entry) in yaml.entries.iter().cloned().enumerate() {
        let label = entry.name.clone().unwrap_or_else(|| format!("entry #{}", index + 1));
        let device = match entry.into_device() {
            Ok(device) => device,
            Err(missing) => {
                let reason = format!("missing fields: {}", missing.join(", "));
                tracing::warn!(
                    event_name = "inventory.import.skipped_invalid",
                    device = %label,
                    reason = %reason,
                    "skipping device"
                );
                report.skipped_invalid.push((label, reason));
                continue;
            }
        };

        if repo.insert_if_absent(&device).await? {
            tracing::info!(event_name = "inventory.import.added", device = %device.name, "device added");
            report.added.push(device.name);
        } else {
            tracing::info!(
                event_name = "inventory.import.skipped_existing",
                device = %device.name,
                "device already exists"
            );
            report.skipped_existing.push(device.name);
        }
    }

    Ok(report)
}
