use std::collections::{BTreeMap, BTreeSet};

use crate::domain::device::Device;
use crate::errors::DomainError;

/// In-memory index of managed devices keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInventory {
    devices: BTreeMap<String, Device>,
}

impl DeviceInventory {
    /// Builds the index. Later entries with a duplicate name replace earlier ones.
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self { devices: devices.into_iter().map(|device| (device.name.clone(), device)).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_exists(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn all_device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// One `- {name} (Platform: {device_type})` line per device, sorted by name.
    pub fn device_info(&self) -> String {
        if self.devices.is_empty() {
            return "No devices in inventory.".to_string();
        }
        self.devices
            .values()
            .map(|device| format!("- {} (Platform: {})", device.name, device.device_type))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Splits `names` into those present in the inventory and those that are not.
    pub fn validate_devices<S: AsRef<str>>(&self, names: &[S]) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut valid = BTreeSet::new();
        let mut invalid = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if self.device_exists(name) {
                valid.insert(name.to_string());
            } else {
                invalid.insert(name.to_string());
            }
        }
        (valid, invalid)
    }

    pub fn require_devices<S: AsRef<str>>(&self, names: &[S]) -> Result<(), DomainError> {
        let (_, invalid) = self.validate_devices(names);
        if invalid.is_empty() {
            return Ok(());
        }
        Err(DomainError::UnknownDevices {
            unknown: invalid.into_iter().collect(),
            available: self.all_device_names(),
        })
    }

    pub fn suggest_devices(&self, partial: &str) -> Vec<String> {
        let needle = partial.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.devices.keys().filter(|name| name.to_lowercase().contains(&needle)).cloned().collect()
    }
}
