use std::collections::BTreeMap;

use tokio::sync::RwLock;

use netpilot_core::domain::approval::ApprovalRecord;
use netpilot_core::domain::device::Device;

use super::{ApprovalLogRepository, DeviceRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryDeviceRepository {
    devices: RwLock<BTreeMap<String, Device>>,
}

#[async_trait::async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn list(&self) -> Result<Vec<Device>, RepositoryError> {
        let devices = self.devices.read().await;
        Ok(devices.values().cloned().collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Device>, RepositoryError> {
        let devices = self.devices.read().await;
        Ok(devices.get(name).cloned())
    }

    async fn insert_if_absent(&self, device: &Device) -> Result<bool, RepositoryError> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.name) {
            return Ok(false);
        }
        devices.insert(device.name.clone(), device.clone());
        Ok(true)
    }

    async fn delete(&self, name: &str) -> Result<bool, RepositoryError> {
        let mut devices = self.devices.write().await;
        Ok(devices.remove(name).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalLogRepository {
    entries: RwLock<Vec<ApprovalRecord>>,
}

#[async_trait::async_trait]
impl ApprovalLogRepository for InMemoryApprovalLogRepository {
    async fn record(&self, entry: &ApprovalRecord) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|entry| entry.session_id == session_id).cloned().collect())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut recent: Vec<ApprovalRecord> = entries.clone();
        recent.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}
