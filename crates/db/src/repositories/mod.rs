use async_trait::async_trait;
use thiserror::Error;

use netpilot_core::domain::approval::ApprovalRecord;
use netpilot_core::domain::device::Device;

pub mod approval;
pub mod device;
pub mod memory;

pub use approval::SqlApprovalLogRepository;
pub use device::SqlDeviceRepository;
pub use memory::{InMemoryApprovalLogRepository, InMemoryDeviceRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// All devices ordered by name.
    async fn list(&self) -> Result<Vec<Device>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Device>, RepositoryError>;
    /// Inserts `device` unless a device with the same name exists. Returns whether it was added.
    async fn insert_if_absent(&self, device: &Device) -> Result<bool, RepositoryError>;
    async fn delete(&self, name: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ApprovalLogRepository: Send + Sync {
    async fn record(&self, entry: &ApprovalRecord) -> Result<(), RepositoryError>;
    async fn list_for_session(&self, session_id: &str)
        -> Result<Vec<ApprovalRecord>, RepositoryError>;
    async fn recent(&self, limit: u32) -> Result<Vec<ApprovalRecord>, RepositoryError>;
}
