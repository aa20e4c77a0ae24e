use chrono::Utc;
use sqlx::Row;

use netpilot_core::domain::device::Device;

use super::{DeviceRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDeviceRepository {
    pool: DbPool,
}

impl SqlDeviceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let port: i64 = row.try_get("port").map_err(decode)?;

    Ok(Device {
        name: row.try_get("name").map_err(decode)?,
        host: row.try_get("host").map_err(decode)?,
        username: row.try_get("username").map_err(decode)?,
        password_env_var: row.try_get("password_env_var").map_err(decode)?,
        device_type: row.try_get("device_type").map_err(decode)?,
        port: u16::try_from(port)
            .map_err(|_| RepositoryError::Decode(format!("port {port} is out of range")))?,
    })
}

#[async_trait::async_trait]
impl DeviceRepository for SqlDeviceRepository {
    async fn list(&self) -> Result<Vec<Device>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, host, username, password_env_var, device_type, port
             FROM devices ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_device).collect()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Device>, RepositoryError> {
        let row = sqlx::query(
            "SELECT name, host, username, password_env_var, device_type, port
             FROM devices WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_device).transpose()
    }

    async fn insert_if_absent(&self, device: &Device) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO devices (name, host, username, password_env_var, device_type, port, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&device.name)
        .bind(&device.host)
        .bind(&device.username)
        .bind(&device.password_env_var)
        .bind(&device.device_type)
        .bind(i64::from(device.port))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, name: &str) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM devices WHERE name = ?").bind(name).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
