use chrono::{DateTime, Utc};
use sqlx::Row;

use netpilot_core::domain::approval::{ApprovalDecision, ApprovalId, ApprovalRecord, RiskLevel};

use super::{ApprovalLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalLogRepository {
    pool: DbPool,
}

impl SqlApprovalLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_json_list(raw: &str, column: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid {column} json: {e}")))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let devices_json: String =
        row.try_get("devices_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let commands_json: String =
        row.try_get("commands_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let risk_level: String =
        row.try_get("risk_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decision: String =
        row.try_get("decision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at: String =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let decided_at = DateTime::parse_from_rfc3339(&decided_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid decided_at: {e}")))?;

    Ok(ApprovalRecord {
        id: ApprovalId(id),
        session_id,
        devices: decode_json_list(&devices_json, "devices")?,
        commands: decode_json_list(&commands_json, "commands")?,
        risk_level: RiskLevel::parse(&risk_level)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown risk level `{risk_level}`")))?,
        decision: ApprovalDecision::parse(&decision)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision}`")))?,
        decided_at,
    })
}

#[async_trait::async_trait]
impl ApprovalLogRepository for SqlApprovalLogRepository {
    async fn record(&self, entry: &ApprovalRecord) -> Result<(), RepositoryError> {
        let devices_json = serde_json::to_string(&entry.devices)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let commands_json = serde_json::to_string(&entry.commands)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO approval_log (id, session_id, devices_json, commands_json, risk_level,
                                       decision, decided_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.session_id)
        .bind(devices_json)
        .bind(commands_json)
        .bind(entry.risk_level.as_str())
        .bind(entry.decision.as_str())
        .bind(entry.decided_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, devices_json, commands_json, risk_level, decision, decided_at
             FROM approval_log WHERE session_id = ? ORDER BY decided_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, devices_json, commands_json, risk_level, decision, decided_at
             FROM approval_log ORDER BY decided_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use netpilot_core::domain::approval::{
        ApprovalDecision, ApprovalId, ApprovalRecord, RiskLevel,
    };

    use super::SqlApprovalLogRepository;
    use crate::repositories::ApprovalLogRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlApprovalLogRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlApprovalLogRepository::new(pool)
    }

    fn record(id: &str, session_id: &str, decision: ApprovalDecision, age_secs: i64) -> ApprovalRecord {
        ApprovalRecord {
            id: ApprovalId(id.to_string()),
            session_id: session_id.to_string(),
            devices: vec!["R1".to_string(), "R2".to_string()],
            commands: vec!["interface Gi0/1".to_string(), "shutdown".to_string()],
            risk_level: RiskLevel::High,
            decision,
            decided_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn records_are_listed_per_session_in_order() {
        let repo = setup().await;
        repo.record(&record("APR-1", "s-1", ApprovalDecision::Denied, 20)).await.expect("record");
        repo.record(&record("APR-2", "s-2", ApprovalDecision::Approved, 10)).await.expect("record");
        repo.record(&record("APR-3", "s-1", ApprovalDecision::Approved, 5)).await.expect("record");

        let session = repo.list_for_session("s-1").await.expect("list");
        let ids: Vec<&str> = session.iter().map(|entry| entry.id.0.as_str()).collect();
        assert_eq!(ids, vec!["APR-1", "APR-3"]);
        assert_eq!(session[0].decision, ApprovalDecision::Denied);
        assert_eq!(session[0].commands, vec!["interface Gi0/1", "shutdown"]);
        assert_eq!(session[0].risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let repo = setup().await;
        repo.record(&record("APR-1", "s-1", ApprovalDecision::Denied, 20)).await.expect("record");
        repo.record(&record("APR-2", "s-2", ApprovalDecision::Approved, 10)).await.expect("record");

        let recent = repo.recent(1).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id.0, "APR-2");
    }
}
