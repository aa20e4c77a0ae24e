use std::sync::Arc;

use netpilot_agent::llm::{LlmClient, LlmError, OpenAiCompatClient};
use netpilot_agent::transport::{DeviceTransport, SshTransport};
use netpilot_agent::{AgentRuntime, TaskExecutor};
use netpilot_core::config::{AppConfig, InventorySource};
use netpilot_core::inventory::DeviceInventory;
use netpilot_db::inventory::load_repository_inventory;
use netpilot_db::repositories::{ApprovalLogRepository, SqlApprovalLogRepository, SqlDeviceRepository};
use netpilot_db::{connect_with_config, migrations, DbPool, InventoryError, YamlInventory};
use thiserror::Error;
use tracing::info;

/// Everything a chat or single-command session needs.
pub struct Application {
    pub config: AppConfig,
    pub inventory: Arc<DeviceInventory>,
    pub agent: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("LLM client is not usable: {0}")]
    Llm(#[from] LlmError),
    #[error("agent runtime failed to start: {0}")]
    Runtime(#[source] anyhow::Error),
}

impl Application {
    pub fn assemble(
        config: AppConfig,
        inventory: DeviceInventory,
        llm: Arc<dyn LlmClient>,
        transport: Arc<dyn DeviceTransport>,
        approval_log: Option<Arc<dyn ApprovalLogRepository>>,
    ) -> Result<Self, BootstrapError> {
        let inventory = Arc::new(inventory);
        let executor =
            Arc::new(TaskExecutor::new(Arc::clone(&inventory), transport, config.ssh.num_workers));

        let mut agent = AgentRuntime::new(llm, executor, config.context.clone())
            .map_err(BootstrapError::Runtime)?;
        if let Some(approval_log) = approval_log {
            agent = agent.with_approval_log(approval_log);
        }

        Ok(Self { config, inventory, agent })
    }
}

/// Wires the production LLM client, SSH transport and inventory from `config`.
pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        inventory_source = ?config.inventory.source,
        "starting netpilot"
    );

    let (inventory, pool) = load_inventory(&config).await?;
    if inventory.is_empty() {
        tracing::warn!(
            event_name = "system.bootstrap.empty_inventory",
            path = %config.inventory.path.display(),
            "no devices loaded"
        );
    }

    let llm = Arc::new(OpenAiCompatClient::from_config(&config.llm)?);
    let transport = Arc::new(SshTransport::new(config.ssh.clone()));
    info!(
        event_name = "system.bootstrap.ssh_auth",
        auth = ?transport.auth(),
        "ssh authentication mode selected"
    );

    let approval_log = pool.map(|pool| {
        Arc::new(SqlApprovalLogRepository::new(pool)) as Arc<dyn ApprovalLogRepository>
    });

    let app = Application::assemble(config, inventory, llm, transport, approval_log)?;
    info!(
        event_name = "system.bootstrap.ready",
        devices = app.inventory.len(),
        "netpilot ready"
    );
    Ok(app)
}

/// Loads devices from the configured source. The SQLite pool is returned for reuse.
pub async fn load_inventory(
    config: &AppConfig,
) -> Result<(DeviceInventory, Option<DbPool>), BootstrapError> {
    match config.inventory.source {
        InventorySource::Yaml => {
            let inventory = YamlInventory::load(&config.inventory.path)?.to_inventory();
            info!(
                event_name = "system.bootstrap.inventory_loaded",
                source = "yaml",
                devices = inventory.len(),
                "inventory loaded"
            );
            Ok((inventory, None))
        }
        InventorySource::Sqlite => {
            let pool = open_database(config).await?;
            let repo = SqlDeviceRepository::new(pool.clone());
            let inventory = load_repository_inventory(&repo).await?;
            info!(
                event_name = "system.bootstrap.inventory_loaded",
                source = "sqlite",
                devices = inventory.len(),
                "inventory loaded"
            );
            Ok((inventory, Some(pool)))
        }
    }
}

/// Connects and applies pending migrations.
pub async fn open_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;

    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        url = %config.database.url,
        "database ready"
    );
    Ok(pool)
}
