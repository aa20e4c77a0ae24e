use std::path::PathBuf;

use netpilot_core::config::{AppConfig, LoadOptions};
use netpilot_db::repositories::SqlDeviceRepository;
use netpilot_db::{import_yaml_inventory, YamlInventory};

use crate::app::{open_database, BootstrapError};
use crate::commands::{
    classify_bootstrap_error, current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_RUNTIME,
};

/// Copies devices from a YAML inventory into the SQLite `devices` table.
///
/// Existing names are left untouched, so running it twice is harmless.
pub fn run(options: LoadOptions, path: Option<PathBuf>) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "import-inventory",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };
    let path = path.unwrap_or_else(|| config.inventory.path.clone());

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "import-inventory",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let yaml = YamlInventory::load(&path)?;
        let pool = open_database(&config).await?;
        let repo = SqlDeviceRepository::new(pool.clone());
        let report = import_yaml_inventory(&yaml, &repo).await?;
        pool.close().await;
        Ok::<_, BootstrapError>(report)
    });

    match result {
        Ok(report) => {
            let mut message = format!("{}: {}", path.display(), report.summary());
            for (label, reason) in &report.skipped_invalid {
                message.push_str(&format!("; skipped {label} ({reason})"));
            }
            CommandResult::success("import-inventory", message)
        }
        Err(error) => {
            let (error_class, exit_code) = classify_bootstrap_error(&error);
            CommandResult::failure("import-inventory", error_class, error.to_string(), exit_code)
        }
    }
}
