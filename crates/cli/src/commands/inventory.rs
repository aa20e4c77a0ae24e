use netpilot_core::config::{AppConfig, LoadOptions};

use crate::app::{load_inventory, BootstrapError};
use crate::commands::{
    classify_bootstrap_error, current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_RUNTIME,
};
use crate::ui::Ui;

pub fn run(options: LoadOptions, ui: Ui) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "inventory",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "inventory",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let loaded = runtime.block_on(async {
        let (inventory, pool) = load_inventory(&config).await?;
        if let Some(pool) = pool {
            pool.close().await;
        }
        Ok::<_, BootstrapError>(inventory)
    });

    match loaded {
        Ok(inventory) => CommandResult::text(0, ui.devices(&inventory)),
        Err(error) => {
            let (error_class, exit_code) = classify_bootstrap_error(&error);
            CommandResult::failure("inventory", error_class, error.to_string(), exit_code)
        }
    }
}
