use netpilot_core::config::{AppConfig, InventorySource, LoadOptions};
use netpilot_core::inventory::DeviceInventory;
use netpilot_db::connect_with_config;
use serde::Serialize;

use crate::app::load_inventory;
use crate::commands::{current_thread_runtime, CommandResult, EXIT_FAILURE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Skipped checks do not fail the report; only explicit failures do.
pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_FAILURE };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_models(&config));
            checks.push(check_ssh_binary(&config));
            let sshpass = check_sshpass();
            let passwords_in_use = sshpass.status == CheckStatus::Pass;
            checks.push(sshpass);
            checks.extend(check_inventory_and_database(&config, passwords_in_use));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in [
                "llm_models",
                "ssh_binary",
                "sshpass",
                "inventory",
                "device_credentials",
                "database_connectivity",
            ] {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_models(config: &AppConfig) -> DoctorCheck {
    DoctorCheck::pass(
        "llm_models",
        format!("{} via {}", config.llm.model_chain().join(" -> "), config.llm.base_url),
    )
}

fn check_ssh_binary(config: &AppConfig) -> DoctorCheck {
    match which::which(&config.ssh.ssh_binary) {
        Ok(path) => DoctorCheck::pass("ssh_binary", format!("found at {}", path.display())),
        Err(error) => {
            DoctorCheck::fail("ssh_binary", format!("`{}` not found: {error}", config.ssh.ssh_binary))
        }
    }
}

fn check_sshpass() -> DoctorCheck {
    match which::which("sshpass") {
        Ok(path) => DoctorCheck::pass(
            "sshpass",
            format!("found at {}; device passwords will be used", path.display()),
        ),
        Err(_) => DoctorCheck::skipped("sshpass", "not installed; only key-based authentication is available"),
    }
}

fn check_inventory_and_database(config: &AppConfig, passwords_in_use: bool) -> Vec<DoctorCheck> {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck::fail("inventory", details.clone()),
                DoctorCheck::skipped("device_credentials", "skipped because inventory did not load"),
                DoctorCheck::fail("database_connectivity", details),
            ];
        }
    };

    runtime.block_on(async {
        let database = match config.inventory.source {
            InventorySource::Sqlite => check_database_connectivity(config).await,
            InventorySource::Yaml => {
                DoctorCheck::skipped("database_connectivity", "inventory source is yaml")
            }
        };

        let (inventory, credentials) = match load_inventory(config).await {
            Ok((inventory, pool)) => {
                if let Some(pool) = pool {
                    pool.close().await;
                }
                if inventory.is_empty() {
                    (
                        DoctorCheck::fail("inventory", "inventory loaded but contains no devices"),
                        DoctorCheck::skipped("device_credentials", "no devices to check"),
                    )
                } else {
                    (
                        DoctorCheck::pass(
                            "inventory",
                            format!(
                                "{} device(s): {}",
                                inventory.len(),
                                inventory.all_device_names().join(", ")
                            ),
                        ),
                        check_device_credentials(&inventory, passwords_in_use),
                    )
                }
            }
            Err(error) => (
                DoctorCheck::fail("inventory", error.to_string()),
                DoctorCheck::skipped("device_credentials", "skipped because inventory did not load"),
            ),
        };

        vec![inventory, credentials, database]
    })
}

/// Missing passwords only matter when sshpass will actually use them.
fn check_device_credentials(inventory: &DeviceInventory, passwords_in_use: bool) -> DoctorCheck {
    let missing: Vec<String> = inventory
        .devices()
        .filter_map(|device| device.resolve_password().err())
        .map(|error| error.to_string())
        .collect();

    if missing.is_empty() {
        return DoctorCheck::pass("device_credentials", "every device password variable is set");
    }
    if passwords_in_use {
        DoctorCheck::fail("device_credentials", missing.join("; "))
    } else {
        DoctorCheck::skipped(
            "device_credentials",
            format!("{} password variable(s) unset; ssh keys will be used", missing.len()),
        )
    }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    match connect_with_config(&config.database).await {
        Ok(pool) => {
            pool.close().await;
            DoctorCheck::pass("database_connectivity", format!("connected using `{}`", config.database.url))
        }
        Err(error) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to connect to database: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
