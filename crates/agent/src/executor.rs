use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use netpilot_core::domain::device::Device;
use netpilot_core::domain::execution::{ExecutionReport, HostResult};
use netpilot_core::inventory::DeviceInventory;

use crate::transport::DeviceTransport;

/// Work sent to every target device of one plan step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceTask {
    Show { commands: Vec<String> },
    Configure { lines: Vec<String> },
}

/// Runs a task against many devices, at most `num_workers` at a time.
pub struct TaskExecutor {
    inventory: Arc<DeviceInventory>,
    transport: Arc<dyn DeviceTransport>,
    workers: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(
        inventory: Arc<DeviceInventory>,
        transport: Arc<dyn DeviceTransport>,
        num_workers: usize,
    ) -> Self {
        Self { inventory, transport, workers: Arc::new(Semaphore::new(num_workers.max(1))) }
    }

    pub fn inventory(&self) -> &DeviceInventory {
        &self.inventory
    }

    pub async fn execute(&self, targets: &[String], task: &DeviceTask) -> ExecutionReport {
        let (valid, invalid) = self.inventory.validate_devices(targets);
        if !invalid.is_empty() {
            let unknown: Vec<String> = invalid.into_iter().collect();
            tracing::warn!(
                event_name = "executor.rejected.unknown_devices",
                unknown = ?unknown,
                "refusing to run task on unknown devices"
            );
            return ExecutionReport::rejected_unknown(&unknown);
        }

        let mut join_set = JoinSet::new();
        for name in &valid {
            let Some(device) = self.inventory.get(name).cloned() else { continue };
            let transport = Arc::clone(&self.transport);
            let workers = Arc::clone(&self.workers);
            let task = task.clone();

            join_set.spawn(async move {
                let result = match workers.acquire_owned().await {
                    Ok(_permit) => run_task(transport.as_ref(), &device, &task).await,
                    Err(_) => HostResult::failed("Worker pool is closed."),
                };
                (device.name, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, result)) => {
                    if result.success {
                        tracing::info!(
                            event_name = "executor.host.succeeded",
                            device = %name,
                            "task completed"
                        );
                    } else {
                        tracing::warn!(
                            event_name = "executor.host.failed",
                            device = %name,
                            error = result.error.as_deref().unwrap_or_default(),
                            "task failed"
                        );
                    }
                    results.insert(name, result);
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "executor.host.panicked",
                        error = %error,
                        "device task aborted"
                    );
                }
            }
        }

        // A task that panicked never reports its name; every target still gets a result.
        for name in valid {
            results
                .entry(name)
                .or_insert_with(|| HostResult::failed("Device task aborted unexpectedly."));
        }

        ExecutionReport::Hosts(results)
    }
}

async fn run_task(transport: &dyn DeviceTransport, device: &Device, task: &DeviceTask) -> HostResult {
    match task {
        DeviceTask::Configure { lines } => match transport.send_config(device, lines).await {
            Ok(output) => HostResult::ok(output),
            Err(error) => HostResult::failed(error.user_message()),
        },
        DeviceTask::Show { commands } => {
            let mut sections = Vec::with_capacity(commands.len());
            for command in commands {
                match transport.send_command(device, command).await {
                    Ok(output) if commands.len() == 1 => return HostResult::ok(output),
                    Ok(output) => sections.push(format!("=== {command} ===\n{output}")),
                    Err(error) => return HostResult::failed(error.user_message()),
                }
            }
            HostResult::ok(sections.join("\n\n"))
        }
    }
}
