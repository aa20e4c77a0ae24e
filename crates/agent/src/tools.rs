use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use netpilot_core::domain::plan::one_or_many;
use netpilot_core::safety::{check_config_commands, check_show_command, clean_config_lines};

use crate::executor::{DeviceTask, TaskExecutor};

pub const SHOW_COMMAND: &str = "show_command";
pub const CONFIG_COMMAND: &str = "config_command";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding the show and config tools backed by `executor`.
    pub fn network(executor: Arc<TaskExecutor>) -> Self {
        let mut registry = Self::default();
        registry.register(ShowCommandTool { executor: Arc::clone(&executor) });
        registry.register(ConfigCommandTool { executor });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ToolInput {
    #[serde(alias = "device", deserialize_with = "one_or_many")]
    devices: Vec<String>,
    #[serde(alias = "command", alias = "configs", deserialize_with = "one_or_many")]
    commands: Vec<String>,
}

fn parse_input(input: Value) -> Result<ToolInput> {
    serde_json::from_value(input).context("invalid tool input")
}

pub struct ShowCommandTool {
    executor: Arc<TaskExecutor>,
}

#[async_trait]
impl Tool for ShowCommandTool {
    fn name(&self) -> &'static str {
        SHOW_COMMAND
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input = parse_input(input)?;
        let commands: Vec<String> = input
            .commands
            .iter()
            .map(|command| command.trim().to_string())
            .filter(|command| !command.is_empty())
            .collect();
        for command in &commands {
            check_show_command(command)?;
        }

        let report = self.executor.execute(&input.devices, &DeviceTask::Show { commands }).await;
        Ok(serde_json::to_value(report)?)
    }
}

pub struct ConfigCommandTool {
    executor: Arc<TaskExecutor>,
}

#[async_trait]
impl Tool for ConfigCommandTool {
    fn name(&self) -> &'static str {
        CONFIG_COMMAND
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input = parse_input(input)?;
        let lines = clean_config_lines(&input.commands)?;
        check_config_commands(&lines)?;

        let report = self.executor.execute(&input.devices, &DeviceTask::Configure { lines }).await;
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use netpilot_core::domain::device::Device;
    use netpilot_core::inventory::DeviceInventory;

    use super::{ToolRegistry, CONFIG_COMMAND, SHOW_COMMAND};
    use crate::executor::TaskExecutor;
    use crate::transport::{RecordingTransport, TransportCall};

    fn registry(transport: Arc<RecordingTransport>) -> ToolRegistry {
        let inventory = DeviceInventory::new(vec![Device {
            name: "SW1".to_string(),
            host: "192.0.2.2".to_string(),
            username: "admin".to_string(),
            password_env_var: "SW1_PASSWORD".to_string(),
            device_type: "arista_eos".to_string(),
            port: 22,
        }]);
        ToolRegistry::network(Arc::new(TaskExecutor::new(Arc::new(inventory), transport, 4)))
    }

    #[tokio::test]
    async fn show_tool_returns_host_results() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = registry(transport.clone());
        assert_eq!(registry.len(), 2);

        let output = registry
            .invoke(SHOW_COMMAND, json!({ "devices": ["SW1"], "command": "show vlan" }))
            .await
            .expect("show output");

        assert_eq!(output, json!({ "SW1": { "success": true, "output": "SW1# show vlan\nok" } }));
    }

    #[tokio::test]
    async fn config_tool_cleans_lines_before_sending() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = registry(transport.clone());

        registry
            .invoke(
                CONFIG_COMMAND,
                json!({ "devices": ["SW1"], "configs": ["vlan 10\n  name USERS\n", ""] }),
            )
            .await
            .expect("config output");

        assert_eq!(
            transport.calls(),
            vec![TransportCall::Config {
                device: "SW1".to_string(),
                lines: vec!["vlan 10".to_string(), "name USERS".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn unsafe_commands_never_reach_the_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = registry(transport.clone());

        let show = registry
            .invoke(SHOW_COMMAND, json!({ "devices": ["SW1"], "commands": ["reload"] }))
            .await;
        let config = registry
            .invoke(CONFIG_COMMAND, json!({ "devices": ["SW1"], "commands": ["write erase"] }))
            .await;
        let unknown = registry.invoke("verify_changes", json!({})).await;

        assert!(show.is_err());
        assert!(config.expect_err("blocked").to_string().contains("Blocked dangerous command"));
        assert!(unknown.is_err());
        assert!(transport.calls().is_empty());
    }
}
