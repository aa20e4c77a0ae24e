use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[serde(alias = "show", alias = "read_only")]
    Read,
    #[serde(alias = "config", alias = "configuration")]
    Configure,
}

impl ActionType {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Read => "show_command",
            Self::Configure => "config_command",
        }
    }
}

/// One step of an execution plan: a batch of commands against a set of devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAction {
    pub action_type: ActionType,
    #[serde(default, alias = "device", deserialize_with = "one_or_many")]
    pub devices: Vec<String>,
    #[serde(default, alias = "command", alias = "configs", deserialize_with = "one_or_many")]
    pub commands: Vec<String>,
}

impl NetworkAction {
    pub fn read(devices: &[&str], commands: &[&str]) -> Self {
        Self::new(ActionType::Read, devices, commands)
    }

    pub fn configure(devices: &[&str], commands: &[&str]) -> Self {
        Self::new(ActionType::Configure, devices, commands)
    }

    fn new(action_type: ActionType, devices: &[&str], commands: &[&str]) -> Self {
        Self {
            action_type,
            devices: devices.iter().map(|device| device.to_string()).collect(),
            commands: commands.iter().map(|command| command.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub steps: Vec<NetworkAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<String>,
}

impl ExecutionPlan {
    pub fn direct(response: impl Into<String>) -> Self {
        Self { steps: Vec::new(), direct_response: Some(response.into()) }
    }

    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn requires_approval(&self) -> bool {
        self.steps.iter().any(|step| step.action_type == ActionType::Configure)
    }

    pub fn devices(&self) -> BTreeSet<String> {
        self.steps.iter().flat_map(|step| step.devices.iter().cloned()).collect()
    }

    pub fn configure_steps(&self) -> impl Iterator<Item = &NetworkAction> {
        self.steps.iter().filter(|step| step.action_type == ActionType::Configure)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accepts either a single string or a list of strings.
pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[cfg(test)]
mod tests {
    use super::{ActionType, ExecutionPlan, NetworkAction};

    #[test]
    fn single_strings_are_accepted_as_lists() {
        let plan: ExecutionPlan = serde_json::from_str(
            r#"{"steps":[{"action_type":"read","devices":"R1","command":"show ip int brief"}]}"#,
        )
        .expect("plan should parse");

        assert_eq!(plan.steps, vec![NetworkAction::read(&["R1"], &["show ip int brief"])]);
        assert!(!plan.requires_approval());
    }

    #[test]
    fn any_configure_step_requires_approval() {
        let plan = ExecutionPlan {
            steps: vec![
                NetworkAction::read(&["R1"], &["show run"]),
                NetworkAction::configure(&["R2", "R1"], &["hostname EDGE"]),
            ],
            direct_response: None,
        };

        assert!(plan.requires_approval());
        assert_eq!(plan.devices().into_iter().collect::<Vec<_>>(), vec!["R1", "R2"]);
        assert_eq!(plan.configure_steps().count(), 1);
        assert_eq!(ActionType::Configure.tool_name(), "config_command");
    }

    #[test]
    fn direct_response_plan_has_no_steps() {
        let plan: ExecutionPlan =
            serde_json::from_str(r#"{"direct_response":"Hello"}"#).expect("plan should parse");
        assert!(!plan.has_steps());
        assert_eq!(plan, ExecutionPlan::direct("Hello"));
    }
}
