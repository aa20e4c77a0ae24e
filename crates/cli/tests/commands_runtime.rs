use std::env;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};

use netpilot_agent::llm::ScriptedLlmClient;
use netpilot_agent::runtime::StaticApprover;
use netpilot_agent::transport::{RecordingTransport, TransportCall};
use netpilot_agent::TurnStatus;
use netpilot_cli::app::Application;
use netpilot_cli::commands::chat::{ChatSession, TurnError};
use netpilot_cli::commands::{config, doctor, import_inventory, inventory};
use netpilot_cli::ui::Ui;
use netpilot_core::config::{AppConfig, LoadOptions};
use netpilot_core::domain::approval::ApprovalDecision;
use netpilot_db::YamlInventory;
use serde_json::Value;
use tempfile::TempDir;

const HOSTS: &str = r#"
devices:
  - name: R1
    host: 192.0.2.1
    username: admin
    password_env_var: R1_PASSWORD
    device_type: cisco_ios
  - name: SW1
    host: 192.0.2.2
    username: admin
    password_env_var: SW1_PASSWORD
    device_type: arista_eos
    port: 2222
"#;

#[test]
fn config_redacts_api_key_and_reports_env_source() {
    with_env(&[("GROQ_API_KEY", "gsk_supersecretvalue"), ("NETPILOT_NUM_WORKERS", "8")], || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 0, "{}", result.output);

        assert!(result.output.contains("- llm.api_key = gsk_*** (source: env (GROQ_API_KEY))"));
        assert!(result.output.contains("- ssh.num_workers = 8 (source: env (NETPILOT_NUM_WORKERS))"));
        assert!(result.output.contains("- ssh.ssh_binary = ssh (source: default)"));
        assert!(!result.output.contains("supersecretvalue"));
    });
}

#[test]
fn config_attributes_values_to_an_explicit_file() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("netpilot.toml");
        fs::write(&path, "[llm]\napi_key = \"gsk_fromfile\"\nmodel = \"qwen/qwen3-32b\"\n")
            .expect("write config");

        let options = LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        };
        let result = config::run(options);

        assert_eq!(result.exit_code, 0, "{}", result.output);
        let expected =
            format!("- llm.model = qwen/qwen3-32b (source: file ({}))", path.display());
        assert!(result.output.contains(&expected), "{}", result.output);
        let expected = format!("- llm.api_key = gsk_*** (source: file ({}))", path.display());
        assert!(result.output.contains(&expected), "{}", result.output);
        assert!(!result.output.contains("fromfile"));
    });
}

#[test]
fn invalid_env_value_is_a_config_failure() {
    with_env(&[("GROQ_API_KEY", "gsk_test"), ("NETPILOT_NUM_WORKERS", "many")], || {
        let result = inventory::run(LoadOptions::default(), Ui::plain());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "inventory");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn inventory_lists_yaml_devices() {
    let dir = TempDir::new().expect("temp dir");
    let hosts = dir.path().join("hosts.yaml");
    fs::write(&hosts, HOSTS).expect("write hosts");
    let hosts_path = hosts.display().to_string();

    let vars = [("GROQ_API_KEY", "gsk_test"), ("NETPILOT_INVENTORY_PATH", hosts_path.as_str())];
    with_env(&vars, || {
        let result = inventory::run(LoadOptions::default(), Ui::plain());
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.contains("- R1 192.0.2.1:22 (cisco_ios)"));
        assert!(result.output.contains("- SW1 192.0.2.2:2222 (arista_eos)"));
    });
}

#[test]
fn import_inventory_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let hosts = dir.path().join("hosts.yaml");
    fs::write(&hosts, HOSTS).expect("write hosts");
    let database_url = format!("sqlite://{}", dir.path().join("inventory.db").display());

    let vars = [("GROQ_API_KEY", "gsk_test"), ("NETPILOT_DATABASE_URL", database_url.as_str())];
    with_env(&vars, || {
        let first = import_inventory::run(LoadOptions::default(), Some(hosts.clone()));
        assert_eq!(first.exit_code, 0, "{}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "import-inventory");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or("").contains("2 added"));

        let second = import_inventory::run(LoadOptions::default(), Some(hosts.clone()));
        let payload = parse_payload(&second.output);
        assert!(payload["message"].as_str().unwrap_or("").contains("2 already present"));
    });

    with_env(
        &[
            ("GROQ_API_KEY", "gsk_test"),
            ("NETPILOT_DATABASE_URL", database_url.as_str()),
            ("NETPILOT_INVENTORY_SOURCE", "sqlite"),
        ],
        || {
            let result = inventory::run(LoadOptions::default(), Ui::plain());
            assert_eq!(result.exit_code, 0, "{}", result.output);
            assert!(result.output.contains("- SW1 192.0.2.2:2222 (arista_eos)"));
        },
    );
}

#[test]
fn doctor_fails_on_missing_ssh_binary_and_skips_database_for_yaml() {
    let dir = TempDir::new().expect("temp dir");
    let hosts = dir.path().join("hosts.yaml");
    fs::write(&hosts, HOSTS).expect("write hosts");
    let hosts_path = hosts.display().to_string();

    with_env(
        &[
            ("GROQ_API_KEY", "gsk_test"),
            ("NETPILOT_INVENTORY_PATH", hosts_path.as_str()),
            ("NETPILOT_SSH_BINARY", "netpilot-missing-ssh"),
        ],
        || {
            let result = doctor::run(LoadOptions::default(), true);
            assert_eq!(result.exit_code, 1);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");

            let checks = report["checks"].as_array().cloned().unwrap_or_default();
            let status_of = |name: &str| {
                checks
                    .iter()
                    .find(|check| check["name"] == name)
                    .map(|check| check["status"].clone())
                    .unwrap_or(Value::Null)
            };
            assert_eq!(status_of("config_validation"), "pass");
            assert_eq!(status_of("llm_models"), "pass");
            assert_eq!(status_of("ssh_binary"), "fail");
            assert_eq!(status_of("inventory"), "pass");
            assert_eq!(status_of("database_connectivity"), "skipped");
        },
    );
}

#[test]
fn doctor_reports_config_failure_in_human_form() {
    with_env(&[("NETPILOT_LOG_FORMAT", "xml")], || {
        let result = doctor::run(LoadOptions::default(), false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] inventory: skipped because configuration did not load"));
    });
}

fn application(replies: &[&str]) -> (Application, Arc<ScriptedLlmClient>, Arc<RecordingTransport>) {
    let inventory = YamlInventory::parse("hosts.yaml".into(), HOSTS).expect("hosts").to_inventory();
    let llm = Arc::new(ScriptedLlmClient::new(replies.iter().copied()));
    let transport = Arc::new(RecordingTransport::default());
    let app = Application::assemble(
        AppConfig::default(),
        inventory,
        llm.clone(),
        transport.clone(),
        None,
    )
    .expect("application");
    (app, llm, transport)
}

#[tokio::test]
async fn device_flag_targets_requests_without_an_on_clause() {
    let (app, llm, transport) = application(&[
        r#"{"steps":[{"action_type":"read","devices":["SW1"],"commands":["show vlan"]}]}"#,
        r#"{"summary":"VLAN 10 and 20 are active on SW1."}"#,
    ]);
    let session = ChatSession::new(&app, Some("SW1"));

    let outcome = session
        .respond("show vlan", &StaticApprover(ApprovalDecision::Denied))
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Executed);
    assert_eq!(outcome.response.summary, "VLAN 10 and 20 are active on SW1.");
    assert_eq!(
        transport.calls(),
        vec![TransportCall::Command { device: "SW1".to_string(), command: "show vlan".to_string() }]
    );

    let requests = llm.requests();
    let planner_request = &requests[0];
    assert_eq!(
        planner_request.last().map(|message| message.content.as_str()),
        Some("Execute on SW1: show vlan")
    );
}

#[tokio::test]
async fn on_clause_overrides_the_default_device() {
    let (app, llm, _transport) = application(&[
        r#"{"steps":[],"direct_response":"R1 is a cisco_ios router."}"#,
    ]);
    let session = ChatSession::new(&app, Some("SW1"));

    let outcome = session
        .respond("what platform is this on R1", &StaticApprover(ApprovalDecision::Denied))
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Answered);
    let requests = llm.requests();
    assert_eq!(
        requests[0].last().map(|message| message.content.as_str()),
        Some("Execute on R1: what platform is this")
    );
}

#[tokio::test]
async fn unknown_device_is_rejected_before_the_llm() {
    let (app, llm, transport) = application(&[]);
    let session = ChatSession::new(&app, None);

    let error = session
        .respond("show version on R9", &StaticApprover(ApprovalDecision::Approved))
        .await
        .expect_err("unknown device");

    assert!(matches!(error, TurnError::Command(_)));
    assert!(error.to_string().contains("Unknown devices: R9"));
    assert!(llm.requests().is_empty());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn approved_config_reaches_the_device_in_one_session() {
    let (app, _llm, transport) = application(&[
        r#"{"steps":[{"action_type":"configure","devices":["SW1"],"commands":["vlan 30","name GUESTS"]}]}"#,
        r#"{"summary":"VLAN 30 created on SW1."}"#,
    ]);
    let session = ChatSession::new(&app, None);

    let outcome = session
        .respond("add vlan 30 named GUESTS on SW1", &StaticApprover(ApprovalDecision::Approved))
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Executed);
    assert_eq!(
        outcome.approval.as_ref().map(|record| record.decision),
        Some(ApprovalDecision::Approved)
    );
    assert_eq!(
        transport.calls(),
        vec![TransportCall::Config {
            device: "SW1".to_string(),
            lines: vec!["vlan 30".to_string(), "name GUESTS".to_string()],
        }]
    );

    let conversation =
        app.agent.sessions().conversation(session.session_id()).await.expect("conversation");
    assert!(conversation.messages.len() >= 2);
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "GROQ_API_KEY",
        "LLM_MODEL_NAME",
        "LLM_FALLBACK_MODELS",
        "LOG_LEVEL",
        "NETPILOT_LLM_API_KEY",
        "NETPILOT_LLM_BASE_URL",
        "NETPILOT_LLM_MODEL",
        "NETPILOT_LLM_FALLBACK_MODELS",
        "NETPILOT_LLM_TEMPERATURE",
        "NETPILOT_LLM_MAX_TOKENS",
        "NETPILOT_LLM_TIMEOUT_SECS",
        "NETPILOT_LLM_MAX_RETRIES",
        "NETPILOT_MAX_HISTORY_TOKENS",
        "NETPILOT_MAX_MESSAGE_COUNT",
        "NETPILOT_INVENTORY_SOURCE",
        "NETPILOT_INVENTORY_PATH",
        "NETPILOT_DATABASE_URL",
        "NETPILOT_DATABASE_MAX_CONNECTIONS",
        "NETPILOT_DATABASE_TIMEOUT_SECS",
        "NETPILOT_NUM_WORKERS",
        "NETPILOT_SSH_CONNECT_TIMEOUT_SECS",
        "NETPILOT_SSH_COMMAND_TIMEOUT_SECS",
        "NETPILOT_SSH_BINARY",
        "NETPILOT_SSH_STRICT_HOST_KEY_CHECKING",
        "NETPILOT_LOG_LEVEL",
        "NETPILOT_LOG_FORMAT",
        "NETPILOT_LOG_FILE",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
