use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use netpilot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// Effective configuration, one `- key = value (source: ...)` line per field.
pub fn run(options: LoadOptions) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(EXIT_CONFIG, format!("config validation failed: {error}"))
        }
    };

    let config_file_path = detect_config_path(explicit_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<stderr>".to_string());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    let mut push = |key: &str, value: String, env_keys: &[&str]| {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    };

    push("llm.api_key", api_key, &["NETPILOT_LLM_API_KEY", "GROQ_API_KEY"]);
    push("llm.base_url", config.llm.base_url.clone(), &["NETPILOT_LLM_BASE_URL"]);
    push("llm.model", config.llm.model.clone(), &["NETPILOT_LLM_MODEL", "LLM_MODEL_NAME"]);
    push(
        "llm.fallback_models",
        config.llm.fallback_models.join(", "),
        &["NETPILOT_LLM_FALLBACK_MODELS", "LLM_FALLBACK_MODELS"],
    );
    push("llm.temperature", config.llm.temperature.to_string(), &["NETPILOT_LLM_TEMPERATURE"]);
    push("llm.max_tokens", config.llm.max_tokens.to_string(), &["NETPILOT_LLM_MAX_TOKENS"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["NETPILOT_LLM_TIMEOUT_SECS"]);
    push("llm.max_retries", config.llm.max_retries.to_string(), &["NETPILOT_LLM_MAX_RETRIES"]);

    push(
        "context.max_history_tokens",
        config.context.max_history_tokens.to_string(),
        &["NETPILOT_MAX_HISTORY_TOKENS"],
    );
    push(
        "context.max_message_count",
        config.context.max_message_count.to_string(),
        &["NETPILOT_MAX_MESSAGE_COUNT"],
    );

    push(
        "inventory.source",
        format!("{:?}", config.inventory.source).to_ascii_lowercase(),
        &["NETPILOT_INVENTORY_SOURCE"],
    );
    push(
        "inventory.path",
        config.inventory.path.display().to_string(),
        &["NETPILOT_INVENTORY_PATH"],
    );

    push("database.url", config.database.url.clone(), &["NETPILOT_DATABASE_URL"]);
    push(
        "database.max_connections",
        config.database.max_connections.to_string(),
        &["NETPILOT_DATABASE_MAX_CONNECTIONS"],
    );
    push(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        &["NETPILOT_DATABASE_TIMEOUT_SECS"],
    );

    push("ssh.num_workers", config.ssh.num_workers.to_string(), &["NETPILOT_NUM_WORKERS"]);
    push(
        "ssh.connect_timeout_secs",
        config.ssh.connect_timeout_secs.to_string(),
        &["NETPILOT_SSH_CONNECT_TIMEOUT_SECS"],
    );
    push(
        "ssh.command_timeout_secs",
        config.ssh.command_timeout_secs.to_string(),
        &["NETPILOT_SSH_COMMAND_TIMEOUT_SECS"],
    );
    push("ssh.ssh_binary", config.ssh.ssh_binary.clone(), &["NETPILOT_SSH_BINARY"]);
    push(
        "ssh.strict_host_key_checking",
        config.ssh.strict_host_key_checking.to_string(),
        &["NETPILOT_SSH_STRICT_HOST_KEY_CHECKING"],
    );

    push("logging.level", config.logging.level.clone(), &["NETPILOT_LOG_LEVEL", "LOG_LEVEL"]);
    push(
        "logging.format",
        format!("{:?}", config.logging.format).to_ascii_lowercase(),
        &["NETPILOT_LOG_FORMAT"],
    );
    push("logging.file", log_file, &["NETPILOT_LOG_FILE"]);

    CommandResult::text(0, lines.join("\n"))
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("netpilot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/netpilot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a provider prefix such as `gsk_` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some(index) = trimmed.find(['_', '-']) {
        if (1..=4).contains(&index) {
            return format!("{}***", &trimmed[..=index]);
        }
    }

    "<redacted>".to_string()
}
