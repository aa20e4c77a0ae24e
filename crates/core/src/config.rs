use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub inventory: InventoryConfig,
    pub database: DatabaseConfig,
    pub ssh: SshConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub max_history_tokens: usize,
    pub max_message_count: usize,
}

#[derive(Clone, Debug)]
pub struct InventoryConfig {
    pub source: InventorySource,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SshConfig {
    pub num_workers: usize,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub ssh_binary: String,
    pub strict_host_key_checking: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    Yaml,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub inventory_source: Option<InventorySource>,
    pub inventory_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    /// Load a `.env` file into the process environment before reading env vars.
    pub load_env_file: bool,
    pub env_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("could not load env file: {0}")]
    EnvFile(String),
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.groq.com/openai/v1".to_string(),
                model: "openai/gpt-oss-120b".to_string(),
                fallback_models: vec![
                    "openai/gpt-oss-20b".to_string(),
                    "qwen/qwen3-32b".to_string(),
                ],
                temperature: 0.0,
                max_tokens: 2048,
                timeout_secs: 60,
                max_retries: 3,
            },
            context: ContextConfig { max_history_tokens: 20_000, max_message_count: 40 },
            inventory: InventoryConfig {
                source: InventorySource::Yaml,
                path: PathBuf::from("hosts.yaml"),
            },
            database: DatabaseConfig {
                url: "sqlite://inventory.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            ssh: SshConfig {
                num_workers: 20,
                connect_timeout_secs: 10,
                command_timeout_secs: 30,
                ssh_binary: "ssh".to_string(),
                strict_host_key_checking: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
                file: None,
            },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for InventorySource {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported inventory source `{other}` (expected yaml|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    /// Primary model followed by fallbacks, without duplicates.
    pub fn model_chain(&self) -> Vec<String> {
        let mut chain = vec![self.model.clone()];
        for model in &self.fallback_models {
            let model = model.trim();
            if !model.is_empty() && !chain.iter().any(|existing| existing == model) {
                chain.push(model.to_string());
            }
        }
        chain
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        if options.load_env_file {
            load_env_file(options.env_file.as_deref())?;
        }

        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("netpilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(fallback_models) = llm.fallback_models {
                self.llm.fallback_models = fallback_models;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(context) = patch.context {
            if let Some(max_history_tokens) = context.max_history_tokens {
                self.context.max_history_tokens = max_history_tokens;
            }
            if let Some(max_message_count) = context.max_message_count {
                self.context.max_message_count = max_message_count;
            }
        }

        if let Some(inventory) = patch.inventory {
            if let Some(source) = inventory.source {
                self.inventory.source = source;
            }
            if let Some(path) = inventory.path {
                self.inventory.path = path;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(ssh) = patch.ssh {
            if let Some(num_workers) = ssh.num_workers {
                self.ssh.num_workers = num_workers;
            }
            if let Some(connect_timeout_secs) = ssh.connect_timeout_secs {
                self.ssh.connect_timeout_secs = connect_timeout_secs;
            }
            if let Some(command_timeout_secs) = ssh.command_timeout_secs {
                self.ssh.command_timeout_secs = command_timeout_secs;
            }
            if let Some(ssh_binary) = ssh.ssh_binary {
                self.ssh.ssh_binary = ssh_binary;
            }
            if let Some(strict_host_key_checking) = ssh.strict_host_key_checking {
                self.ssh.strict_host_key_checking = strict_host_key_checking;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
            if let Some(file) = logging.file {
                self.logging.file = Some(file);
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key = read_env("NETPILOT_LLM_API_KEY").or_else(|| read_env("GROQ_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("NETPILOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        let model = read_env("NETPILOT_LLM_MODEL").or_else(|| read_env("LLM_MODEL_NAME"));
        if let Some(value) = model {
            self.llm.model = value;
        }
        let fallbacks =
            read_env("NETPILOT_LLM_FALLBACK_MODELS").or_else(|| read_env("LLM_FALLBACK_MODELS"));
        if let Some(value) = fallbacks {
            self.llm.fallback_models = parse_list(&value);
        }
        if let Some(value) = read_env("NETPILOT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("NETPILOT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("NETPILOT_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("NETPILOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("NETPILOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("NETPILOT_MAX_HISTORY_TOKENS") {
            self.context.max_history_tokens = parse_usize("NETPILOT_MAX_HISTORY_TOKENS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_MAX_MESSAGE_COUNT") {
            self.context.max_message_count = parse_usize("NETPILOT_MAX_MESSAGE_COUNT", &value)?;
        }

        if let Some(value) = read_env("NETPILOT_INVENTORY_SOURCE") {
            self.inventory.source = value.parse()?;
        }
        if let Some(value) = read_env("NETPILOT_INVENTORY_PATH") {
            self.inventory.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("NETPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("NETPILOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("NETPILOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("NETPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NETPILOT_NUM_WORKERS") {
            self.ssh.num_workers = parse_usize("NETPILOT_NUM_WORKERS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_SSH_CONNECT_TIMEOUT_SECS") {
            self.ssh.connect_timeout_secs =
                parse_u64("NETPILOT_SSH_CONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_SSH_COMMAND_TIMEOUT_SECS") {
            self.ssh.command_timeout_secs =
                parse_u64("NETPILOT_SSH_COMMAND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("NETPILOT_SSH_BINARY") {
            self.ssh.ssh_binary = value;
        }
        if let Some(value) = read_env("NETPILOT_SSH_STRICT_HOST_KEY_CHECKING") {
            self.ssh.strict_host_key_checking =
                parse_bool("NETPILOT_SSH_STRICT_HOST_KEY_CHECKING", &value)?;
        }

        let log_level = read_env("NETPILOT_LOG_LEVEL").or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value.to_ascii_lowercase();
        }
        if let Some(value) = read_env("NETPILOT_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read_env("NETPILOT_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(value));
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(source) = overrides.inventory_source {
            self.inventory.source = source;
        }
        if let Some(path) = overrides.inventory_path {
            self.inventory.path = path;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_context(&self.context)?;
        validate_inventory(&self.inventory)?;
        validate_database(&self.database)?;
        validate_ssh(&self.ssh)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn load_env_file(explicit_path: Option<&Path>) -> Result<(), ConfigError> {
    let result = match explicit_path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };

    match result {
        Ok(()) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(ConfigError::EnvFile(error.to_string())),
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("netpilot.toml"), PathBuf::from("config/netpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Set GROQ_API_KEY in your .env file or environment"
                .to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    if context.max_history_tokens == 0 {
        return Err(ConfigError::Validation(
            "context.max_history_tokens must be greater than zero".to_string(),
        ));
    }
    if context.max_message_count == 0 {
        return Err(ConfigError::Validation(
            "context.max_message_count must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_inventory(inventory: &InventoryConfig) -> Result<(), ConfigError> {
    if inventory.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("inventory.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_ssh(ssh: &SshConfig) -> Result<(), ConfigError> {
    if ssh.num_workers == 0 {
        return Err(ConfigError::Validation(
            "ssh.num_workers must be greater than zero".to_string(),
        ));
    }

    if ssh.connect_timeout_secs == 0 || ssh.connect_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "ssh.connect_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if ssh.command_timeout_secs == 0 || ssh.command_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "ssh.command_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if ssh.ssh_binary.trim().is_empty() {
        return Err(ConfigError::Validation("ssh.ssh_binary must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    context: Option<ContextPatch>,
    inventory: Option<InventoryPatch>,
    database: Option<DatabasePatch>,
    ssh: Option<SshPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    fallback_models: Option<Vec<String>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    max_history_tokens: Option<usize>,
    max_message_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct InventoryPatch {
    source: Option<InventorySource>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SshPatch {
    num_workers: Option<usize>,
    connect_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    ssh_binary: Option<String>,
    strict_host_key_checking: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
    file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, InventorySource, LoadOptions, LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "GROQ_API_KEY",
        "LLM_MODEL_NAME",
        "LLM_FALLBACK_MODELS",
        "LOG_LEVEL",
        "NETPILOT_LLM_API_KEY",
        "NETPILOT_LLM_MODEL",
        "NETPILOT_LLM_FALLBACK_MODELS",
        "NETPILOT_LLM_TEMPERATURE",
        "NETPILOT_INVENTORY_SOURCE",
        "NETPILOT_INVENTORY_PATH",
        "NETPILOT_NUM_WORKERS",
        "NETPILOT_LOG_LEVEL",
        "NETPILOT_LOG_FORMAT",
        "NETPILOT_TEST_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in MANAGED_VARS {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn with_clean_env<F>(vars: &[(&str, &str)], body: F) -> Result<(), String>
    where
        F: FnOnce() -> Result<(), String>,
    {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = body();
        clear_vars();
        result
    }

    #[test]
    fn groq_api_key_alias_is_accepted() -> Result<(), String> {
        with_clean_env(&[("GROQ_API_KEY", "gsk-alias")], || {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let key = config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(key.as_deref() == Some("gsk-alias"), "api key should come from GROQ_API_KEY")?;
            ensure(
                config.inventory.source == InventorySource::Yaml,
                "yaml inventory should be the default source",
            )?;
            ensure(config.ssh.num_workers == 20, "default worker count should be 20")
        })
    }

    #[test]
    fn missing_api_key_fails_with_actionable_error() -> Result<(), String> {
        with_clean_env(&[], || {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("GROQ_API_KEY")
            );
            ensure(has_message, "validation failure should mention GROQ_API_KEY")
        })
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        with_clean_env(&[("NETPILOT_TEST_KEY", "gsk-from-env")], || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("netpilot.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${NETPILOT_TEST_KEY}"
model = "llama-3.3-70b-versatile"

[inventory]
source = "sqlite"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(key.as_deref() == Some("gsk-from-env"), "api key should be interpolated")?;
            ensure(config.llm.model == "llama-3.3-70b-versatile", "model should come from file")?;
            ensure(
                config.inventory.source == InventorySource::Sqlite,
                "inventory source should come from file",
            )
        })
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        with_clean_env(
            &[("GROQ_API_KEY", "gsk-env"), ("NETPILOT_INVENTORY_PATH", "from-env.yaml")],
            || {
                let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
                let path = dir.path().join("netpilot.toml");
                fs::write(
                    &path,
                    r#"
[inventory]
path = "from-file.yaml"

[ssh]
num_workers = 4

[logging]
level = "warn"
"#,
                )
                .map_err(|err| err.to_string())?;

                let config = AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    overrides: ConfigOverrides {
                        log_level: Some("debug".to_string()),
                        ..ConfigOverrides::default()
                    },
                    ..LoadOptions::default()
                })
                .map_err(|err| format!("config load failed: {err}"))?;

                ensure(
                    config.inventory.path == PathBuf::from("from-env.yaml"),
                    "env inventory path should win over file",
                )?;
                ensure(config.ssh.num_workers == 4, "file worker count should win over default")?;
                ensure(config.logging.level == "debug", "override log level should win")
            },
        )
    }

    #[test]
    fn fallback_chain_skips_primary_and_duplicates() -> Result<(), String> {
        with_clean_env(
            &[
                ("GROQ_API_KEY", "gsk-test"),
                ("LLM_MODEL_NAME", "openai/gpt-oss-20b"),
                ("LLM_FALLBACK_MODELS", "openai/gpt-oss-20b, qwen/qwen3-32b,,qwen/qwen3-32b"),
            ],
            || {
                let config = AppConfig::load(LoadOptions::default())
                    .map_err(|err| format!("config load failed: {err}"))?;
                ensure(
                    config.llm.model_chain()
                        == vec!["openai/gpt-oss-20b".to_string(), "qwen/qwen3-32b".to_string()],
                    "model chain should be primary followed by unique fallbacks",
                )
            },
        )
    }

    #[test]
    fn invalid_numeric_override_is_rejected() -> Result<(), String> {
        with_clean_env(&[("GROQ_API_KEY", "gsk-test"), ("NETPILOT_NUM_WORKERS", "many")], || {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "NETPILOT_NUM_WORKERS"
            );
            ensure(rejected, "non-numeric worker count should be rejected")
        })
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        with_clean_env(&[("GROQ_API_KEY", "gsk-secret-value"), ("LOG_LEVEL", "WARN")], || {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("gsk-secret-value"), "debug output should not contain api key")?;
            ensure(config.logging.level == "warn", "legacy LOG_LEVEL should be normalized")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })
    }
}
