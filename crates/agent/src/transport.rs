//! Device transport over the system OpenSSH client.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use netpilot_core::config::SshConfig;
use netpilot_core::domain::device::Device;
use netpilot_core::errors::DomainError;

const TIMEOUT_MESSAGE: &str = "Connection timed out. Check connectivity and firewall rules.";
const AUTH_MESSAGE: &str = "Authentication failed. Check device credentials.";

/// sshpass exit status for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to `{device}` timed out after {seconds}s")]
    Timeout { device: String, seconds: u64 },
    #[error("authentication failed for `{device}`: {detail}")]
    Authentication { device: String, detail: String },
    #[error(transparent)]
    Credential(#[from] DomainError),
    #[error("failed to launch `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("`{device}` command failed: {message}")]
    Command { device: String, message: String },
}

impl TransportError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => TIMEOUT_MESSAGE.to_string(),
            Self::Authentication { .. } => AUTH_MESSAGE.to_string(),
            Self::Credential(error) => error.to_string(),
            Self::Spawn { .. } => self.to_string(),
            Self::Command { message, .. } => message.clone(),
        }
    }
}

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn send_command(&self, device: &Device, command: &str) -> Result<String, TransportError>;

    /// Applies `lines` inside the platform's config mode.
    async fn send_config(&self, device: &Device, lines: &[String]) -> Result<String, TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SshAuth {
    /// Password from the device's env var, passed to `sshpass -e` via `SSHPASS`.
    Password { sshpass: PathBuf },
    /// Keys or agent only, never prompting.
    Key,
}

impl SshAuth {
    pub fn detect() -> Self {
        match which::which("sshpass") {
            Ok(sshpass) => Self::Password { sshpass },
            Err(_) => Self::Key,
        }
    }
}

#[derive(Debug)]
pub struct SshInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, SecretString)>,
}

#[derive(Clone, Debug)]
pub struct SshTransport {
    settings: SshConfig,
    auth: SshAuth,
}

impl SshTransport {
    pub fn new(settings: SshConfig) -> Self {
        let auth = SshAuth::detect();
        tracing::debug!(event_name = "transport.ssh.auth_mode", auth = ?auth, "ssh auth mode selected");
        Self::with_auth(settings, auth)
    }

    pub fn with_auth(settings: SshConfig, auth: SshAuth) -> Self {
        Self { settings, auth }
    }

    pub fn auth(&self) -> &SshAuth {
        &self.auth
    }

    pub fn invocation(
        &self,
        device: &Device,
        remote_command: Option<&str>,
    ) -> Result<SshInvocation, TransportError> {
        let mut ssh_args = vec![
            "-p".to_string(),
            device.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
        ];

        if self.settings.strict_host_key_checking {
            ssh_args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
        } else {
            ssh_args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        }

        let mut env = Vec::new();
        let program = match &self.auth {
            SshAuth::Key => {
                ssh_args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
                self.settings.ssh_binary.clone()
            }
            SshAuth::Password { sshpass } => {
                env.push(("SSHPASS".to_string(), device.resolve_password()?));
                ssh_args.extend([
                    "-o".to_string(),
                    "PreferredAuthentications=password,keyboard-interactive".to_string(),
                    "-o".to_string(),
                    "NumberOfPasswordPrompts=1".to_string(),
                ]);
                ssh_args.insert(0, self.settings.ssh_binary.clone());
                ssh_args.insert(0, "-e".to_string());
                sshpass.display().to_string()
            }
        };

        ssh_args.push("-T".to_string());
        ssh_args.push(format!("{}@{}", device.username, device.host));
        if let Some(command) = remote_command {
            ssh_args.push(command.to_string());
        }

        Ok(SshInvocation { program, args: ssh_args, env })
    }

    async fn run(
        &self,
        device: &Device,
        invocation: SshInvocation,
        stdin: Option<String>,
    ) -> Result<String, TransportError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            command.env(key, value.expose_secret());
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if let (Some(script), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(script.as_bytes())
                .await
                .map_err(|error| TransportError::Command {
                    device: device.name.clone(),
                    message: format!("could not write session input: {error}"),
                })?;
        }

        let seconds = self.settings.command_timeout_secs;
        let output = match tokio::time::timeout(Duration::from_secs(seconds), child.wait_with_output())
            .await
        {
            Ok(result) => result.map_err(|error| TransportError::Command {
                device: device.name.clone(),
                message: error.to_string(),
            })?,
            Err(_) => return Err(TransportError::Timeout { device: device.name.clone(), seconds }),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(device, output.status.code(), &stderr, seconds))
    }
}

/// Maps a failed ssh/sshpass exit into a transport error.
pub fn classify_failure(device: &Device, code: Option<i32>, stderr: &str, seconds: u64) -> TransportError {
    let lowered = stderr.to_lowercase();
    if code == Some(SSHPASS_BAD_PASSWORD)
        || lowered.contains("permission denied")
        || lowered.contains("authentication failed")
        || lowered.contains("too many authentication failures")
    {
        return TransportError::Authentication {
            device: device.name.clone(),
            detail: stderr.to_string(),
        };
    }

    if lowered.contains("timed out") || lowered.contains("no route to host") {
        return TransportError::Timeout { device: device.name.clone(), seconds };
    }

    let message = if stderr.is_empty() {
        format!("exit status {}", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))
    } else {
        stderr.to_string()
    };
    TransportError::Command { device: device.name.clone(), message }
}

#[async_trait]
impl DeviceTransport for SshTransport {
    async fn send_command(&self, device: &Device, command: &str) -> Result<String, TransportError> {
        tracing::debug!(
            event_name = "transport.ssh.command",
            device = %device.name,
            host = %device.host,
            command = %command,
            "sending show command"
        );
        let invocation = self.invocation(device, Some(command))?;
        self.run(device, invocation, None).await
    }

    async fn send_config(&self, device: &Device, lines: &[String]) -> Result<String, TransportError> {
        let script = device.platform().config_session(lines).join("\n") + "\n";
        tracing::debug!(
            event_name = "transport.ssh.config",
            device = %device.name,
            host = %device.host,
            platform = device.platform().as_str(),
            lines = lines.len(),
            "sending config session"
        );
        let invocation = self.invocation(device, None)?;
        self.run(device, invocation, Some(script)).await
    }
}

/// One recorded call on a [`RecordingTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    Command { device: String, command: String },
    Config { device: String, lines: Vec<String> },
}

/// In-memory transport that records calls and answers from canned per-device replies.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    failures: BTreeMap<String, String>,
}

impl RecordingTransport {
    /// Makes every call to `device` fail with a command error carrying `message`.
    pub fn failing(mut self, device: &str, message: &str) -> Self {
        self.failures.insert(device.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, call: TransportCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    fn reply(&self, device: &Device, output: String) -> Result<String, TransportError> {
        match self.failures.get(&device.name) {
            Some(message) => {
                Err(TransportError::Command { device: device.name.clone(), message: message.clone() })
            }
            None => Ok(output),
        }
    }
}

#[async_trait]
impl DeviceTransport for RecordingTransport {
    async fn send_command(&self, device: &Device, command: &str) -> Result<String, TransportError> {
        self.record(TransportCall::Command {
            device: device.name.clone(),
            command: command.to_string(),
        });
        self.reply(device, format!("{}# {command}\nok", device.name))
    }

    async fn send_config(&self, device: &Device, lines: &[String]) -> Result<String, TransportError> {
        self.record(TransportCall::Config { device: device.name.clone(), lines: lines.to_vec() });
        self.reply(device, format!("{}(config)# {} lines applied", device.name, lines.len()))
    }
}
