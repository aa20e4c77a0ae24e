//! Terminal rendering for the chat and single-command modes.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use netpilot_agent::{Approver, TurnOutcome, TurnStatus};
use netpilot_core::domain::approval::{ApprovalDecision, ApprovalRequest, RiskLevel};
use netpilot_core::inventory::DeviceInventory;
use owo_colors::{OwoColorize, Style};

pub const PROMPT: &str = "User > ";
const APPROVAL_QUESTION: &str = "Proceed with configuration change? (yes/no): ";
const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ui {
    color: bool,
    interactive: bool,
}

impl Ui {
    /// Colors and spinners only when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        let interactive = io::stdout().is_terminal();
        Self { color: interactive && env::var_os("NO_COLOR").is_none(), interactive }
    }

    pub fn plain() -> Self {
        Self { color: false, interactive: false }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn header(&self) -> String {
        [
            self.paint("NetPilot", Style::new().bold().blue()),
            self.paint("Network automation with AI", Style::new().italic()),
            self.paint(
                "Type 'exit' or 'quit' to end the session, '/devices' to list the inventory, '/clear' to clear the screen.",
                Style::new().dimmed(),
            ),
        ]
        .join("\n")
    }

    pub fn prompt(&self) -> String {
        self.paint(PROMPT, Style::new().bold().blue())
    }

    pub fn goodbye(&self) -> String {
        self.paint("Goodbye!", Style::new().bold().blue())
    }

    pub fn interrupted(&self) -> String {
        self.paint("Session interrupted. Goodbye!", Style::new().bold().blue())
    }

    pub fn error(&self, message: &str) -> String {
        format!("{} {message}", self.paint("Error:", Style::new().bold().red()))
    }

    pub fn warning(&self, message: &str) -> String {
        format!("{} {message}", self.paint("Warning:", Style::new().bold().yellow()))
    }

    pub fn devices(&self, inventory: &DeviceInventory) -> String {
        if inventory.is_empty() {
            return self.warning("the inventory has no devices");
        }
        let mut lines = vec![self.paint("Devices:", Style::new().bold().cyan())];
        lines.extend(inventory.devices().map(|device| {
            format!(
                "- {} {}:{} ({})",
                self.paint(&device.name, Style::new().bold()),
                device.host,
                device.port,
                device.device_type
            )
        }));
        lines.join("\n")
    }

    pub fn outcome(&self, outcome: &TurnOutcome) -> String {
        let response = &outcome.response;
        let mut sections = Vec::new();

        for warning in &outcome.warnings {
            sections.push(self.warning(warning));
        }

        if let Some(data) = &response.structured_data {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            sections.push(format!(
                "{}\n{pretty}",
                self.paint("Structured Data:", Style::new().bold().cyan())
            ));
        }

        let summary_style = match outcome.status {
            TurnStatus::Rejected | TurnStatus::Failed => Style::new().red(),
            TurnStatus::Denied => Style::new().yellow(),
            TurnStatus::Answered | TurnStatus::Executed => Style::new(),
        };
        sections.push(format!(
            "{}\n{}",
            self.paint("Summary:", Style::new().bold().green()),
            self.paint(&response.summary, summary_style)
        ));

        if let Some(error) = &response.error {
            sections.push(format!("{} {error}", self.paint("Errors:", Style::new().bold().red())));
        }

        sections.join("\n\n")
    }

    pub fn approval_request(&self, request: &ApprovalRequest) -> String {
        let risk_style = match request.risk_level {
            RiskLevel::Low => Style::new().green(),
            RiskLevel::Medium => Style::new().yellow(),
            RiskLevel::High | RiskLevel::Critical => Style::new().bold().red(),
        };

        let mut lines = vec![
            self.paint("CONFIGURATION CHANGE DETECTED", Style::new().bold().red()),
            format!("Request: {}", request.id.0),
            format!("Risk: {}", self.paint(request.risk_level.as_str(), risk_style)),
            format!("Devices: {}", request.devices().join(", ")),
            "Commands:".to_string(),
        ];
        lines.extend(request.commands().iter().map(|command| format!("  - {command}")));
        if !request.warnings.is_empty() {
            lines.push(self.paint("Warnings:", Style::new().bold().yellow()));
            lines.extend(request.warnings.iter().map(|warning| format!("  - {warning}")));
        }
        lines.join("\n")
    }

    /// Spinner shown while a turn runs. Hidden when stdout is not a terminal.
    pub fn spinner(&self, message: &str) -> ProgressBar {
        if !self.interactive {
            return ProgressBar::hidden();
        }

        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_strings(SPINNER_FRAMES)
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

/// Only `y` and `yes` approve; anything else, including an empty answer, denies.
pub fn parse_decision(answer: &str) -> ApprovalDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approved,
        _ => ApprovalDecision::Denied,
    }
}

pub fn read_decision(input: &mut impl BufRead) -> io::Result<ApprovalDecision> {
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(ApprovalDecision::Denied);
    }
    Ok(parse_decision(&answer))
}

/// Asks the operator on stdin, pausing the turn spinner while waiting.
pub struct TerminalApprover {
    ui: Ui,
    spinner: ProgressBar,
}

impl TerminalApprover {
    pub fn new(ui: Ui, spinner: ProgressBar) -> Self {
        Self { ui, spinner }
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let ui = self.ui;
        let spinner = self.spinner.clone();
        let request = request.clone();

        let answered = tokio::task::spawn_blocking(move || {
            spinner.suspend(|| {
                let mut stdout = io::stdout();
                writeln!(stdout, "\n{}\n", ui.approval_request(&request))?;
                write!(stdout, "{}", ui.paint(APPROVAL_QUESTION, Style::new().bold()))?;
                stdout.flush()?;
                read_decision(&mut io::stdin().lock())
            })
        })
        .await;

        match answered {
            Ok(Ok(decision)) => decision,
            Ok(Err(error)) => {
                tracing::warn!(
                    event_name = "cli.approval.read_failed",
                    error = %error,
                    "could not read approval answer, denying"
                );
                ApprovalDecision::Denied
            }
            Err(error) => {
                tracing::error!(
                    event_name = "cli.approval.prompt_aborted",
                    error = %error,
                    "approval prompt aborted, denying"
                );
                ApprovalDecision::Denied
            }
        }
    }
}
