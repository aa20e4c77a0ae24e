//! Interactive chat and single-command modes.

use std::io::{self, BufRead, Write};

use netpilot_agent::{Approver, TurnOutcome};
use netpilot_core::command::{build_prompt, parse_command, validate_command};
use netpilot_core::config::{AppConfig, LoadOptions};
use netpilot_core::errors::DomainError;
use thiserror::Error;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::app::{bootstrap, Application};
use crate::commands::{
    classify_bootstrap_error, CommandResult, EXIT_CONFIG, EXIT_FAILURE, EXIT_RUNTIME,
};
use crate::logging::init_logging;
use crate::ui::{TerminalApprover, Ui};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[1;1H";

/// How the binary was asked to run when no subcommand is given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionRequest {
    pub words: Vec<String>,
    pub chat: bool,
    pub device: Option<String>,
    pub debug: bool,
}

impl SessionRequest {
    pub fn is_interactive(&self) -> bool {
        self.chat || self.words.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatInput {
    Exit,
    Clear,
    Devices,
    Empty,
    Prompt(String),
}

pub fn classify_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => ChatInput::Empty,
        "exit" | "quit" | "q" | "/exit" | "/quit" | "/q" => ChatInput::Exit,
        "/clear" => ChatInput::Clear,
        "/devices" => ChatInput::Devices,
        _ => ChatInput::Prompt(trimmed.to_string()),
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    Command(#[from] DomainError),
    #[error("Error processing command: {0:#}")]
    Agent(#[source] anyhow::Error),
}

/// One conversation. Every turn shares the session id, so history carries over.
pub struct ChatSession<'a> {
    app: &'a Application,
    session_id: String,
    default_device: Option<String>,
}

impl<'a> ChatSession<'a> {
    pub fn new(app: &'a Application, default_device: Option<&str>) -> Self {
        Self {
            app,
            session_id: Uuid::new_v4().to_string(),
            default_device: default_device.map(str::to_string),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn respond(
        &self,
        text: &str,
        approver: &dyn Approver,
    ) -> Result<TurnOutcome, TurnError> {
        let parsed = parse_command(text, self.default_device.as_deref());
        validate_command(&parsed, &self.app.inventory)?;

        let target = parsed.has_device_context.then(|| parsed.devices.join(", "));
        let prompt = build_prompt(&parsed.command, target.as_deref());

        self.app.agent.handle(&self.session_id, &prompt, approver).await.map_err(TurnError::Agent)
    }
}

pub fn run(options: LoadOptions, request: SessionRequest, ui: Ui) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(EXIT_CONFIG, ui.error(&format!("configuration issue: {error}")))
        }
    };

    if let Err(error) = init_logging(&config.logging, request.debug) {
        return CommandResult::text(EXIT_CONFIG, ui.error(&format!("could not open log file: {error}")));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::text(
                EXIT_RUNTIME,
                ui.error(&format!("failed to initialize async runtime: {error}")),
            )
        }
    };

    let app = match runtime.block_on(bootstrap(config)) {
        Ok(app) => app,
        Err(error) => {
            let (error_class, exit_code) = classify_bootstrap_error(&error);
            tracing::error!(
                event_name = "system.bootstrap.failed",
                error_class,
                error = %error,
                "startup failed"
            );
            return CommandResult::text(exit_code, ui.error(&error.to_string()));
        }
    };

    let exit_code = if request.is_interactive() {
        match run_interactive(&app, &runtime, ui, request.device.as_deref()) {
            Ok(()) => 0,
            Err(error) => {
                tracing::error!(event_name = "cli.chat.io_failed", error = %error, "terminal i/o failed");
                EXIT_FAILURE
            }
        }
    } else {
        run_single(&app, &runtime, ui, &request.words.join(" "), request.device.as_deref())
    };

    CommandResult::text(exit_code, String::new())
}

/// Turn failures are shown to the operator; only startup problems change the exit code.
fn run_single(
    app: &Application,
    runtime: &Runtime,
    ui: Ui,
    command: &str,
    device: Option<&str>,
) -> u8 {
    let session = ChatSession::new(app, device);
    match run_turn(&session, runtime, ui, command) {
        Ok(outcome) => println!("{}", ui.outcome(&outcome)),
        Err(error) => println!("{}", ui.error(&error.to_string())),
    }
    0
}

fn run_interactive(
    app: &Application,
    runtime: &Runtime,
    ui: Ui,
    device: Option<&str>,
) -> io::Result<()> {
    let session = ChatSession::new(app, device);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    tracing::info!(
        event_name = "cli.chat.started",
        session_id = session.session_id(),
        "interactive session started"
    );
    writeln!(stdout, "{}\n", ui.header())?;

    loop {
        write!(stdout, "{}", ui.prompt())?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout, "\n{}", ui.interrupted())?;
            break;
        }

        match classify_input(&line) {
            ChatInput::Exit => {
                writeln!(stdout, "{}", ui.goodbye())?;
                break;
            }
            ChatInput::Clear => write!(stdout, "{CLEAR_SCREEN}")?,
            ChatInput::Devices => writeln!(stdout, "{}\n", ui.devices(&app.inventory))?,
            ChatInput::Empty => {}
            ChatInput::Prompt(text) => match run_turn(&session, runtime, ui, &text) {
                Ok(outcome) => writeln!(stdout, "{}\n", ui.outcome(&outcome))?,
                Err(error) => writeln!(stdout, "{}\n", ui.error(&error.to_string()))?,
            },
        }
    }

    tracing::info!(
        event_name = "cli.chat.ended",
        session_id = session.session_id(),
        "interactive session ended"
    );
    Ok(())
}

fn run_turn(
    session: &ChatSession<'_>,
    runtime: &Runtime,
    ui: Ui,
    text: &str,
) -> Result<TurnOutcome, TurnError> {
    let spinner = ui.spinner("Analyzing request...");
    let approver = TerminalApprover::new(ui, spinner.clone());
    let result = runtime.block_on(session.respond(text, &approver));
    spinner.finish_and_clear();

    if let Err(error) = &result {
        tracing::warn!(
            event_name = "cli.turn.failed",
            session_id = session.session_id(),
            error = %error,
            "turn did not complete"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{classify_input, ChatInput, SessionRequest};

    #[test]
    fn exit_words_and_slash_commands_are_recognised() {
        for word in ["exit", "QUIT", "q", "/exit", "/quit", " /q \n"] {
            assert_eq!(classify_input(word), ChatInput::Exit, "{word:?}");
        }
        assert_eq!(classify_input("/clear"), ChatInput::Clear);
        assert_eq!(classify_input("/devices"), ChatInput::Devices);
        assert_eq!(classify_input("   \n"), ChatInput::Empty);
        assert_eq!(
            classify_input("show ip int brief on R1\n"),
            ChatInput::Prompt("show ip int brief on R1".to_string())
        );
    }

    #[test]
    fn chat_is_the_default_without_words() {
        assert!(SessionRequest::default().is_interactive());

        let single = SessionRequest { words: vec!["show".into(), "version".into()], ..Default::default() };
        assert!(!single.is_interactive());

        let forced = SessionRequest { chat: true, ..single };
        assert!(forced.is_interactive());
    }
}
