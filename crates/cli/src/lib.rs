pub mod app;
pub mod commands;
pub mod logging;
pub mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use netpilot_core::config::{AppConfig, LoadOptions, LoggingConfig};

use crate::commands::chat::SessionRequest;
use crate::logging::init_logging;
use crate::ui::Ui;

#[derive(Debug, Parser)]
#[command(
    name = "netpilot",
    about = "Natural-language automation for network devices",
    long_about = "Describe what you want done on your routers and switches. Show commands run directly; configuration changes wait for your approval.",
    after_help = "Examples:\n  netpilot\n  netpilot show ip interface brief on R1\n  netpilot --device SW1 \"add vlan 30 named GUESTS\"\n  netpilot doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Request to run once (omit for interactive chat)
    #[arg(value_name = "COMMAND")]
    words: Vec<String>,

    /// Start interactive chat mode (default when no command is given)
    #[arg(short, long)]
    chat: bool,

    /// Target device used when the request names none
    #[arg(short, long, value_name = "NAME")]
    device: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Path to a netpilot.toml config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List devices from the configured inventory")]
    Inventory,
    #[command(about = "Import devices from a YAML inventory into the SQLite database")]
    ImportInventory {
        #[arg(long, value_name = "PATH", help = "YAML file to import (defaults to inventory.path)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Check config, ssh tooling, inventory credentials and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            load_env_file: true,
            ..LoadOptions::default()
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();
    let ui = Ui::detect();

    if cli.command.is_some() {
        let logging = subcommand_logging(&options);
        if let Err(error) = init_logging(&logging, cli.debug) {
            eprintln!("{}", ui.warning(&format!("could not open log file: {error}")));
        }
    }

    let result = match cli.command {
        Some(Command::Inventory) => commands::inventory::run(options, ui),
        Some(Command::ImportInventory { path }) => commands::import_inventory::run(options, path),
        Some(Command::Doctor { json }) => commands::doctor::run(options, json),
        Some(Command::Config) => commands::config::run(options),
        None => commands::chat::run(
            options,
            SessionRequest { words: cli.words, chat: cli.chat, device: cli.device, debug: cli.debug },
            ui,
        ),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

/// Logging settings for subcommands. A config that fails to load falls back to
/// defaults here; the subcommand itself reports the failure.
fn subcommand_logging(options: &LoadOptions) -> LoggingConfig {
    AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};
    use netpilot_core::config::{AppConfig, LoadOptions};

    use super::{subcommand_logging, Cli, Command};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn free_words_become_a_single_command() {
        let cli = Cli::try_parse_from(["netpilot", "show", "version", "on", "R1", "-d", "SW1"])
            .expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.words, vec!["show", "version", "on", "R1"]);
        assert_eq!(cli.device.as_deref(), Some("SW1"));
        assert!(!cli.chat);
    }

    #[test]
    fn subcommands_and_flags_parse() {
        let cli = Cli::try_parse_from(["netpilot", "doctor", "--json", "--debug"]).expect("parse");
        assert!(matches!(cli.command, Some(Command::Doctor { json: true })));
        assert!(cli.debug);

        let cli = Cli::try_parse_from(["netpilot", "--chat", "--config", "netpilot.toml"])
            .expect("parse");
        assert!(cli.chat);
        assert!(cli.load_options().require_file);
    }

    #[test]
    fn subcommand_logging_falls_back_to_defaults() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/netpilot.toml")),
            require_file: true,
            ..LoadOptions::default()
        };
        let logging = subcommand_logging(&options);
        let defaults = AppConfig::default().logging;
        assert_eq!(logging.level, defaults.level);
        assert_eq!(logging.format, defaults.format);
        assert!(logging.file.is_none());
    }
}
