use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use netpilot_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Crates whose request-level chatter is capped at `warn` unless debugging.
const NOISY_TARGETS: [&str; 4] = ["hyper", "reqwest", "sqlx", "rustls"];

/// Installs the global subscriber. `debug` forces the `debug` level regardless of config.
///
/// Output goes to the configured log file when set, otherwise to stderr so that
/// stdout stays reserved for responses. Calling this twice is a no-op.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> io::Result<()> {
    let level = effective_level(config, debug);
    let filter = build_filter(level, debug);

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    let ansi = config.file.is_none();

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "system.logging.already_initialized", "logging already set up");
    }

    Ok(())
}

fn effective_level(config: &LoggingConfig, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        config.level.as_str()
    }
}

fn build_filter(level: &str, debug: bool) -> EnvFilter {
    let caps = NOISY_TARGETS.iter().filter(|_| !debug).map(|target| format!("{target}=warn"));
    let directives =
        std::iter::once(level.to_string()).chain(caps).collect::<Vec<_>>().join(",");
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}
