use std::process::ExitCode;

fn main() -> ExitCode {
    netpilot_cli::run()
}
