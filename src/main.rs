use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use watchzone::cli::{Cli, run_cli};
use watchzone::config::AppConfig;
use watchzone::logging;
use watchzone::output::OutputFormatter;

fn main() -> ExitCode {
    // A missing .env is fine; the variables may come from the shell
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            OutputFormatter::error(&format!("Configuration error: {}", e));
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            OutputFormatter::warning(&format!("File logging disabled: {}", e));
            None
        }
    };

    match run_cli(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            OutputFormatter::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
