use clap::Parser;
use kubeform::cli::{run_cli, Cli};
use kubeform::logging::{init_logging, LogConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config = log_config.verbose();
    }
    if let Err(err) = init_logging(&log_config) {
        eprintln!("Warning: {err:#}");
    }

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "kubeform-gen failed");
            ExitCode::FAILURE
        }
    }
}
