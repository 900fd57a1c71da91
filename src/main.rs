use std::process::ExitCode;

use clap::Parser;
use coffer::cli::{Cli, error_report};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    coffer::telemetry::init(cli.verbose);

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = error_report(&err);
            match serde_json::to_string_pretty(&report) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("Error: {}", report.message),
            }
            if report.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
