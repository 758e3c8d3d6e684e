pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod model;
pub mod perception;
pub mod playback;
pub mod recorder;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

use std::process::ExitCode;

use clap::Parser;

use crate::commands::Cli;

/// Entry point of the `anchorplay` binary.
pub async fn run() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "anchorplay failed");
            ExitCode::FAILURE
        }
    }
}
