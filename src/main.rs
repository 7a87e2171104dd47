//! Binary entry point for `servecheck`.
//!
//! The command logic lives in `servecheck::cli`; this binary installs the
//! log subscriber and maps the outcome onto the process exit status.

use std::process::ExitCode;

use servecheck::cli::{self, FATAL_EXIT};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    match cli::run().await {
        Ok(verdict) => verdict.exit_code(),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(FATAL_EXIT)
        }
    }
}
