use clap::Parser;
use estate_mirror::cli::{run, Cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI; stdout is reserved for status lines.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => {
            tracing::info!("CLI completed");
            code
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
