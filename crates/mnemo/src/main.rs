// crates/mnemo/src/main.rs
// mnemo - long-term memory subsystem for conversational AI hosts

use anyhow::Result;
use clap::Parser;
use mnemo::cli::{self, Cli, Commands, default_data_dir};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.mnemo/.env only (never from CWD -- a malicious repo
    // could override API keys)
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".mnemo/.env"))
    {
        tracing::debug!("Failed to load global .env file: {}", e);
    }

    let cli = Cli::parse();

    let log_level = match &cli.command {
        Some(Commands::Serve) | None => Level::WARN, // Quiet for MCP stdio
        Some(Commands::Dashboard { .. }) => Level::WARN,
        Some(Commands::ImportLegacy { .. }) => Level::INFO,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let data_dir = default_data_dir();

    match cli.command {
        None | Some(Commands::Serve) => {
            cli::serve::run(&data_dir).await?;
        }
        Some(Commands::List { limit }) => {
            cli::list::run(&data_dir, limit).await?;
        }
        Some(Commands::Search { query, limit }) => {
            cli::search::run(&data_dir, query, limit).await?;
        }
        Some(Commands::Stats) => {
            cli::stats::run(&data_dir).await?;
        }
        Some(Commands::Dashboard { interval_ms }) => {
            cli::dashboard::run(&data_dir, interval_ms).await?;
        }
        Some(Commands::ImportLegacy { path }) => {
            cli::import_legacy::run(&data_dir, path).await?;
        }
    }

    Ok(())
}
