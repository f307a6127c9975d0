//! Travai - Thailand travel guide chat client
//!
#![doc = "Travai - Thailand travel guide chat client"]
#![doc = "Main entry point for the Travai command-line application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use travai::cli::{Cli, Commands};
use travai::commands;
use travai::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { thread } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(id) = &thread {
                tracing::debug!("Resuming thread: {}", id);
            }
            commands::chat::run_chat(config, thread).await?;
            Ok(())
        }
        Commands::Threads => {
            commands::threads::list_threads(config).await?;
            Ok(())
        }
        Commands::History { id } => {
            commands::threads::show_history(config, id).await?;
            Ok(())
        }
        Commands::Rename { id, title } => {
            commands::threads::rename_thread(config, id, title).await?;
            Ok(())
        }
        Commands::Delete { id } => {
            commands::threads::delete_thread(config, id).await?;
            Ok(())
        }
        Commands::Auth { key, clear } => {
            commands::auth::store_api_key(key, clear)?;
            Ok(())
        }
    }
}

/// Logs go to stderr so they never interleave with streamed answers.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "travai=debug" } else { "travai=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
