//! Greens CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! greens-cli migrate
//!
//! # Embed listed products that have no embedding yet
//! greens-cli embeddings backfill --limit 200
//! ```
//!
//! Both commands read the server configuration (`--config`, `GREENS_CONFIG`
//! or `config.yaml`, plus environment overrides).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use greens_server::config::AppConfig;

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "greens-cli")]
#[command(author, version, about = "Greens marketplace CLI tools")]
struct Cli {
    /// Server configuration file
    #[arg(long, global = true, env = "GREENS_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage product embeddings
    Embeddings {
        #[command(subcommand)]
        action: EmbeddingsAction,
    },
}

#[derive(Subcommand)]
enum EmbeddingsAction {
    /// Embed active products that have no embedding row
    Backfill {
        /// Maximum number of products to embed
        #[arg(short, long, default_value_t = 500)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&config).await?,
        Commands::Embeddings { action } => match action {
            EmbeddingsAction::Backfill { limit } => {
                commands::embeddings::backfill(&config, limit).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backfill_limit_parses() {
        let cli = Cli::try_parse_from(["greens-cli", "embeddings", "backfill", "--limit", "7"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Embeddings {
                action: EmbeddingsAction::Backfill { limit: 7 }
            })
        ));
    }
}
