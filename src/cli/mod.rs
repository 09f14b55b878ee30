//! CLI module for the semantic result cache
//!
//! Provides subcommands:
//! - `serve`: HTTP API with background expiry/eviction
//! - `migrate`: apply (or revert) the PostgreSQL schema
//! - `sweep`: run one expiry + eviction pass and exit

pub mod migrate;
pub mod serve;
pub mod sweep;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Semantic result cache - reuse expensive results for equivalent requests
#[derive(Parser)]
#[command(name = "semantic-result-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API with background maintenance
    Serve,

    /// Apply PostgreSQL schema migrations
    Migrate(migrate::MigrateArgs),

    /// Run one maintenance pass and print the counts
    Sweep,
}

/// Load `.env`, the layered configuration and install logging
pub(crate) fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["semantic-result-cache", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));

        let cli = Cli::try_parse_from(["semantic-result-cache", "migrate", "--revert"]).unwrap();
        assert!(matches!(cli.command, Command::Migrate(args) if args.revert));

        let cli = Cli::try_parse_from(["semantic-result-cache", "sweep"]).unwrap();
        assert!(matches!(cli.command, Command::Sweep));

        assert!(Cli::try_parse_from(["semantic-result-cache", "ui"]).is_err());
    }
}
