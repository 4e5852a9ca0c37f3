mod call;
mod config;
mod import;

pub use call::CallCommand;
pub use config::ConfigCommand;
pub use import::ImportSchemasCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// darkroom - photo gallery client tooling
#[derive(Parser)]
#[command(name = "darkroom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generate TypeScript bindings for every configured OpenAPI schema.
    ImportSchemas(ImportSchemasCommand),

    /// Show the resolved configuration.
    Config(ConfigCommand),

    /// Call a backend operation described by a schema.
    Call(CallCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        match self.command {
            Commands::ImportSchemas(cmd) => cmd.execute().await,
            Commands::Config(cmd) => cmd.execute().await,
            Commands::Call(cmd) => cmd.execute().await,
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
        .with_writer(std::io::stderr)
        .init();
}

/// Split `name=value`.
fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got `{}`", raw))
}
