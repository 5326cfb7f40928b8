//! Zenkat CLI - serve and inspect lazily loaded document trees
//!
//! # Usage
//!
//! ```bash
//! # Write a starter .zenkat/config.toml with one tree
//! zenkat --root notes=~/notes init
//!
//! # Serve the configured trees over HTTP
//! zenkat serve --port 9001
//!
//! # Add a tree ad hoc and print its outline with headings
//! zenkat --root notes=~/notes tree notes --full
//!
//! # Find files with a level-1 heading mentioning "intro"
//! zenkat query notes '{"has_heading": {"level": 1, "text": "intro"}}' --eagerness full
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zenkat_config::{LogFormat, LoggingConfig, TreeRootConfig};

mod commands;
mod progress;

/// Zenkat - lazily loaded document trees
#[derive(Parser, Debug)]
#[command(name = "zenkat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "ZENKAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Expose a directory as a tree (name=path, repeatable)
    #[arg(long = "root", global = true, value_parser = parse_root)]
    roots: Vec<TreeRootConfig>,
}

/// Parse a `name=path` tree root.
fn parse_root(s: &str) -> Result<TreeRootConfig, String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=path, got '{}'", s))?;
    let root = TreeRootConfig::new(name.trim(), path.trim());
    root.validate().map_err(|e| e.to_string())?;
    Ok(root)
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter .zenkat/config.toml
    Init(commands::init::InitArgs),

    /// Serve trees over HTTP
    Serve(commands::serve::ServeArgs),

    /// List configured trees
    Trees(commands::trees::TreesArgs),

    /// Load a tree and print its outline
    Tree(commands::tree::TreeArgs),

    /// Run a predicate query against a tree
    Query(commands::query::QueryArgs),
}

fn init_logging(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(true).finish())?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init must work even when an existing config fails to load
    if let Commands::Init(args) = cli.command {
        init_logging(&cli.global, &LoggingConfig::default())?;
        return commands::init::execute(args, cli.global).await;
    }

    let config = commands::load_config(&cli.global)?;
    init_logging(&cli.global, &config.logging)?;

    match cli.command {
        Commands::Init(_) => unreachable!("handled before loading configuration"),
        Commands::Serve(args) => commands::serve::execute(args, config, cli.global).await,
        Commands::Trees(args) => commands::trees::execute(args, config, cli.global).await,
        Commands::Tree(args) => commands::tree::execute(args, config, cli.global).await,
        Commands::Query(args) => commands::query::execute(args, config, cli.global).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root() {
        let root = parse_root("notes=/srv/notes").unwrap();
        assert_eq!(root.name, "notes");
        assert_eq!(root.path, PathBuf::from("/srv/notes"));

        assert!(parse_root("notes").is_err());
        assert!(parse_root("=/srv/notes").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
