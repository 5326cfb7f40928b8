//! Serve command - HTTP access to the configured trees

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;
use zenkat_config::{ConfigOverrides, ZenkatConfig};

use super::build_state;
use crate::GlobalOptions;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind host
    #[arg(long, env = "ZENKAT_HOST")]
    host: Option<String>,

    /// Bind port
    #[arg(long, short = 'p', env = "ZENKAT_PORT")]
    port: Option<u16>,
}

/// Execute the serve command
pub async fn execute(args: ServeArgs, mut config: ZenkatConfig, _global: GlobalOptions) -> Result<()> {
    config.apply_overrides(&ConfigOverrides {
        host: args.host,
        port: args.port,
        ..Default::default()
    });
    if config.trees.is_empty() {
        warn!("No trees configured; register them with PUT /tree");
    }

    let state = build_state(config)?;
    zenkat_server::serve(state).await.context("Server failed")
}
