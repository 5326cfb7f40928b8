//! Init command - Write a starter `.zenkat/config.toml`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use zenkat_config::{ConfigLoader, ZenkatConfig};

use super::print_info;
use crate::GlobalOptions;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
}

/// Execute the init command
///
/// Trees passed with `--root` are written into the new file.
pub async fn execute(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let base = if args.path.is_absolute() {
        args.path
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(args.path)
    };

    let mut config = ZenkatConfig::default();
    for root in global.roots {
        config.upsert_tree(root);
    }
    config.validate().context("Invalid tree roots")?;

    let (path, written) = ConfigLoader::new()
        .init_local(&base, &config)
        .context("Failed to write configuration")?;
    if written {
        info!(path = %path.display(), trees = config.trees.len(), "Wrote configuration");
        print_info(&format!("Created {}", path.display()), global.quiet);
    } else {
        print_info(
            &format!("Configuration already exists at {}", path.display()),
            global.quiet,
        );
    }
    Ok(())
}
