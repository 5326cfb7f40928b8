//! CLI command implementations

pub mod init;
pub mod query;
pub mod serve;
pub mod tree;
pub mod trees;

use std::sync::Arc;

use anyhow::{Context, Result};
use zenkat_config::{ConfigLoader, ConfigOverrides, ZenkatConfig};
use zenkat_server::AppState;

use crate::GlobalOptions;

/// Load configuration (global → explicit file or local → `--root` trees).
pub fn load_config(global: &GlobalOptions) -> Result<ZenkatConfig> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let overrides = ConfigOverrides {
        trees: global.roots.clone(),
        ..Default::default()
    };

    let mut loader = ConfigLoader::new();
    loader
        .load(&cwd, global.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")
}

/// Build the engine with every configured tree registered.
pub fn build_state(config: ZenkatConfig) -> Result<Arc<AppState>> {
    let state = AppState::new(config).context("Failed to set up trees")?;
    Ok(Arc::new(state))
}

/// Print an info message to stderr (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
