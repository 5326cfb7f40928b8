//! Trees command - List configured trees

use anyhow::Result;
use clap::Args;
use zenkat_config::ZenkatConfig;

use super::print_info;
use crate::GlobalOptions;

/// Arguments for the trees command
#[derive(Args, Debug)]
pub struct TreesArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the trees command
pub async fn execute(args: TreesArgs, config: ZenkatConfig, global: GlobalOptions) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config.trees)?);
        return Ok(());
    }

    if config.trees.is_empty() {
        print_info("No trees configured. Add [[trees]] to .zenkat/config.toml or pass --root name=path.", global.quiet);
        return Ok(());
    }

    let width = config.trees.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tree in &config.trees {
        println!(
            "{:<width$}  {:<20}  {}",
            tree.name,
            tree.effective_virtual_path(),
            tree.path.display(),
            width = width
        );
    }
    Ok(())
}
