//! Query command - Run a predicate against a tree and print the hits as JSON

use anyhow::{Context, Result};
use clap::Args;
use zenkat_config::ZenkatConfig;
use zenkat_core::{Eagerness, Predicate};

use super::{build_state, print_info};
use crate::GlobalOptions;

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Tree name
    name: String,

    /// Predicate as JSON, e.g. '{"extension": "md"}'
    predicate: String,

    /// How much loading the query may trigger (none, metadata, full)
    #[arg(long, short = 'e')]
    eagerness: Option<Eagerness>,

    /// Return full node details instead of summaries
    #[arg(long)]
    detail: bool,
}

/// Execute the query command
pub async fn execute(args: QueryArgs, config: ZenkatConfig, global: GlobalOptions) -> Result<()> {
    let predicate = Predicate::parse_json(&args.predicate).context("Invalid predicate")?;
    config.tree(&args.name)?;
    let state = build_state(config)?;
    let engine = state.engine();

    let options = engine
        .query_options(args.eagerness, true)
        .with_detail(args.detail);
    let answer = engine.query(&args.name, &predicate, options).await?;

    println!("{}", serde_json::to_string_pretty(&answer)?);
    if !answer.complete {
        let hint = if predicate.needs_content() && !options.eagerness.hydrates() {
            "note: content was only matched against hydrated files; rerun with --eagerness full"
        } else {
            "note: results are incomplete"
        };
        print_info(hint, global.quiet);
    }
    Ok(())
}
