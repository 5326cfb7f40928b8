//! Tree command - Load a tree and print an indented outline

use anyhow::Result;
use clap::Args;
use zenkat_config::ZenkatConfig;
use zenkat_core::store::TreeView;
use zenkat_core::{Eagerness, NodeKind};

use super::{build_state, print_info};
use crate::progress::Spinner;
use crate::GlobalOptions;

/// Arguments for the tree command
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Tree name
    name: String,

    /// Hydrate every file and include headings
    #[arg(long)]
    full: bool,

    /// Print the node listing as JSON instead of an outline
    #[arg(long)]
    json: bool,
}

/// Execute the tree command
pub async fn execute(args: TreeArgs, config: ZenkatConfig, global: GlobalOptions) -> Result<()> {
    config.tree(&args.name)?;
    let state = build_state(config)?;
    let engine = state.engine();

    let eagerness = if args.full {
        Eagerness::Full
    } else {
        Eagerness::Metadata
    };
    let spinner = Spinner::start(format!("Loading {} ({})", args.name, eagerness), global.quiet);
    let answer = match engine
        .list_nodes(&args.name, engine.query_options(Some(eagerness), true))
        .await
    {
        Ok(answer) => answer,
        Err(err) => {
            spinner.clear();
            return Err(err.into());
        }
    };
    spinner.finish(format!("{} nodes, {}", answer.data.len(), answer.tree_state));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    for line in engine.store().read_tree(&args.name, outline).unwrap_or_default() {
        println!("{}", line);
    }
    if !answer.complete {
        print_info("warning: some files could not be hydrated", global.quiet);
    }
    Ok(())
}

/// Folders end in `/`; hydrated files list their headings beneath them.
fn outline(view: TreeView<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(root) = view.root() else {
        return lines;
    };

    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        match node.kind() {
            NodeKind::Folder => lines.push(format!("{}{}/", indent, node.name)),
            NodeKind::File => {
                lines.push(format!("{}{}", indent, node.name));
                if let Some(document) = node.content().and_then(|c| c.decoded.as_ref()) {
                    for (level, text) in document.headings() {
                        lines.push(format!("{}  {} {}", indent, "#".repeat(level as usize), text));
                    }
                }
            }
        }
        stack.extend(
            node.children()
                .iter()
                .rev()
                .filter_map(|id| view.node(id))
                .map(|child| (child, depth + 1)),
        );
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zenkat_core::{EngineOptions, MarkdownDecoder, MemorySource, NodeId, QueryEngine, VirtualPath};

    #[tokio::test]
    async fn test_outline_lists_headings_of_hydrated_files() {
        let engine = QueryEngine::new(EngineOptions::default(), Arc::new(MarkdownDecoder::new()));
        let source = MemorySource::new()
            .with_file("a.md", "# A\n\n## Section\n")
            .with_file("sub/b.md", "# B\n");
        engine.register("docs", "/docs", Arc::new(source)).unwrap();
        engine.crawler().crawl("docs").await.unwrap();
        let a = NodeId::derive("docs", &VirtualPath::parse("a.md").unwrap());
        engine.hydrator().hydrate("docs", &a).await.unwrap();

        let lines = engine.store().read_tree("docs", outline).unwrap();
        assert_eq!(
            lines,
            vec!["docs/", "  a.md", "    # A", "    ## Section", "  sub/", "    b.md"]
        );
    }
}
