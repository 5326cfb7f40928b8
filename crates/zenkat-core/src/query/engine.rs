//! Query Engine
//!
//! Answers read requests from the node store, triggering crawls and
//! hydrations according to each request's [`Eagerness`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Answer, Eagerness, Predicate, QueryHit, QueryOptions, Wait};
use crate::budget::ContentBudget;
use crate::crawler::MetadataCrawler;
use crate::decoder::ContentDecoder;
use crate::error::{Operation, Result, ZenkatError};
use crate::hydration::HydrationManager;
use crate::id::NodeId;
use crate::node::{NodeDetail, NodeSummary};
use crate::registry::{Registration, TreeRegistry};
use crate::source::TreeSource;
use crate::store::{NodeStore, TreeView};
use crate::tree::{Tree, TreeStats};

/// Engine-wide limits and defaults.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub default_eagerness: Eagerness,
    /// How long blocking requests wait on in-flight loads
    pub wait_timeout: Duration,
    pub crawl_timeout: Duration,
    pub hydration_timeout: Duration,
    pub memory_budget: usize,
    pub max_file_size: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_eagerness: Eagerness::Metadata,
            wait_timeout: Duration::from_secs(30),
            crawl_timeout: crate::crawler::DEFAULT_CRAWL_TIMEOUT,
            hydration_timeout: crate::hydration::DEFAULT_HYDRATION_TIMEOUT,
            memory_budget: crate::budget::DEFAULT_MEMORY_BUDGET,
            max_file_size: None,
        }
    }
}

pub struct QueryEngine {
    registry: Arc<TreeRegistry>,
    crawler: MetadataCrawler,
    hydrator: HydrationManager,
    options: EngineOptions,
}

impl QueryEngine {
    /// Build the store, registry, crawler and hydration manager.
    pub fn new(options: EngineOptions, decoder: Arc<dyn ContentDecoder>) -> Self {
        let budget = Arc::new(ContentBudget::new(options.memory_budget));
        let registry = Arc::new(TreeRegistry::new(
            Arc::new(NodeStore::new()),
            Arc::clone(&budget),
        ));
        let crawler = MetadataCrawler::new(Arc::clone(&registry)).with_timeout(options.crawl_timeout);
        let mut hydrator = HydrationManager::new(Arc::clone(&registry), budget)
            .with_decoder(decoder)
            .with_timeout(options.hydration_timeout);
        if let Some(limit) = options.max_file_size {
            hydrator = hydrator.with_max_file_size(limit);
        }

        Self {
            registry,
            crawler,
            hydrator,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<TreeRegistry> {
        &self.registry
    }

    pub fn crawler(&self) -> &MetadataCrawler {
        &self.crawler
    }

    pub fn hydrator(&self) -> &HydrationManager {
        &self.hydrator
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        self.registry.store()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Request options from optional overrides, falling back to the engine
    /// defaults. `block = false` selects the non-blocking variant.
    pub fn query_options(&self, eagerness: Option<Eagerness>, block: bool) -> QueryOptions {
        let wait = if block {
            Wait::block(self.options.wait_timeout)
        } else {
            Wait::NoWait
        };
        QueryOptions::new(eagerness.unwrap_or(self.options.default_eagerness), wait)
    }

    pub fn register(
        &self,
        name: &str,
        virtual_path: &str,
        source: Arc<dyn TreeSource>,
    ) -> Result<Registration> {
        self.registry.register(name, virtual_path, source)
    }

    pub fn unload(&self, name: &str) -> Result<()> {
        self.registry.unload(name)
    }

    pub fn stats(&self, name: &str) -> Result<TreeStats> {
        self.registry.stats(name)
    }

    pub fn list_trees(&self) -> Vec<String> {
        self.registry.list_trees()
    }

    /// Make sure the node graph is known if the eagerness allows crawling.
    /// Returns whether the graph is available.
    async fn ensure_crawled(&self, name: &str, options: &QueryOptions) -> Result<bool> {
        let tree = self.registry.lookup(name)?;
        if tree.state.is_loaded() {
            return Ok(true);
        }
        if !options.eagerness.crawls() {
            debug!(tree = %name, state = %tree.state, "Not crawling with eagerness=none");
            return Ok(false);
        }
        self.crawler.crawl_with(name, options.wait).await?;
        Ok(true)
    }

    /// Hydrate every file for requests that need all content.
    ///
    /// Budget eviction may drop files again before the caller reads the tree,
    /// so residency is checked against the snapshot the answer is built from.
    async fn ensure_hydrated(&self, name: &str, options: &QueryOptions) -> Result<()> {
        let report = self.hydrator.hydrate_all(name, options.wait).await?;
        if let Some(err) = report.errors.iter().find(|e| {
            matches!(e, ZenkatError::Pending { .. } | ZenkatError::Timeout { .. })
        }) {
            return Err(match err {
                ZenkatError::Pending { .. } => ZenkatError::pending(Operation::Hydration, name),
                _ => ZenkatError::timeout(Operation::Hydration, name),
            });
        }
        if let Some(err) = report.first_failure() {
            warn!(
                tree = %name,
                failed = report.errors.len(),
                error = %err,
                "Some files could not be hydrated"
            );
        }
        Ok(())
    }

    fn tree_state(&self, name: &str) -> Result<Tree> {
        self.registry.lookup(name)
    }

    /// Tree summary, crawling it first unless eagerness is `none`.
    pub async fn get_tree(&self, name: &str, options: QueryOptions) -> Result<Answer<Tree>> {
        let loaded = self.ensure_crawled(name, &options).await?;
        let tree = self.tree_state(name)?;
        Ok(Answer {
            tree_state: tree.state,
            complete: loaded,
            data: tree,
        })
    }

    /// Every node except the root, in crawl order.
    pub async fn list_nodes(&self, name: &str, options: QueryOptions) -> Result<Answer<Vec<NodeSummary>>> {
        let loaded = self.ensure_crawled(name, &options).await?;
        let hydrates = options.eagerness.hydrates();
        if loaded && hydrates {
            self.ensure_hydrated(name, &options).await?;
        }

        let (nodes, resident) = self
            .store()
            .read_tree(name, |view| {
                let nodes = view
                    .nodes()
                    .filter(|node| !node.is_root())
                    .map(|node| node.summary())
                    .collect::<Vec<_>>();
                (nodes, all_resident(&view))
            })
            .unwrap_or_default();
        let tree = self.tree_state(name)?;
        Ok(Answer {
            data: nodes,
            complete: loaded && (!hydrates || resident),
            tree_state: tree.state,
        })
    }

    /// Full node detail. With eagerness `full` a file is hydrated first.
    pub async fn get_node(&self, name: &str, id: &str, options: QueryOptions) -> Result<Answer<NodeDetail>> {
        let node_id = NodeId::parse(id).ok_or_else(|| ZenkatError::node_not_found(name, id))?;
        if !self.ensure_crawled(name, &options).await? {
            return Err(ZenkatError::not_metadata_loaded(name));
        }

        let node = self
            .store()
            .get_node(name, &node_id)
            .ok_or_else(|| ZenkatError::node_not_found(name, &node_id))?;

        let mut detail = node.detail();
        if node.is_file() {
            if detail.content.is_some() {
                self.hydrator.touch(name, &node_id);
            } else if options.eagerness.hydrates() {
                let content = self.hydrator.hydrate_with(name, &node_id, options.wait).await?;
                detail = self
                    .store()
                    .get_node(name, &node_id)
                    .map(|node| node.detail())
                    .unwrap_or(detail);
                if detail.content.is_none() {
                    // Evicted or unloaded since; still answer with what was fetched
                    detail.content = Some(content);
                }
            }
        }

        let complete = !node.is_file() || detail.content.is_some();
        let tree = self.tree_state(name)?;
        Ok(Answer {
            data: detail,
            complete,
            tree_state: tree.state,
        })
    }

    /// Nodes (other than the root) matching `predicate`, in crawl order.
    ///
    /// Content predicates only see resident content unless eagerness is
    /// `full`, in which case every file is hydrated first.
    pub async fn query(
        &self,
        name: &str,
        predicate: &Predicate,
        options: QueryOptions,
    ) -> Result<Answer<Vec<QueryHit>>> {
        let compiled = predicate.compile()?;
        let loaded = self.ensure_crawled(name, &options).await?;
        let needs_content = predicate.needs_content();
        if loaded && needs_content && options.eagerness.hydrates() {
            self.ensure_hydrated(name, &options).await?;
        }

        // Hits and residency come from one snapshot
        let (hits, resident) = self
            .store()
            .read_tree(name, |view| {
                let hits = view
                    .nodes()
                    .filter(|node| !node.is_root() && compiled.matches(node, &view))
                    .map(|node| {
                        if options.detail {
                            QueryHit::Detail(node.detail())
                        } else {
                            QueryHit::Summary(node.summary())
                        }
                    })
                    .collect::<Vec<_>>();
                (hits, all_resident(&view))
            })
            .unwrap_or_default();
        let tree = self.tree_state(name)?;
        Ok(Answer {
            data: hits,
            complete: loaded && (!needs_content || resident),
            tree_state: tree.state,
        })
    }
}

fn all_resident(view: &TreeView<'_>) -> bool {
    view.nodes()
        .filter(|node| node.is_file())
        .all(|node| node.content().is_some())
}
