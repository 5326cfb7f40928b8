//! Metadata Crawler
//!
//! Walks a tree's source once and installs the whole node graph in a single
//! store mutation. Concurrent crawls of the same tree join one walk.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{CrawlError, Operation, Result, ZenkatError};
use crate::flight::{settle, Flight, Wait};
use crate::id::{NodeId, VirtualPath};
use crate::node::Node;
use crate::registry::{TreeHandle, TreeRegistry};
use crate::source::{EntryKind, TreeSource};
use crate::store::{CrawlStart, NodeStore};

/// Default time a caller waits for a crawl.
pub const DEFAULT_CRAWL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MetadataCrawler {
    registry: Arc<TreeRegistry>,
    timeout: Duration,
}

impl MetadataCrawler {
    pub fn new(registry: Arc<TreeRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_CRAWL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Crawl `tree` if it is not loaded yet, returning its root id.
    ///
    /// A no-op on a loaded tree. Waits up to the crawler's timeout.
    pub async fn crawl(&self, tree: &str) -> Result<NodeId> {
        self.crawl_with(tree, Wait::block(self.timeout)).await
    }

    pub async fn crawl_with(&self, tree: &str, wait: Wait) -> Result<NodeId> {
        let handle = self.registry.handle(tree)?;
        let current = self.registry.lookup(tree)?;
        if current.state.is_loaded() {
            if let Some(root) = current.root_node {
                debug!(tree = %tree, "Tree already loaded");
                return Ok(root);
            }
        }

        let flight = self.start(&handle);
        if !flight.is_leader() {
            debug!(tree = %tree, "Joining in-flight crawl");
        }
        let result = settle(flight, wait, Operation::Crawl, tree).await;
        if let Err(ZenkatError::Timeout { .. }) = &result {
            warn!(tree = %tree, "Timed out waiting for crawl");
        }
        result
    }

    /// Whether a crawl of `tree` is running.
    pub fn in_flight(&self, tree: &str) -> bool {
        self.registry
            .handle(tree)
            .map(|handle| handle.crawl_in_flight())
            .unwrap_or(false)
    }

    fn start(&self, handle: &Arc<TreeHandle>) -> Flight<Result<NodeId>> {
        let store = Arc::clone(self.registry.store());
        let walker = Arc::clone(handle);
        handle.crawl.join_or_start((), move || walk(store, walker))
    }
}

async fn walk(store: Arc<NodeStore>, handle: Arc<TreeHandle>) -> Result<NodeId> {
    let tree = handle.name();
    let (generation, root) = match store.begin_crawl(tree)? {
        CrawlStart::Loaded(root) => return Ok(root),
        CrawlStart::Started { generation, root } => (generation, root),
        CrawlStart::InProgress => {
            warn!(tree = %tree, "Crawl already owned by a replaced handle");
            return Err(CrawlError::new(tree, "/", "crawl already in progress").into());
        }
    };

    let source = handle.source();
    let started = Instant::now();
    info!(tree = %tree, source = %source.describe(), "Crawling tree");

    match collect(tree, source.as_ref(), &root).await {
        Ok(nodes) => {
            let count = nodes.len();
            if !store.install_graph(tree, generation, nodes) {
                warn!(tree = %tree, "Crawl superseded by unload");
                return Err(CrawlError::new(tree, "/", "superseded by unload").into());
            }
            info!(
                tree = %tree,
                nodes = count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Crawl complete"
            );
            Ok(root)
        }
        Err(err) => {
            store.abort_crawl(tree, generation);
            warn!(tree = %tree, path = %err.path, reason = %err.reason, "Crawl failed");
            Err(err.into())
        }
    }
}

fn valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Depth-first walk. Every folder's children keep the order the source
/// listed them in; parents always precede their children.
async fn collect(tree: &str, source: &dyn TreeSource, root: &NodeId) -> std::result::Result<Vec<Node>, CrawlError> {
    let mut nodes = vec![Node::folder(root.clone(), VirtualPath::root(), tree, None)];
    let mut stack = vec![(VirtualPath::root(), root.clone())];

    while let Some((path, id)) = stack.pop() {
        let entries = source
            .list_dir(&path)
            .await
            .map_err(|err| CrawlError::from_source(tree, err))?;

        let mut seen = HashSet::with_capacity(entries.len());
        let mut folders = Vec::new();
        for entry in entries {
            if !valid_entry_name(&entry.name) || !seen.insert(entry.name.clone()) {
                return Err(CrawlError::new(
                    tree,
                    path.to_string(),
                    format!("source listed invalid or duplicate entry {:?}", entry.name),
                ));
            }

            let child_path = path.join(&entry.name);
            let child_id = NodeId::derive(tree, &child_path);
            match entry.kind {
                EntryKind::Folder => {
                    nodes.push(Node::folder(
                        child_id.clone(),
                        child_path.clone(),
                        entry.name,
                        Some(id.clone()),
                    ));
                    folders.push((child_path, child_id));
                }
                EntryKind::File => {
                    nodes.push(Node::file(child_id, child_path, entry.name, id.clone(), entry.size));
                }
            }
        }
        // Reversed so the first listed folder is walked first
        stack.extend(folders.into_iter().rev());
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ContentBudget;
    use crate::error::{ErrorKind, SourceErrorKind};
    use crate::source::MemorySource;
    use crate::tree::TreeState;

    fn setup(source: Arc<MemorySource>) -> (Arc<TreeRegistry>, MetadataCrawler) {
        let registry = Arc::new(TreeRegistry::new(
            Arc::new(NodeStore::new()),
            Arc::new(ContentBudget::default()),
        ));
        registry.register("docs", "/docs", source).unwrap();
        let crawler = MetadataCrawler::new(Arc::clone(&registry));
        (registry, crawler)
    }

    fn docs_source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with_file("a.md", "# A")
                .with_file("sub/b.md", "# B"),
        )
    }

    #[tokio::test]
    async fn test_crawl_installs_graph() {
        let (registry, crawler) = setup(docs_source());
        let root = crawler.crawl("docs").await.unwrap();

        let tree = registry.lookup("docs").unwrap();
        assert_eq!(tree.state, TreeState::LoadedMetadataOnly);
        assert_eq!(tree.root_node, Some(root.clone()));

        let names = registry
            .store()
            .read_tree("docs", |view| view.nodes().map(|n| n.virtual_path.to_string()).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(names, vec!["/", "/a.md", "/sub", "/sub/b.md"]);
    }

    #[tokio::test]
    async fn test_crawl_is_idempotent() {
        let source = docs_source();
        let (registry, crawler) = setup(source.clone());
        let first = crawler.crawl("docs").await.unwrap();
        let calls = source.list_calls();

        let second = crawler.crawl("docs").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.list_calls(), calls);
        assert_eq!(registry.stats("docs").unwrap().files, 2);
    }

    #[tokio::test]
    async fn test_failure_reverts_to_unloaded() {
        let source = docs_source();
        source.fail_path("sub", SourceErrorKind::PermissionDenied);
        let (registry, crawler) = setup(source.clone());

        let err = crawler.crawl("docs").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrawlError);
        assert_eq!(err.key().as_deref(), Some("/sub"));

        let tree = registry.lookup("docs").unwrap();
        assert_eq!(tree.state, TreeState::Unloaded);
        assert!(tree.root_node.is_none());

        source.clear_failures();
        crawler.crawl("docs").await.unwrap();
        assert_eq!(registry.lookup("docs").unwrap().state, TreeState::LoadedMetadataOnly);
    }

    #[tokio::test]
    async fn test_unknown_tree() {
        let (_, crawler) = setup(docs_source());
        let err = crawler.crawl("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TreeNotFound);
    }

    #[tokio::test]
    async fn test_no_wait_returns_pending() {
        let source = docs_source();
        source.set_latency(Duration::from_millis(50));
        let (registry, crawler) = setup(source);

        let err = crawler.crawl_with("docs", Wait::NoWait).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Pending);
        assert!(crawler.in_flight("docs"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.lookup("docs").unwrap().state, TreeState::LoadingMetadata);

        // The background crawl finishes on its own
        crawler.crawl("docs").await.unwrap();
        assert!(!crawler.in_flight("docs"));
    }

    #[test]
    fn test_entry_names() {
        assert!(valid_entry_name("a.md"));
        assert!(!valid_entry_name(".."));
        assert!(!valid_entry_name("a/b"));
        assert!(!valid_entry_name(""));
    }
}
