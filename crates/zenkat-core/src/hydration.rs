//! Hydration Manager
//!
//! Fetches file content on demand. Concurrent hydrations of one node share a
//! single fetch; the store recomputes the tree state under the same lock that
//! records the node's new hydration state. Resident content is accounted in a
//! [`ContentBudget`] and the least-recently-used files are evicted when it
//! overflows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::budget::{CacheMetrics, ContentBudget, ContentKey};
use crate::decoder::{ContentDecoder, DecodeWarning, Document, MarkdownDecoder};
use crate::error::{HydrationError, Operation, Result, ZenkatError};
use crate::flight::{settle, Wait};
use crate::id::NodeId;
use crate::node::Content;
use crate::registry::{TreeHandle, TreeRegistry};
use crate::store::HydrationStart;

/// Default time a caller waits for a hydration.
pub const DEFAULT_HYDRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of [`HydrationManager::hydrate_all`].
#[derive(Debug, Clone, Default)]
pub struct HydrateAllReport {
    /// Files that were not resident when the batch started
    pub requested: usize,
    pub hydrated: usize,
    pub errors: Vec<ZenkatError>,
}

impl HydrateAllReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error that is not a `Pending`/`Timeout` wait signal.
    pub fn first_failure(&self) -> Option<&ZenkatError> {
        self.errors
            .iter()
            .find(|err| !matches!(err, ZenkatError::Pending { .. } | ZenkatError::Timeout { .. }))
    }
}

#[derive(Clone)]
struct Inner {
    registry: Arc<TreeRegistry>,
    budget: Arc<ContentBudget>,
    decoder: Arc<dyn ContentDecoder>,
    timeout: Duration,
    max_file_size: Option<u64>,
}

#[derive(Clone)]
pub struct HydrationManager {
    inner: Arc<Inner>,
}

impl HydrationManager {
    pub fn new(registry: Arc<TreeRegistry>, budget: Arc<ContentBudget>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                budget,
                decoder: Arc::new(MarkdownDecoder::new()),
                timeout: DEFAULT_HYDRATION_TIMEOUT,
                max_file_size: None,
            }),
        }
    }

    fn configure(mut self, f: impl FnOnce(&mut Inner)) -> Self {
        f(Arc::make_mut(&mut self.inner));
        self
    }

    pub fn with_decoder(self, decoder: Arc<dyn ContentDecoder>) -> Self {
        self.configure(|inner| inner.decoder = decoder)
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.configure(|inner| inner.timeout = timeout)
    }

    /// Refuse to hydrate files larger than `bytes`.
    pub fn with_max_file_size(self, bytes: u64) -> Self {
        self.configure(|inner| inner.max_file_size = Some(bytes))
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn budget(&self) -> &Arc<ContentBudget> {
        &self.inner.budget
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.budget.metrics()
    }

    /// Hydrate a file, waiting up to the manager's timeout.
    pub async fn hydrate(&self, tree: &str, id: &NodeId) -> Result<Arc<Content>> {
        self.hydrate_with(tree, id, Wait::block(self.inner.timeout)).await
    }

    /// Hydrate a file.
    ///
    /// Fails with `NotMetadataLoaded` before any I/O if the tree has not been
    /// crawled, and with `NotAFile` for folders. Resident content is returned
    /// without touching the source.
    pub async fn hydrate_with(&self, tree: &str, id: &NodeId, wait: Wait) -> Result<Arc<Content>> {
        let registry = &self.inner.registry;
        let handle = registry.handle(tree)?;
        if !registry.lookup(tree)?.state.is_loaded() {
            return Err(ZenkatError::not_metadata_loaded(tree));
        }

        let node = registry
            .store()
            .get_node(tree, id)
            .ok_or_else(|| ZenkatError::node_not_found(tree, id))?;
        if !node.is_file() {
            return Err(ZenkatError::not_a_file(tree, id.clone()));
        }
        if let Some(content) = node.content() {
            self.inner.budget.touch(&(tree.to_string(), id.clone()));
            return Ok(Arc::clone(content));
        }

        self.inner.budget.record_miss();
        let inner = Arc::clone(&self.inner);
        let fetcher = Arc::clone(&handle);
        let key = id.clone();
        let flight = handle
            .hydrations
            .join_or_start(id.clone(), move || fetch(inner, fetcher, key));
        if !flight.is_leader() {
            debug!(tree = %tree, node = %id, "Joining in-flight hydration");
        }

        let result = settle(flight, wait, Operation::Hydration, id.as_str()).await;
        if let Err(ZenkatError::Timeout { .. }) = &result {
            warn!(tree = %tree, node = %id, "Timed out waiting for hydration");
        }
        result
    }

    /// Whether a hydration of `id` is running.
    pub fn in_flight(&self, tree: &str, id: &NodeId) -> bool {
        self.inner
            .registry
            .handle(tree)
            .map(|handle| handle.hydration_in_flight(id))
            .unwrap_or(false)
    }

    /// Drop a file's content. Returns `false` if it was not hydrated.
    ///
    /// A file that is being hydrated is left alone.
    pub fn evict(&self, tree: &str, id: &NodeId) -> Result<bool> {
        self.inner.registry.handle(tree)?;
        let key = (tree.to_string(), id.clone());
        let evicted = self.inner.drop_content(&key, false)?;
        if evicted {
            debug!(tree = %tree, node = %id, "Evicted content");
        }
        Ok(evicted)
    }

    /// Mark resident content as used for LRU purposes.
    pub fn touch(&self, tree: &str, id: &NodeId) {
        self.inner.budget.touch(&(tree.to_string(), id.clone()));
    }

    /// Hydrate every file of a loaded tree with bounded concurrency.
    pub async fn hydrate_all(&self, tree: &str, wait: Wait) -> Result<HydrateAllReport> {
        let registry = &self.inner.registry;
        registry.handle(tree)?;
        if !registry.lookup(tree)?.state.is_loaded() {
            return Err(ZenkatError::not_metadata_loaded(tree));
        }

        let pending: Vec<NodeId> = registry
            .store()
            .read_tree(tree, |view| {
                view.nodes()
                    .filter(|node| node.is_file() && node.content().is_none())
                    .map(|node| node.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let started = Instant::now();
        let width = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let hydrations: Vec<_> = pending
            .iter()
            .map(|id| self.hydrate_with(tree, id, wait))
            .collect();
        let results: Vec<Result<Arc<Content>>> = stream::iter(hydrations)
            .buffer_unordered(width)
            .collect()
            .await;

        let mut report = HydrateAllReport {
            requested: pending.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(_) => report.hydrated += 1,
                Err(err) => report.errors.push(err),
            }
        }
        if report.requested > 0 {
            info!(
                tree = %tree,
                hydrated = report.hydrated,
                failed = report.errors.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch hydration finished"
            );
        }
        Ok(report)
    }
}

impl Inner {
    /// Remove content from the store and the budget.
    fn drop_content(&self, key: &ContentKey, over_budget: bool) -> Result<bool> {
        let (tree, id) = key;
        match self.registry.store().evict(tree, id)? {
            Some(_) => {
                if over_budget {
                    self.budget.record_evicted(key);
                } else {
                    self.budget.forget(key);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evict least-recently-used files other than `keep` until resident
    /// content fits the budget again.
    fn enforce_budget(&self, keep: &ContentKey) {
        for key in self.budget.eviction_candidates(keep) {
            match self.drop_content(&key, true) {
                Ok(true) => debug!(tree = %key.0, node = %key.1, "Evicted content over memory budget"),
                // Gone or still hydrating: stop tracking it either way
                Ok(false) | Err(_) => {
                    self.budget.forget(&key);
                }
            }
        }
    }

    fn decode(&self, tree: &str, id: &NodeId, bytes: &[u8]) -> (Option<Document>, Option<DecodeWarning>) {
        match self.decoder.decode(bytes) {
            Ok(document) => (document, None),
            Err(err) => {
                warn!(
                    tree = %tree,
                    node = %id,
                    decoder = self.decoder.name(),
                    error = %err,
                    "Decoding failed; keeping raw content"
                );
                (None, Some(DecodeWarning::new(self.decoder.name(), &err)))
            }
        }
    }
}

async fn fetch(inner: Arc<Inner>, handle: Arc<TreeHandle>, id: NodeId) -> Result<Arc<Content>> {
    let tree = handle.name();
    let store = inner.registry.store();
    let ticket = match store.begin_hydration(tree, &id)? {
        HydrationStart::Resident(content) => return Ok(content),
        HydrationStart::Fetch(ticket) => ticket,
    };

    let started = Instant::now();
    let too_large = |size: u64, limit: u64| {
        store.fail_hydration(tree, ticket.generation, &id);
        warn!(tree = %tree, path = %ticket.path, size, limit, "File exceeds size limit");
        ZenkatError::from(HydrationError::TooLarge {
            tree: tree.to_string(),
            id: id.clone(),
            path: ticket.path.to_string(),
            size,
            limit,
        })
    };

    if let (Some(limit), Some(size)) = (inner.max_file_size, ticket.size) {
        if size > limit {
            return Err(too_large(size, limit));
        }
    }

    let source = handle.source();
    let bytes = match source.read_file(&ticket.path).await {
        Ok(bytes) => bytes,
        Err(source) => {
            store.fail_hydration(tree, ticket.generation, &id);
            warn!(tree = %tree, path = %ticket.path, error = %source, "Hydration failed");
            return Err(HydrationError::Read {
                tree: tree.to_string(),
                id: id.clone(),
                path: ticket.path.to_string(),
                source,
            }
            .into());
        }
    };
    if let Some(limit) = inner.max_file_size {
        if bytes.len() as u64 > limit {
            return Err(too_large(bytes.len() as u64, limit));
        }
    }

    let (document, warning) = inner.decode(tree, &id, &bytes);
    let content = Arc::new(Content::new(bytes, document, warning));
    let key = (tree.to_string(), id.clone());

    match store.complete_hydration(tree, ticket.generation, &id, Arc::clone(&content)) {
        Some(state) => {
            inner.budget.record_loaded(key.clone(), content.size());
            info!(
                tree = %tree,
                path = %ticket.path,
                bytes = content.size(),
                state = %state,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Hydrated file"
            );
            inner.enforce_budget(&key);
        }
        None => debug!(tree = %tree, path = %ticket.path, "Tree unloaded during hydration; content not stored"),
    }
    Ok(content)
}
