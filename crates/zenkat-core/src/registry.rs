//! Tree Registry
//!
//! Process-wide catalog of known trees. Each registered tree gets a
//! [`TreeHandle`] holding its source and its own coalescing maps, so crawls and
//! hydrations of unrelated trees never contend on a shared lock. The store
//! entry is created lazily on first reference.
//!
//! A handle outlives re-registration of the same location, so work already in
//! flight stays joinable.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::budget::ContentBudget;
use crate::error::{Result, ZenkatError};
use crate::flight::FlightGroup;
use crate::id::{NodeId, VirtualPath};
use crate::node::Content;
use crate::source::TreeSource;
use crate::store::NodeStore;
use crate::tree::{Tree, TreeStats};

/// Whether [`TreeRegistry::register`] added or replaced a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
}

/// A registered tree and its in-flight work.
pub struct TreeHandle {
    name: String,
    virtual_path: String,
    source: RwLock<Arc<dyn TreeSource>>,
    pub(crate) crawl: FlightGroup<(), Result<NodeId>>,
    pub(crate) hydrations: FlightGroup<NodeId, Result<Arc<Content>>>,
}

impl TreeHandle {
    fn new(name: &str, virtual_path: String, source: Arc<dyn TreeSource>) -> Self {
        Self {
            name: name.to_string(),
            virtual_path,
            source: RwLock::new(source),
            crawl: FlightGroup::new(),
            hydrations: FlightGroup::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn source(&self) -> Arc<dyn TreeSource> {
        Arc::clone(&self.source.read())
    }

    fn location(&self) -> String {
        self.source.read().describe()
    }

    pub fn crawl_in_flight(&self) -> bool {
        self.crawl.in_flight(&())
    }

    pub fn hydration_in_flight(&self, id: &NodeId) -> bool {
        self.hydrations.in_flight(id)
    }
}

/// Validate a tree name and normalize its virtual path.
fn normalize(name: &str, virtual_path: &str) -> Result<String> {
    if name.is_empty() || name.contains(['/', '\\']) || name.trim() != name {
        return Err(ZenkatError::invalid_tree(format!("invalid tree name {:?}", name)));
    }
    let path = VirtualPath::parse(virtual_path).ok_or_else(|| {
        ZenkatError::invalid_tree(format!("virtual path {:?} must not contain '..'", virtual_path))
    })?;
    Ok(path.to_string())
}

pub struct TreeRegistry {
    store: Arc<NodeStore>,
    budget: Arc<ContentBudget>,
    handles: DashMap<String, Arc<TreeHandle>>,
}

impl TreeRegistry {
    pub fn new(store: Arc<NodeStore>, budget: Arc<ContentBudget>) -> Self {
        Self {
            store,
            budget,
            handles: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// Add a tree, or replace the source of an existing one.
    ///
    /// Re-registering the same location and virtual path swaps the source in
    /// place and keeps the graph along with any crawl or hydration in flight.
    /// A tree whose location or virtual path changed gets a fresh handle and
    /// its old graph is unloaded.
    pub fn register(
        &self,
        name: &str,
        virtual_path: &str,
        source: Arc<dyn TreeSource>,
    ) -> Result<Registration> {
        let virtual_path = normalize(name, virtual_path)?;
        let location = source.describe();

        match self.handles.entry(name.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(TreeHandle::new(name, virtual_path, source)));
                info!(tree = %name, location = %location, "Registered tree");
                Ok(Registration::Created)
            }
            Entry::Occupied(mut entry) => {
                let previous = entry.get();
                let moved = previous.location() != location || previous.virtual_path != virtual_path;
                if moved {
                    if self.store.get_tree(name).is_some() {
                        self.drop_graph(name)?;
                        self.store.set_virtual_path(name, &virtual_path)?;
                    }
                    entry.insert(Arc::new(TreeHandle::new(name, virtual_path, source)));
                } else {
                    *previous.source.write() = source;
                }
                info!(tree = %name, location = %location, moved, "Updated tree");
                Ok(Registration::Updated)
            }
        }
    }

    /// Remove a tree entirely, discarding its graph.
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.handles.remove(name).is_some();
        if removed {
            self.budget.forget_tree(name);
            self.store.remove_tree(name);
        }
        removed
    }

    pub fn handle(&self, name: &str) -> Result<Arc<TreeHandle>> {
        self.handles
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ZenkatError::tree_not_found(name))
    }

    /// Current record of a registered tree, creating it as `UNLOADED` on
    /// first reference.
    pub fn lookup(&self, name: &str) -> Result<Tree> {
        let handle = self.handle(name)?;
        match self.store.get_tree(name) {
            Some(tree) => Ok(tree),
            None => Ok(self.store.ensure_tree(name, &handle.virtual_path)),
        }
    }

    /// Registered tree names, sorted.
    pub fn list_trees(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Drop the node graph and resident content of a tree.
    pub fn unload(&self, name: &str) -> Result<()> {
        self.handle(name)?;
        if self.store.get_tree(name).is_some() {
            self.drop_graph(name)?;
        }
        info!(tree = %name, "Unloaded tree");
        Ok(())
    }

    fn drop_graph(&self, name: &str) -> Result<()> {
        debug!(tree = %name, "Dropping node graph");
        self.store.reset_tree(name)?;
        self.budget.forget_tree(name);
        Ok(())
    }

    pub fn stats(&self, name: &str) -> Result<TreeStats> {
        self.lookup(name)?;
        self.store
            .stats(name)
            .ok_or_else(|| ZenkatError::tree_not_found(name))
    }
}
